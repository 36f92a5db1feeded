//! Retrieval funnel components: fusion, rerank, opt-in layers, context.
//!
//! The engine's query path wires these together; everything here is pure
//! over its inputs so each piece can be tested in isolation.

pub mod context;
pub mod fusion;
pub mod layers;
pub mod rerank;

pub use context::{build_context, estimate_tokens, ContextInputs};
pub use fusion::{rrf_fuse, FusedCandidate, PathResult};
pub use layers::{graph_expansion, llm_relevance_filter, BloomFilter};
pub use rerank::{builtin_rescore, remote_rescore, CandidateSignals};

use crate::constants::defaults;
use crate::index::MetadataFilter;
use crate::scope::ScopeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Temporal constraint attached to a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalConstraint {
    AtPoint(DateTime<Utc>),
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Before(DateTime<Utc>),
    After(DateTime<Utc>),
}

/// A retrieval request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Authoritative scope cut after fusion; `None` searches all scopes
    pub scope: Option<ScopeId>,
    pub top_k: usize,
    pub filters: MetadataFilter,
    /// Require every query keyword (AND) instead of any (OR)
    pub and_keywords: bool,
    /// Per-path deadline; paths return best-so-far on expiry
    pub deadline: Duration,
    /// Opt into the extended layered pipeline
    pub layered: bool,
    pub temporal: Option<TemporalConstraint>,
}

impl SearchRequest {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: None,
            top_k: defaults::DEFAULT_TOP_K,
            filters: MetadataFilter::default(),
            and_keywords: false,
            deadline: defaults::DEFAULT_SEARCH_DEADLINE,
            layered: false,
            temporal: None,
        }
    }

    #[must_use]
    pub fn in_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    #[must_use]
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_temporal(mut self, constraint: TemporalConstraint) -> Self {
        self.temporal = Some(constraint);
        self
    }

    /// How many candidates to pull per path: over-retrieve when any filter
    /// will cut the fused list afterwards.
    #[must_use]
    pub fn fetch_k(&self) -> usize {
        let filtered =
            self.scope.is_some() || self.filters.is_active() || self.temporal.is_some();
        if filtered {
            self.top_k * defaults::FILTER_OVERFETCH_FACTOR
        } else {
            self.top_k
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub content: String,
    /// Paths that surfaced the hit
    pub paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_k_over_retrieves_only_under_filters() {
        let plain = SearchRequest::new("q").top_k(10);
        assert_eq!(plain.fetch_k(), 10);

        let scoped = SearchRequest::new("q")
            .top_k(10)
            .in_scope(ScopeId::new("u", "default", "s"));
        assert_eq!(scoped.fetch_k(), 20);
    }
}
