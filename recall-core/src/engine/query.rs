//! The query path: parallel recall, fusion, rerank, scope filter, context.
//!
//! Each recall path runs on its own short-lived worker; the funnel joins
//! whatever returned before the deadline and fuses it. The scope filter is
//! the authoritative cut — paths are free to surface cross-scope
//! candidates.

use super::MemoryEngine;
use crate::config::{EngineMode, RerankBackend};
use crate::constants::defaults;
use crate::error::Result;
use crate::extract::rules;
use crate::retrieval::{
    build_context, builtin_rescore, graph_expansion, llm_relevance_filter, remote_rescore,
    rrf_fuse, CandidateSignals, ContextInputs, FusedCandidate, PathResult, SearchHit,
    SearchRequest, TemporalConstraint,
};
use crate::scope::ScopeId;
use std::collections::BTreeSet;
use std::sync::mpsc;
use std::time::Instant;
use tracing::{debug, warn};

impl MemoryEngine {
    /// Run the retrieval funnel.
    ///
    /// An empty result is a legitimate outcome, not an error.
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let started = Instant::now();
        let fetch_k = request.fetch_k();
        let mut paths = self.run_recall_paths(request, fetch_k);

        if request.layered {
            // Graph BFS expansion from seed entities found in the query.
            let seeds: Vec<String> = rules::entities(&request.query)
                .into_iter()
                .map(|entity| entity.name)
                .collect();
            if !seeds.is_empty() {
                let ranked_ids =
                    graph_expansion(&seeds, &self.indexes.entities, &self.graph, 1);
                if !ranked_ids.is_empty() {
                    paths.push(PathResult {
                        path: "graph",
                        weight: 0.5,
                        ranked_ids,
                    });
                }
            }
        }

        let fused = rrf_fuse(&paths, defaults::RRF_K);
        let filtered = self.apply_filters(fused, request);
        let reranked = self.rerank(&request.query, filtered, request.top_k);

        let survivors = if request.layered {
            self.llm_filter(&request.query, reranked)
        } else {
            reranked
        };

        let hits: Vec<SearchHit> = survivors
            .into_iter()
            .take(request.top_k)
            .filter_map(|candidate| {
                let content = self.indexes.phrases.content_of(&candidate.id)?;
                Some(SearchHit {
                    id: candidate.id,
                    score: candidate.score,
                    content,
                    paths: candidate.paths.iter().map(|p| (*p).to_string()).collect(),
                })
            })
            .collect();
        debug!(
            hits = hits.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        Ok(hits)
    }

    /// Spawn the four recall paths and join them at the deadline barrier.
    fn run_recall_paths(&self, request: &SearchRequest, fetch_k: usize) -> Vec<PathResult> {
        let (sender, receiver) = mpsc::channel::<PathResult>();
        let deadline = request.deadline;
        let mut expected = 0usize;

        // Vector path: embed the query, nearest neighbours.
        if self.indexes.vector.is_some() {
            expected += 1;
            let sender = sender.clone();
            let indexes = std::sync::Arc::clone(&self.indexes);
            let embeddings = std::sync::Arc::clone(&self.embeddings);
            let query = request.query.clone();
            std::thread::spawn(move || {
                let ranked_ids = embeddings
                    .encode(&query)
                    .and_then(|vector| {
                        indexes
                            .vector
                            .as_ref()
                            .map(|index| index.search(&vector, fetch_k))
                            .unwrap_or_else(|| Ok(Vec::new()))
                    })
                    .map(|scored| scored.into_iter().map(|(id, _)| id).collect())
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "vector path degraded");
                        Vec::new()
                    });
                let _ = sender.send(PathResult {
                    path: "vector",
                    weight: defaults::VECTOR_PATH_WEIGHT,
                    ranked_ids,
                });
            });
        }

        // Keyword path: posting lookups, union or AND.
        {
            expected += 1;
            let sender = sender.clone();
            let indexes = std::sync::Arc::clone(&self.indexes);
            let query = request.query.clone();
            let and_semantics = request.and_keywords;
            let layered = request.layered;
            std::thread::spawn(move || {
                let mut tokens = rules::keywords(&query);
                if layered {
                    // Bloom pre-filter: drop tokens that cannot be indexed.
                    tokens.retain(|token| indexes.inverted.might_contain(token));
                }
                let ranked_ids = indexes
                    .inverted
                    .search(&tokens, and_semantics, fetch_k)
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect();
                let _ = sender.send(PathResult {
                    path: "keyword",
                    weight: defaults::KEYWORD_PATH_WEIGHT,
                    ranked_ids,
                });
            });
        }

        // Entity path: union of reference sets for mentioned entities.
        {
            expected += 1;
            let sender = sender.clone();
            let indexes = std::sync::Arc::clone(&self.indexes);
            let query = request.query.clone();
            std::thread::spawn(move || {
                let mut ranked_ids: Vec<String> = Vec::new();
                let mut seen = BTreeSet::new();
                for extracted in rules::entities(&query) {
                    if let Some(entity) = indexes.entities.resolve(&extracted.name) {
                        for memory_id in entity.references {
                            if seen.insert(memory_id.clone()) {
                                ranked_ids.push(memory_id);
                            }
                        }
                    }
                }
                ranked_ids.truncate(fetch_k);
                let _ = sender.send(PathResult {
                    path: "entity",
                    weight: defaults::ENTITY_PATH_WEIGHT,
                    ranked_ids,
                });
            });
        }

        // N-gram / raw path: phrase lookup with the substring fallback.
        {
            expected += 1;
            let sender = sender.clone();
            let indexes = std::sync::Arc::clone(&self.indexes);
            let query = request.query.clone();
            std::thread::spawn(move || {
                let ranked_ids = indexes
                    .phrases
                    .search(&query, fetch_k)
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect();
                let _ = sender.send(PathResult {
                    path: "raw",
                    weight: defaults::RAW_PATH_WEIGHT,
                    ranked_ids,
                });
            });
        }
        drop(sender);

        // Join: assemble whatever paths returned in time.
        let cutoff = Instant::now() + deadline;
        let mut paths = Vec::with_capacity(expected);
        while paths.len() < expected {
            let remaining = cutoff.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(remaining) {
                Ok(path) => paths.push(path),
                Err(_) => {
                    warn!(
                        received = paths.len(),
                        expected, "search deadline hit, fusing partial results"
                    );
                    break;
                }
            }
        }
        paths
    }

    /// Scope, metadata, and temporal cuts, applied after fusion.
    fn apply_filters(
        &self,
        fused: Vec<FusedCandidate>,
        request: &SearchRequest,
    ) -> Vec<FusedCandidate> {
        let metadata_allowed = self.indexes.metadata.query(&request.filters);
        let temporal_allowed: Option<BTreeSet<String>> =
            request.temporal.as_ref().map(|constraint| {
                let ids = match constraint {
                    TemporalConstraint::AtPoint(t) => self.indexes.temporal.at_point(*t),
                    TemporalConstraint::Range { start, end } => {
                        self.indexes.temporal.range(*start, *end)
                    }
                    TemporalConstraint::Before(t) => self.indexes.temporal.before(*t),
                    TemporalConstraint::After(t) => self.indexes.temporal.after(*t),
                };
                ids.into_iter().collect()
            });

        fused
            .into_iter()
            .filter(|candidate| {
                if let Some(allowed) = &metadata_allowed {
                    if !allowed.contains(&candidate.id) {
                        return false;
                    }
                }
                if let Some(allowed) = &temporal_allowed {
                    if !allowed.contains(&candidate.id) {
                        return false;
                    }
                }
                if let Some(scope) = &request.scope {
                    // The authoritative scope cut.
                    match self.catalog.lock().get(&candidate.id) {
                        Some(record_scope) => record_scope == scope,
                        None => false,
                    }
                } else {
                    true
                }
            })
            .collect()
    }

    /// Optional rerank stage per the configured backend.
    fn rerank(
        &self,
        query: &str,
        candidates: Vec<FusedCandidate>,
        top_k: usize,
    ) -> Vec<FusedCandidate> {
        if candidates.is_empty() || self.config.rerank_backend == RerankBackend::None {
            return candidates;
        }
        let query_keywords = rules::keywords(query);
        let query_entities = rules::entities(query);
        let signals: Vec<CandidateSignals> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let content = self.indexes.phrases.content_of(&candidate.id)?;
                let content_lower = content.to_lowercase();
                let keyword_matches = query_keywords
                    .iter()
                    .filter(|keyword| content_lower.contains(keyword.as_str()))
                    .count();
                let entity_matches = query_entities
                    .iter()
                    .filter(|extracted| {
                        self.indexes
                            .entities
                            .resolve(&extracted.name)
                            .is_some_and(|entity| entity.references.contains(&candidate.id))
                    })
                    .count();
                Some(CandidateSignals {
                    candidate,
                    content,
                    keyword_matches,
                    entity_matches,
                })
            })
            .collect();

        match (&self.config.rerank_backend, &self.reranker) {
            (RerankBackend::Remote, Some(provider)) => {
                remote_rescore(provider.as_ref(), query, signals, top_k)
            }
            _ => builtin_rescore(signals),
        }
    }

    /// Layered pipeline L11: LLM relevance filter, skipped without a
    /// provider.
    fn llm_filter(&self, query: &str, candidates: Vec<FusedCandidate>) -> Vec<FusedCandidate> {
        let Some(provider) = self.llm.as_deref() else {
            return candidates;
        };
        let with_content: Vec<(String, String)> = candidates
            .iter()
            .filter_map(|candidate| {
                self.indexes
                    .phrases
                    .content_of(&candidate.id)
                    .map(|content| (candidate.id.clone(), content))
            })
            .collect();
        let kept: BTreeSet<String> =
            llm_relevance_filter(provider, query, with_content).into_iter().collect();
        candidates
            .into_iter()
            .filter(|candidate| kept.contains(&candidate.id))
            .collect()
    }

    /// Build a context block for a query under a token budget.
    pub fn context(
        &self,
        query: &str,
        scope: &ScopeId,
        recent_turns: Vec<String>,
        token_budget: usize,
    ) -> Result<String> {
        let scope = self.effective_scope(scope);
        let request = SearchRequest::new(query).in_scope(scope);
        let hits = self.search(&request)?;

        let foreshadowing = match &self.foreshadow {
            Some(tracker) if self.gate.mode == EngineMode::Narrative => {
                let active = tracker.active();
                let ordinal = self.total_records();
                for hint in &active {
                    tracker.mark_reminded(&hint.id, ordinal);
                }
                active
            }
            _ => Vec::new(),
        };

        let focus_entities = rules::entities(query)
            .into_iter()
            .filter_map(|extracted| self.indexes.entities.resolve(&extracted.name))
            .collect();

        let inputs = ContextInputs {
            memories: hits.into_iter().map(|hit| (hit.id, hit.content)).collect(),
            foreshadowing,
            focus_entities,
            recent_turns,
        };
        Ok(build_context(self.gate.mode, &inputs, token_budget))
    }
}
