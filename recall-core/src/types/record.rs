//! Memory records — the canonical unit written to the archive.

use crate::scope::ScopeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Broad classification of ingested content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Conversational turn or chat excerpt
    #[default]
    Conversation,
    /// Published article
    Article,
    /// Uploaded document
    Document,
    /// Content fetched by a crawler
    Crawled,
    /// Caller-defined type
    Custom,
}

impl ContentType {
    /// Stable string form used by the metadata index.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Conversation => "conversation",
            ContentType::Article => "article",
            ContentType::Document => "document",
            ContentType::Crawled => "crawled",
            ContentType::Custom => "custom",
        }
    }
}

/// Typed metadata with a free-form side-bag.
///
/// The common fields are first-class; anything else callers attach travels
/// in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RecordMetadata {
    /// Origin of the content (file path, URL, speaker, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Free-form tags
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Single coarse category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Content classification
    #[serde(default)]
    pub content_type: ContentType,
    /// Anything the caller attached that the engine does not interpret
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The canonical unit written to the archive.
///
/// Created once by the ingest orchestrator and never mutated; `content` is
/// immutable for the life of the record. Deletion by id also unlinks the
/// record from every index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Opaque unique id
    pub id: String,
    /// Tenant coordinate
    pub scope: ScopeId,
    /// Verbatim ingested text
    pub content: String,
    /// Ingest wall-clock time
    pub timestamp: DateTime<Utc>,
    /// Typed metadata plus side-bag
    #[serde(default)]
    pub metadata: RecordMetadata,
    /// Entity ids mentioned in the content
    #[serde(default)]
    pub entities_mentioned: Vec<String>,
    /// Normalized keyword tokens
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl MemoryRecord {
    /// Create a record with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(content: String, scope: ScopeId, metadata: RecordMetadata) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scope,
            content,
            timestamp: Utc::now(),
            metadata,
            entities_mentioned: Vec::new(),
            keywords: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrips_through_json() {
        let mut metadata = RecordMetadata::default();
        metadata.source = Some("chat".to_string());
        metadata.tags.insert("travel".to_string());
        metadata
            .extra
            .insert("turn".to_string(), serde_json::json!(7));

        let record = MemoryRecord::new(
            "Paris is the capital of France.".to_string(),
            ScopeId::new("u", "default", "s"),
            metadata,
        );
        let json = serde_json::to_string(&record).expect("serialize");
        let back: MemoryRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, record);
    }

    #[test]
    fn fresh_records_get_distinct_ids() {
        let scope = ScopeId::new("u", "default", "s");
        let a = MemoryRecord::new("a".to_string(), scope.clone(), RecordMetadata::default());
        let b = MemoryRecord::new("b".to_string(), scope, RecordMetadata::default());
        assert_ne!(a.id, b.id);
    }
}
