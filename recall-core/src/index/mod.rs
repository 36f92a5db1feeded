//! The index family.
//!
//! Every index is rebuildable from the archive; the archive is the source
//! of truth. Index updates are fanned out by the orchestrator, which logs
//! failures instead of failing the write, and a dirty counter triggers a
//! snapshot flush at a threshold.

mod entities;
mod inverted;
mod metadata;
mod ngram;
mod temporal;
mod vector;

pub use entities::EntityIndex;
pub use inverted::InvertedIndex;
pub use metadata::{MetadataFilter, MetadataIndex};
pub use ngram::{extract_phrases, PhraseIndex};
pub use temporal::{TemporalEntry, TemporalIndex};
pub use vector::{dot, normalize, VectorIndex};

use crate::constants::defaults;
use crate::error::Result;
use crate::types::{MemoryRecord, TimeRange};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// All secondary indices for one engine, opened under one directory.
pub struct IndexSet {
    pub inverted: InvertedIndex,
    pub phrases: PhraseIndex,
    pub entities: EntityIndex,
    /// Absent in lite mode; retrieval skips the vector path.
    pub vector: Option<VectorIndex>,
    pub temporal: TemporalIndex,
    pub metadata: MetadataIndex,
    dirty: AtomicU64,
}

impl IndexSet {
    /// Open every index under `dir`. `vector_dimension = None` selects lite
    /// mode with no vector index at all.
    pub fn open(dir: &Path, vector_dimension: Option<usize>) -> Result<Self> {
        let vector = match vector_dimension {
            Some(dimension) => Some(VectorIndex::open(dir.join("vector"), dimension)?),
            None => None,
        };
        Ok(Self {
            inverted: InvertedIndex::open(dir.join("inverted"))?,
            phrases: PhraseIndex::open(dir.join("ngram"))?,
            entities: EntityIndex::open(dir.join("entities"))?,
            vector,
            temporal: TemporalIndex::open(dir.join("temporal"))?,
            metadata: MetadataIndex::open(dir.join("metadata"))?,
            dirty: AtomicU64::new(0),
        })
    }

    /// Fact range for a record: explicit `valid_from` / `valid_until`
    /// metadata wins; otherwise the fact starts at the ingest timestamp.
    #[must_use]
    pub fn fact_range_of(record: &MemoryRecord) -> TimeRange {
        let parse = |key: &str| {
            record.metadata.extra.get(key).and_then(|value| {
                value
                    .as_str()
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|t| t.with_timezone(&chrono::Utc))
            })
        };
        let start = parse("valid_from");
        let end = parse("valid_until");
        if start.is_none() && end.is_none() {
            TimeRange::from(record.timestamp)
        } else {
            TimeRange { start, end }
        }
    }

    /// Index a record in every text-derived index. The vector index is fed
    /// separately because embeddings come from an external provider.
    pub fn index_record(&self, record: &MemoryRecord) -> Result<()> {
        self.inverted.add(&record.keywords, &record.id)?;
        self.phrases.add(&record.id, &record.content);
        self.metadata.add(&record.id, &record.metadata);
        self.temporal
            .insert(&record.id, TemporalEntry::new(Self::fact_range_of(record)));
        self.note_writes(1);
        Ok(())
    }

    /// Unlink a record from every index.
    pub fn remove_record(&self, record: &MemoryRecord) -> Result<()> {
        self.inverted.remove(&record.keywords, &record.id)?;
        self.phrases.remove(&record.id, &record.content);
        self.metadata.remove(&record.id);
        self.temporal.remove(&record.id);
        self.entities.unlink_memory(&record.id);
        if let Some(vector) = &self.vector {
            vector.remove(&record.id);
        }
        self.note_writes(1);
        Ok(())
    }

    /// Bump the dirty counter; returns true when a flush is due.
    pub fn note_writes(&self, n: u64) -> bool {
        let dirty = self.dirty.fetch_add(n, Ordering::Relaxed) + n;
        dirty >= defaults::INDEX_DIRTY_FLUSH_THRESHOLD
    }

    /// Persist every index. Individual failures are logged and the rest
    /// still flush; the first error is returned.
    pub fn flush_all(&self) -> Result<()> {
        self.dirty.store(0, Ordering::Relaxed);
        let mut first_error = None;
        let mut note = |name: &str, result: Result<()>| {
            if let Err(e) = result {
                warn!(index = name, error = %e, "index flush failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        };
        note("inverted", self.inverted.flush());
        note("ngram", self.phrases.flush());
        note("entities", self.entities.flush());
        if let Some(vector) = &self.vector {
            note("vector", vector.flush());
        }
        note("temporal", self.temporal.flush());
        note("metadata", self.metadata.flush());
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Rebuild the text-derived indices from an archive scan. This is the
    /// recovery route for `Corruption`; entity and vector state are
    /// re-derived by the engine, which owns extraction and embeddings.
    pub fn rebuild_from(&self, archive: &crate::archive::ArchiveLog) -> Result<()> {
        info!("rebuilding indices from archive");
        self.inverted.clear()?;
        self.phrases.clear()?;
        self.metadata.clear()?;
        self.temporal.clear()?;
        let mut failures = 0usize;
        archive.scan(|_, record| {
            if self.index_record(record).is_err() {
                failures += 1;
            }
        })?;
        if failures > 0 {
            warn!(failures, "records failed to re-index during rebuild");
        }
        self.flush_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveLog;
    use crate::scope::ScopeId;
    use crate::types::RecordMetadata;

    fn record(content: &str, keywords: &[&str]) -> MemoryRecord {
        let mut record = MemoryRecord::new(
            content.to_string(),
            ScopeId::new("u", "default", "s"),
            RecordMetadata::default(),
        );
        record.keywords = keywords.iter().map(|k| (*k).to_string()).collect();
        record
    }

    #[test]
    fn index_then_remove_leaves_no_trace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let set = IndexSet::open(dir.path(), Some(4)).expect("open");
        let r = record("the quick brown fox", &["quick", "fox"]);
        set.index_record(&r).expect("index");
        assert_eq!(set.inverted.postings("fox"), vec![r.id.clone()]);

        set.remove_record(&r).expect("remove");
        assert!(set.inverted.postings("fox").is_empty());
        assert!(set.phrases.raw_search("quick brown", 5).is_empty());
        assert!(set.temporal.get(&r.id).is_none());
    }

    #[test]
    fn lite_mode_has_no_vector_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let set = IndexSet::open(dir.path(), None).expect("open");
        assert!(set.vector.is_none());
    }

    #[test]
    fn fact_range_prefers_explicit_metadata() {
        let mut r = record("dated fact", &[]);
        r.metadata.extra.insert(
            "valid_from".to_string(),
            serde_json::json!("2020-01-01T00:00:00Z"),
        );
        r.metadata.extra.insert(
            "valid_until".to_string(),
            serde_json::json!("2020-12-31T00:00:00Z"),
        );
        let range = IndexSet::fact_range_of(&r);
        assert!(range.start.is_some());
        assert!(range.end.is_some());

        let bare = record("undated", &[]);
        let range = IndexSet::fact_range_of(&bare);
        assert_eq!(range.start, Some(bare.timestamp));
        assert_eq!(range.end, None);
    }

    #[test]
    fn rebuild_restores_text_indices() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = ArchiveLog::open(dir.path().join("archive")).expect("archive");
        let r = record("rebuild target content", &["rebuild", "target"]);
        archive.append(&r).expect("append");

        let set = IndexSet::open(&dir.path().join("idx"), None).expect("open");
        set.rebuild_from(&archive).expect("rebuild");
        assert_eq!(set.inverted.postings("rebuild"), vec![r.id.clone()]);
        assert_eq!(set.phrases.raw_search("target content", 5)[0].0, r.id);
    }
}
