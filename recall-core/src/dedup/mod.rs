//! Three-stage deduplicator.
//!
//! Stage 1 is deterministic: normalize, exact-hash lookup, then MinHash/LSH
//! candidate generation with a signature-Jaccard cut. Stage 2 (embedding
//! similarity) and stage 3 (LLM confirm) are orchestrated by the engine,
//! which owns the providers; this module reports stage-1 verdicts and the
//! candidate set the later stages should examine.

pub mod minhash;

use crate::archive::write_json_atomic;
use crate::config::DedupConfig;
use crate::constants::{defaults, layout};
use crate::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;

/// Stage-1 outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage1 {
    /// Byte-identical after normalization
    ExactDuplicate(String),
    /// Signature Jaccard at or above the threshold
    NearDuplicate { id: String, similarity: f32 },
    /// Not a deterministic duplicate; stage 2 should examine these ids
    Candidates(Vec<String>),
}

/// Final deduplication verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupVerdict {
    Unique,
    DuplicateOf(String),
    /// Stage-2 grey zone with no stage-3 confirmation available
    Uncertain { id: String, similarity: f32 },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DedupSnapshot {
    /// Normalized-content hash → record id
    exact: Vec<(u64, String)>,
    /// Record id → MinHash signature
    signatures: HashMap<String, Vec<u64>>,
    /// Most recently registered ids
    recent: Vec<String>,
}

struct DedupState {
    exact: HashMap<u64, String>,
    signatures: HashMap<String, Vec<u64>>,
    buckets: HashMap<(usize, u64), BTreeSet<String>>,
    recent: VecDeque<String>,
}

/// Deterministic duplicate detection state.
pub struct Deduplicator {
    dir: PathBuf,
    config: DedupConfig,
    state: Mutex<DedupState>,
}

/// Trim, case-fold, strip punctuation, collapse whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for c in text.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if c.is_whitespace() && !last_space {
            out.push(' ');
            last_space = true;
        }
        // Punctuation is dropped entirely.
    }
    out.trim_end().to_string()
}

fn content_hash(normalized: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    hasher.finish()
}

impl Deduplicator {
    pub fn open(dir: impl Into<PathBuf>, config: DedupConfig) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let snapshot: DedupSnapshot =
            crate::archive::read_json(&dir.join(layout::DEDUP_SNAPSHOT))?.unwrap_or_default();

        let mut buckets: HashMap<(usize, u64), BTreeSet<String>> = HashMap::new();
        for (id, signature) in &snapshot.signatures {
            for key in minhash::band_keys(signature) {
                buckets.entry(key).or_default().insert(id.clone());
            }
        }
        Ok(Self {
            dir,
            config,
            state: Mutex::new(DedupState {
                exact: snapshot.exact.into_iter().collect(),
                signatures: snapshot.signatures,
                buckets,
                recent: snapshot.recent.into(),
            }),
        })
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Run stage 1 against everything registered so far.
    ///
    /// The candidate list always includes a small recall set of recent
    /// records so stage 2 can catch paraphrases that share no shingles.
    pub fn stage1(&self, content: &str) -> Stage1 {
        let normalized = normalize(content);
        let state = self.state.lock();

        if let Some(id) = state.exact.get(&content_hash(&normalized)) {
            return Stage1::ExactDuplicate(id.clone());
        }

        let signature = minhash::signature(&normalized);
        let mut candidates: BTreeSet<String> = BTreeSet::new();
        for key in minhash::band_keys(&signature) {
            if let Some(bucket) = state.buckets.get(&key) {
                candidates.extend(bucket.iter().cloned());
            }
        }

        let mut best: Option<(String, f32)> = None;
        for id in &candidates {
            if let Some(existing) = state.signatures.get(id) {
                let similarity = minhash::estimate_jaccard(&signature, existing);
                if best.as_ref().is_none_or(|(_, s)| similarity > *s) {
                    best = Some((id.clone(), similarity));
                }
            }
        }
        if let Some((id, similarity)) = &best {
            if *similarity >= self.config.jaccard_threshold {
                return Stage1::NearDuplicate {
                    id: id.clone(),
                    similarity: *similarity,
                };
            }
        }

        let mut ordered: Vec<String> = candidates.into_iter().collect();
        for id in state.recent.iter().rev() {
            if !ordered.contains(id) {
                ordered.push(id.clone());
            }
        }
        Stage1::Candidates(ordered)
    }

    /// Register a stored record so future ingests can match it.
    pub fn register(&self, id: &str, content: &str) {
        let normalized = normalize(content);
        let signature = minhash::signature(&normalized);
        let mut state = self.state.lock();
        state.exact.insert(content_hash(&normalized), id.to_string());
        for key in minhash::band_keys(&signature) {
            state.buckets.entry(key).or_default().insert(id.to_string());
        }
        state.signatures.insert(id.to_string(), signature);
        state.recent.push_back(id.to_string());
        while state.recent.len() > defaults::DEDUP_RECENT_WINDOW {
            state.recent.pop_front();
        }
    }

    /// Forget a deleted record.
    pub fn remove(&self, id: &str) {
        let mut state = self.state.lock();
        state.exact.retain(|_, existing| existing.as_str() != id);
        if let Some(signature) = state.signatures.remove(id) {
            for key in minhash::band_keys(&signature) {
                if let Some(bucket) = state.buckets.get_mut(&key) {
                    bucket.remove(id);
                }
            }
        }
        state.recent.retain(|existing| existing.as_str() != id);
    }

    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock();
        let snapshot = DedupSnapshot {
            exact: state.exact.iter().map(|(k, v)| (*k, v.clone())).collect(),
            signatures: state.signatures.clone(),
            recent: state.recent.iter().cloned().collect(),
        };
        write_json_atomic(&self.dir.join(layout::DEDUP_SNAPSHOT), &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedup() -> (tempfile::TempDir, Deduplicator) {
        let dir = tempfile::tempdir().expect("tempdir");
        let dedup = Deduplicator::open(dir.path(), DedupConfig::default()).expect("open");
        (dir, dedup)
    }

    #[test]
    fn normalization_strips_case_and_punctuation() {
        assert_eq!(normalize("  Paris, France!  "), "paris france");
        assert_eq!(normalize("A  B\tC"), "a b c");
    }

    #[test]
    fn exact_duplicate_is_caught_after_normalization() {
        let (_dir, dedup) = dedup();
        dedup.register("m1", "Paris is the capital of France.");
        match dedup.stage1("paris is the capital of france") {
            Stage1::ExactDuplicate(id) => assert_eq!(id, "m1"),
            other => panic!("expected exact duplicate, got {other:?}"),
        }
    }

    #[test]
    fn near_duplicate_crosses_jaccard_threshold() {
        let (_dir, dedup) = dedup();
        let text = "the quarterly report shows revenue grew by twelve percent in the third quarter";
        dedup.register("m1", text);
        let nearly = "the quarterly report shows revenue grew by twelve percent in the third quarter!";
        match dedup.stage1(nearly) {
            Stage1::ExactDuplicate(id) | Stage1::NearDuplicate { id, .. } => {
                assert_eq!(id, "m1");
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[test]
    fn unrelated_content_yields_recent_candidates_for_stage2() {
        let (_dir, dedup) = dedup();
        dedup.register("m1", "a fact about databases");
        match dedup.stage1("entirely different topic on gardening") {
            Stage1::Candidates(ids) => assert!(ids.contains(&"m1".to_string())),
            other => panic!("expected candidates, got {other:?}"),
        }
    }

    #[test]
    fn removed_records_stop_matching() {
        let (_dir, dedup) = dedup();
        dedup.register("m1", "ephemeral content here");
        dedup.remove("m1");
        match dedup.stage1("ephemeral content here") {
            Stage1::Candidates(ids) => assert!(ids.is_empty()),
            other => panic!("expected no match, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let dedup = Deduplicator::open(dir.path(), DedupConfig::default()).expect("open");
            dedup.register("m1", "persisted fact");
            dedup.flush().expect("flush");
        }
        let dedup = Deduplicator::open(dir.path(), DedupConfig::default()).expect("reopen");
        match dedup.stage1("persisted fact") {
            Stage1::ExactDuplicate(id) => assert_eq!(id, "m1"),
            other => panic!("expected exact duplicate, got {other:?}"),
        }
    }
}
