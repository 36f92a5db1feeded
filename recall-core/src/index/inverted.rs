//! Inverted keyword index with a write-ahead log.
//!
//! Appends are O(1): each `(token, id)` pair is one JSON line in the WAL.
//! The main snapshot is rewritten only on compaction, via temp-file plus
//! atomic rename. Loading reads the snapshot then replays the WAL, skipping
//! malformed trailing lines with a warning.

use crate::archive::write_json_atomic;
use crate::constants::{defaults, layout};
use crate::error::{Error, Result};
use crate::retrieval::BloomFilter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct WalEntry {
    token: String,
    id: String,
    #[serde(default, skip_serializing_if = "is_false")]
    remove: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

struct InvertedState {
    postings: HashMap<String, BTreeSet<String>>,
    wal: Option<File>,
    wal_entries: u64,
    /// Pre-filter for the layered pipeline; no false negatives, so using
    /// it never changes results.
    bloom: BloomFilter,
}

/// Token → record-id postings with WAL-backed durability.
pub struct InvertedIndex {
    dir: PathBuf,
    state: Mutex<InvertedState>,
}

impl InvertedIndex {
    /// Load snapshot then replay WAL.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let snapshot_path = dir.join(layout::INVERTED_SNAPSHOT);
        let mut postings: HashMap<String, BTreeSet<String>> =
            crate::archive::read_json(&snapshot_path)?.unwrap_or_default();

        let wal_path = dir.join(layout::INVERTED_WAL);
        let mut wal_entries = 0u64;
        if wal_path.exists() {
            let file = File::open(&wal_path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WalEntry>(&line) {
                    Ok(entry) => {
                        wal_entries += 1;
                        if entry.remove {
                            if let Some(set) = postings.get_mut(&entry.token) {
                                set.remove(&entry.id);
                            }
                        } else {
                            postings.entry(entry.token).or_default().insert(entry.id);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "skipping malformed WAL line");
                    }
                }
            }
        }

        let mut bloom = BloomFilter::new(postings.len().max(1024));
        for token in postings.keys() {
            bloom.insert(token);
        }
        Ok(Self {
            dir,
            state: Mutex::new(InvertedState {
                postings,
                wal: None,
                wal_entries,
                bloom,
            }),
        })
    }

    /// Bloom pre-check: false means the token is definitely unindexed.
    pub fn might_contain(&self, token: &str) -> bool {
        self.state.lock().bloom.might_contain(token)
    }

    fn append_wal(state: &mut InvertedState, dir: &PathBuf, entry: &WalEntry) -> Result<()> {
        if state.wal.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(layout::INVERTED_WAL))?;
            state.wal = Some(file);
        }
        let line = serde_json::to_string(entry)?;
        let file = state.wal.as_mut().ok_or_else(|| {
            Error::Corruption("inverted WAL handle missing after open".to_string())
        })?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        state.wal_entries += 1;
        Ok(())
    }

    /// Index `id` under every token. Compacts when the WAL passes its
    /// threshold.
    pub fn add(&self, tokens: &[String], id: &str) -> Result<()> {
        let compact_due = {
            let mut state = self.state.lock();
            for token in tokens {
                let entry = WalEntry {
                    token: token.clone(),
                    id: id.to_string(),
                    remove: false,
                };
                Self::append_wal(&mut state, &self.dir, &entry)?;
                state.bloom.insert(token);
                state
                    .postings
                    .entry(token.clone())
                    .or_default()
                    .insert(id.to_string());
            }
            state.wal_entries >= defaults::WAL_COMPACTION_THRESHOLD
        };
        if compact_due {
            self.compact()?;
        }
        Ok(())
    }

    /// Unlink `id` from every token.
    pub fn remove(&self, tokens: &[String], id: &str) -> Result<()> {
        let mut state = self.state.lock();
        for token in tokens {
            let entry = WalEntry {
                token: token.clone(),
                id: id.to_string(),
                remove: true,
            };
            Self::append_wal(&mut state, &self.dir, &entry)?;
            if let Some(set) = state.postings.get_mut(token) {
                set.remove(id);
                if set.is_empty() {
                    state.postings.remove(token);
                }
            }
        }
        Ok(())
    }

    /// Posting list for one token.
    pub fn postings(&self, token: &str) -> Vec<String> {
        self.state
            .lock()
            .postings
            .get(token)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Ranked lookup across tokens: union (OR) or intersection (AND)
    /// semantics, scored by how many query tokens each id matched.
    pub fn search(&self, tokens: &[String], and_semantics: bool, limit: usize) -> Vec<(String, f32)> {
        let state = self.state.lock();
        let mut match_counts: HashMap<&str, usize> = HashMap::new();
        let mut matched_tokens = 0usize;
        for token in tokens {
            if let Some(set) = state.postings.get(token) {
                matched_tokens += 1;
                for id in set {
                    *match_counts.entry(id.as_str()).or_default() += 1;
                }
            }
        }
        if matched_tokens == 0 {
            return Vec::new();
        }
        let mut results: Vec<(String, f32)> = match_counts
            .into_iter()
            .filter(|(_, count)| !and_semantics || *count == matched_tokens)
            .map(|(id, count)| (id.to_string(), count as f32 / tokens.len() as f32))
            .collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0)));
        results.truncate(limit);
        results
    }

    /// Number of distinct tokens.
    pub fn token_count(&self) -> usize {
        self.state.lock().postings.len()
    }

    /// Rewrite the snapshot and truncate the WAL.
    pub fn compact(&self) -> Result<()> {
        let mut state = self.state.lock();
        write_json_atomic(&self.dir.join(layout::INVERTED_SNAPSHOT), &state.postings)?;
        state.wal = None;
        fs::write(self.dir.join(layout::INVERTED_WAL), b"")?;
        debug!(
            tokens = state.postings.len(),
            replayed = state.wal_entries,
            "compacted inverted index"
        );
        state.wal_entries = 0;
        Ok(())
    }

    /// Flush is compaction for this index.
    pub fn flush(&self) -> Result<()> {
        self.compact()
    }

    /// Drop all in-memory and on-disk state (rebuild entry point).
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.postings.clear();
        state.wal = None;
        state.wal_entries = 0;
        let wal_path = self.dir.join(layout::INVERTED_WAL);
        if wal_path.exists() {
            fs::write(&wal_path, b"")?;
        }
        drop(state);
        self.compact()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_string()).collect()
    }

    #[test]
    fn add_then_search_union_and_intersection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = InvertedIndex::open(dir.path()).expect("open");
        index.add(&tokens(&["paris", "capital"]), "m1").expect("add");
        index.add(&tokens(&["paris", "seine"]), "m2").expect("add");

        let union = index.search(&tokens(&["paris", "capital"]), false, 10);
        assert_eq!(union.len(), 2);
        assert_eq!(union[0].0, "m1"); // matched both tokens

        let and = index.search(&tokens(&["paris", "capital"]), true, 10);
        assert_eq!(and.len(), 1);
        assert_eq!(and[0].0, "m1");
    }

    #[test]
    fn wal_replay_restores_unflushed_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let index = InvertedIndex::open(dir.path()).expect("open");
            index.add(&tokens(&["alpha"]), "m1").expect("add");
            // No compact: postings only in the WAL.
        }
        let index = InvertedIndex::open(dir.path()).expect("reopen");
        assert_eq!(index.postings("alpha"), vec!["m1".to_string()]);
    }

    #[test]
    fn compact_then_load_preserves_map() {
        let dir = tempfile::tempdir().expect("tempdir");
        let before;
        {
            let index = InvertedIndex::open(dir.path()).expect("open");
            index.add(&tokens(&["a", "b"]), "m1").expect("add");
            index.add(&tokens(&["b", "c"]), "m2").expect("add");
            before = (
                index.postings("a"),
                index.postings("b"),
                index.postings("c"),
            );
            index.compact().expect("compact");
        }
        let index = InvertedIndex::open(dir.path()).expect("reopen");
        assert_eq!(index.postings("a"), before.0);
        assert_eq!(index.postings("b"), before.1);
        assert_eq!(index.postings("c"), before.2);
        // WAL is empty after compaction
        let wal = fs::read_to_string(dir.path().join(layout::INVERTED_WAL)).expect("read wal");
        assert!(wal.is_empty());
    }

    #[test]
    fn malformed_trailing_wal_line_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let index = InvertedIndex::open(dir.path()).expect("open");
            index.add(&tokens(&["kept"]), "m1").expect("add");
        }
        let wal_path = dir.path().join(layout::INVERTED_WAL);
        let mut file = OpenOptions::new().append(true).open(&wal_path).expect("open wal");
        file.write_all(b"{\"token\": \"tor").expect("write torn line");
        drop(file);

        let index = InvertedIndex::open(dir.path()).expect("reopen");
        assert_eq!(index.postings("kept"), vec!["m1".to_string()]);
    }

    #[test]
    fn remove_unlinks_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = InvertedIndex::open(dir.path()).expect("open");
        index.add(&tokens(&["x"]), "m1").expect("add");
        index.add(&tokens(&["x"]), "m2").expect("add");
        index.remove(&tokens(&["x"]), "m1").expect("remove");
        assert_eq!(index.postings("x"), vec!["m2".to_string()]);
    }
}
