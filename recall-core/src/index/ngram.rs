//! N-gram / phrase index with the raw-substring fallback.
//!
//! Phrase lookups serve the common case; when a query's phrases miss, the
//! search falls back to a linear scan of the raw-content map. That fallback
//! is the last line of the 100%-recall guarantee and is always present.

use crate::archive::write_json_atomic;
use crate::constants::layout;
use crate::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

const MAX_PHRASES_PER_TEXT: usize = 64;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PhraseSnapshot {
    phrases: HashMap<String, BTreeSet<String>>,
    raw: HashMap<String, String>,
}

/// Phrase → record ids, plus the verbatim content map.
pub struct PhraseIndex {
    dir: PathBuf,
    state: Mutex<PhraseSnapshot>,
}

impl PhraseIndex {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let snapshot: PhraseSnapshot =
            crate::archive::read_json(&dir.join(layout::NGRAM_SNAPSHOT))?.unwrap_or_default();
        Ok(Self {
            dir,
            state: Mutex::new(snapshot),
        })
    }

    /// Index a record's content.
    pub fn add(&self, id: &str, content: &str) {
        let phrases = extract_phrases(content);
        let mut state = self.state.lock();
        for phrase in phrases {
            state
                .phrases
                .entry(phrase)
                .or_default()
                .insert(id.to_string());
        }
        state.raw.insert(id.to_string(), content.to_string());
    }

    /// Unlink a record.
    pub fn remove(&self, id: &str, content: &str) {
        let phrases = extract_phrases(content);
        let mut state = self.state.lock();
        for phrase in phrases {
            if let Some(set) = state.phrases.get_mut(&phrase) {
                set.remove(id);
                if set.is_empty() {
                    state.phrases.remove(&phrase);
                }
            }
        }
        state.raw.remove(id);
    }

    /// Phrase lookup; raw-substring scan when phrases miss.
    ///
    /// An exact substring of any stored content always matches through the
    /// fallback, so an empty result means the text genuinely is not there.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        let state = self.state.lock();
        let query_phrases = extract_phrases(query);
        let mut hits: HashMap<&str, usize> = HashMap::new();
        for phrase in &query_phrases {
            if let Some(set) = state.phrases.get(phrase) {
                for id in set {
                    *hits.entry(id.as_str()).or_default() += 1;
                }
            }
        }
        if !hits.is_empty() {
            let mut results: Vec<(String, f32)> = hits
                .into_iter()
                .map(|(id, count)| (id.to_string(), count as f32 / query_phrases.len() as f32))
                .collect();
            results.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            results.truncate(limit);
            return results;
        }
        self.raw_search_locked(&state, query, limit)
    }

    /// Direct raw-substring scan, bypassing phrase lookup.
    pub fn raw_search(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        let state = self.state.lock();
        self.raw_search_locked(&state, query, limit)
    }

    fn raw_search_locked(
        &self,
        state: &PhraseSnapshot,
        query: &str,
        limit: usize,
    ) -> Vec<(String, f32)> {
        let needle = query.trim();
        if needle.is_empty() {
            return Vec::new();
        }
        let needle_lower = needle.to_lowercase();
        let mut results: Vec<(String, f32)> = state
            .raw
            .iter()
            .filter_map(|(id, content)| {
                if content.contains(needle) {
                    Some((id.clone(), 1.0))
                } else if content.to_lowercase().contains(&needle_lower) {
                    Some((id.clone(), 0.9))
                } else {
                    None
                }
            })
            .collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(limit);
        results
    }

    /// Verbatim content for a record, if indexed.
    pub fn content_of(&self, id: &str) -> Option<String> {
        self.state.lock().raw.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock();
        write_json_atomic(&self.dir.join(layout::NGRAM_SNAPSHOT), &*state)
    }

    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.phrases.clear();
        state.raw.clear();
        write_json_atomic(&self.dir.join(layout::NGRAM_SNAPSHOT), &*state)
    }
}

/// Extract phrase keys: lower-cased word bigrams/trigrams for space-
/// delimited text, character bigrams for CJK runs.
pub fn extract_phrases(text: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut seen = BTreeSet::new();

    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !is_cjk_str(w))
        .map(str::to_lowercase)
        .collect();
    for window in 2..=3 {
        for chunk in words.windows(window) {
            let phrase = chunk.join(" ");
            if seen.insert(phrase.clone()) {
                phrases.push(phrase);
                if phrases.len() >= MAX_PHRASES_PER_TEXT {
                    return phrases;
                }
            }
        }
    }

    // CJK has no word delimiters; character bigrams over each contiguous run.
    let mut run: Vec<char> = Vec::new();
    let flush_run = |run: &mut Vec<char>, phrases: &mut Vec<String>, seen: &mut BTreeSet<String>| {
        for pair in run.windows(2) {
            let phrase: String = pair.iter().collect();
            if seen.insert(phrase.clone()) {
                phrases.push(phrase);
            }
        }
        run.clear();
    };
    for c in text.chars() {
        if is_cjk(c) {
            run.push(c);
        } else if !run.is_empty() {
            flush_run(&mut run, &mut phrases, &mut seen);
        }
        if phrases.len() >= MAX_PHRASES_PER_TEXT {
            return phrases;
        }
    }
    if !run.is_empty() {
        flush_run(&mut run, &mut phrases, &mut seen);
    }
    phrases.truncate(MAX_PHRASES_PER_TEXT);
    phrases
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}')
}

fn is_cjk_str(s: &str) -> bool {
    s.chars().any(is_cjk)
}
