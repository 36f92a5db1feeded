//! Temporal index over bitemporal record stamps.
//!
//! Each indexed record carries a fact range, a knowledge timestamp, and a
//! system range. Five sorted arrays — fact-start, fact-end, system-start,
//! system-end, knowledge-time — are maintained in lockstep by bisected
//! insertion, so point and range queries are O(log n + k) binary searches
//! with a containment post-filter.

use crate::archive::write_json_atomic;
use crate::constants::layout;
use crate::error::Result;
use crate::types::TimeRange;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Bitemporal stamp for one indexed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalEntry {
    pub fact: TimeRange,
    pub known_at: DateTime<Utc>,
    pub system: TimeRange,
}

impl TemporalEntry {
    /// Entry for a fact holding over `fact`, learned now.
    #[must_use]
    pub fn new(fact: TimeRange) -> Self {
        let now = Utc::now();
        Self {
            fact,
            known_at: now,
            system: TimeRange::from(now),
        }
    }
}

/// Sort key for an optional range bound: open starts sort first, open ends
/// sort last.
fn start_key(bound: Option<DateTime<Utc>>) -> i64 {
    bound.map_or(i64::MIN, |t| t.timestamp_millis())
}

fn end_key(bound: Option<DateTime<Utc>>) -> i64 {
    bound.map_or(i64::MAX, |t| t.timestamp_millis())
}

#[derive(Debug, Default)]
struct SortedArrays {
    by_fact_start: Vec<(i64, String)>,
    by_fact_end: Vec<(i64, String)>,
    by_system_start: Vec<(i64, String)>,
    by_system_end: Vec<(i64, String)>,
    by_known_at: Vec<(i64, String)>,
}

impl SortedArrays {
    fn insert_into(array: &mut Vec<(i64, String)>, key: i64, id: &str) {
        let item = (key, id.to_string());
        let pos = array.partition_point(|existing| *existing < item);
        array.insert(pos, item);
    }

    fn remove_from(array: &mut Vec<(i64, String)>, key: i64, id: &str) {
        if let Some(pos) = array
            .iter()
            .position(|(k, existing)| *k == key && existing.as_str() == id)
        {
            array.remove(pos);
        }
    }

    fn insert(&mut self, id: &str, entry: &TemporalEntry) {
        Self::insert_into(&mut self.by_fact_start, start_key(entry.fact.start), id);
        Self::insert_into(&mut self.by_fact_end, end_key(entry.fact.end), id);
        Self::insert_into(&mut self.by_system_start, start_key(entry.system.start), id);
        Self::insert_into(&mut self.by_system_end, end_key(entry.system.end), id);
        Self::insert_into(&mut self.by_known_at, entry.known_at.timestamp_millis(), id);
    }

    fn remove(&mut self, id: &str, entry: &TemporalEntry) {
        Self::remove_from(&mut self.by_fact_start, start_key(entry.fact.start), id);
        Self::remove_from(&mut self.by_fact_end, end_key(entry.fact.end), id);
        Self::remove_from(&mut self.by_system_start, start_key(entry.system.start), id);
        Self::remove_from(&mut self.by_system_end, end_key(entry.system.end), id);
        Self::remove_from(&mut self.by_known_at, entry.known_at.timestamp_millis(), id);
    }
}

struct TemporalState {
    entries: HashMap<String, TemporalEntry>,
    arrays: SortedArrays,
}

/// The temporal index.
pub struct TemporalIndex {
    dir: PathBuf,
    state: Mutex<TemporalState>,
}

impl TemporalIndex {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let entries: HashMap<String, TemporalEntry> =
            crate::archive::read_json(&dir.join(layout::TEMPORAL_SNAPSHOT))?.unwrap_or_default();
        let mut arrays = SortedArrays::default();
        for (id, entry) in &entries {
            arrays.insert(id, entry);
        }
        Ok(Self {
            dir,
            state: Mutex::new(TemporalState { entries, arrays }),
        })
    }

    /// Insert or replace the stamp for `id`.
    pub fn insert(&self, id: &str, entry: TemporalEntry) {
        let mut state = self.state.lock();
        if let Some(previous) = state.entries.remove(id) {
            state.arrays.remove(id, &previous);
        }
        state.arrays.insert(id, &entry);
        state.entries.insert(id.to_string(), entry);
    }

    /// Remove `id` from every sorted array.
    pub fn remove(&self, id: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.remove(id) {
            state.arrays.remove(id, &entry);
        }
    }

    pub fn get(&self, id: &str) -> Option<TemporalEntry> {
        self.state.lock().entries.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids whose fact range contains `t`.
    ///
    /// Binary search bounds the candidates to entries whose fact start is at
    /// or before `t`; containment is post-filtered against the entry map.
    pub fn at_point(&self, t: DateTime<Utc>) -> Vec<String> {
        let state = self.state.lock();
        let key = t.timestamp_millis();
        let upper = state
            .arrays
            .by_fact_start
            .partition_point(|(start, _)| *start <= key);
        let mut out: Vec<String> = state.arrays.by_fact_start[..upper]
            .iter()
            .filter(|(_, id)| {
                state
                    .entries
                    .get(id)
                    .is_some_and(|entry| entry.fact.contains(t))
            })
            .map(|(_, id)| id.clone())
            .collect();
        out.sort();
        out
    }

    /// Ids whose fact range overlaps `[start, end)`.
    pub fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
        let state = self.state.lock();
        let window = TimeRange::between(start, end);
        let end_key = end.timestamp_millis();
        let upper = state
            .arrays
            .by_fact_start
            .partition_point(|(fact_start, _)| *fact_start < end_key);
        let mut out: Vec<String> = state.arrays.by_fact_start[..upper]
            .iter()
            .filter(|(_, id)| {
                state
                    .entries
                    .get(id)
                    .is_some_and(|entry| entry.fact.overlaps(&window))
            })
            .map(|(_, id)| id.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Ids whose fact range ended at or before `t`.
    pub fn before(&self, t: DateTime<Utc>) -> Vec<String> {
        let state = self.state.lock();
        let key = t.timestamp_millis();
        let upper = state
            .arrays
            .by_fact_end
            .partition_point(|(fact_end, _)| *fact_end <= key);
        let mut out: Vec<String> = state.arrays.by_fact_end[..upper]
            .iter()
            .filter(|(_, id)| {
                // Open-ended facts never lie entirely before t.
                state
                    .entries
                    .get(id)
                    .is_some_and(|entry| entry.fact.end.is_some())
            })
            .map(|(_, id)| id.clone())
            .collect();
        out.sort();
        out
    }

    /// Ids whose fact range starts at or after `t`.
    pub fn after(&self, t: DateTime<Utc>) -> Vec<String> {
        let state = self.state.lock();
        let key = t.timestamp_millis();
        let lower = state
            .arrays
            .by_fact_start
            .partition_point(|(fact_start, _)| *fact_start < key);
        let mut out: Vec<String> = state.arrays.by_fact_start[lower..]
            .iter()
            .filter(|(_, id)| {
                state
                    .entries
                    .get(id)
                    .is_some_and(|entry| entry.fact.start.is_some())
            })
            .map(|(_, id)| id.clone())
            .collect();
        out.sort();
        out
    }

    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock();
        write_json_atomic(&self.dir.join(layout::TEMPORAL_SNAPSHOT), &state.entries)
    }

    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.entries.clear();
        state.arrays = SortedArrays::default();
        write_json_atomic(&self.dir.join(layout::TEMPORAL_SNAPSHOT), &state.entries)
    }

    #[cfg(test)]
    fn array_lengths(&self) -> [usize; 5] {
        let state = self.state.lock();
        [
            state.arrays.by_fact_start.len(),
            state.arrays.by_fact_end.len(),
            state.arrays.by_system_start.len(),
            state.arrays.by_system_end.len(),
            state.arrays.by_known_at.len(),
        ]
    }
}
