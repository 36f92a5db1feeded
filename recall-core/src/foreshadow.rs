//! Foreshadowing tracker (narrative mode only).
//!
//! The engine only constructs this subsystem when the gate enables
//! foreshadowing; in every other mode the field is `None` and the surfaces
//! report the feature as disabled.

use crate::archive::write_json_atomic;
use crate::constants::layout;
use crate::error::{Error, Result};
use crate::types::{ForeshadowDetector, ForeshadowStatus, Foreshadowing};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Tracks unresolved plot hints across a narrative.
pub struct ForeshadowTracker {
    dir: PathBuf,
    state: Mutex<HashMap<String, Foreshadowing>>,
}

impl ForeshadowTracker {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let state: HashMap<String, Foreshadowing> =
            crate::archive::read_json(&dir.join(layout::FORESHADOW_SNAPSHOT))?.unwrap_or_default();
        Ok(Self {
            dir,
            state: Mutex::new(state),
        })
    }

    /// Create an active hint and return it.
    pub fn create(
        &self,
        content: &str,
        importance: f32,
        related_entities: Vec<String>,
        detected_by: ForeshadowDetector,
        created_ordinal: u64,
    ) -> Foreshadowing {
        let mut hint = Foreshadowing::new(content, importance, created_ordinal);
        hint.related_entities = related_entities;
        hint.detected_by = detected_by;
        self.state.lock().insert(hint.id.clone(), hint.clone());
        hint
    }

    pub fn get(&self, id: &str) -> Option<Foreshadowing> {
        self.state.lock().get(id).cloned()
    }

    /// Active hints, most important first.
    pub fn active(&self) -> Vec<Foreshadowing> {
        let mut hints: Vec<Foreshadowing> = self
            .state
            .lock()
            .values()
            .filter(|hint| hint.status == ForeshadowStatus::Active)
            .cloned()
            .collect();
        hints.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hints
    }

    pub fn all(&self) -> Vec<Foreshadowing> {
        self.state.lock().values().cloned().collect()
    }

    /// Mark a hint resolved at the given archive ordinal.
    pub fn resolve(&self, id: &str, resolved_ordinal: u64) -> Result<Foreshadowing> {
        let mut state = self.state.lock();
        let hint = state
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("foreshadowing {id}")))?;
        hint.status = ForeshadowStatus::Resolved;
        hint.resolved_ordinal = Some(resolved_ordinal);
        Ok(hint.clone())
    }

    /// Archive a hint that is no longer worth reminding about.
    pub fn archive(&self, id: &str) -> Result<Foreshadowing> {
        let mut state = self.state.lock();
        let hint = state
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("foreshadowing {id}")))?;
        hint.status = ForeshadowStatus::Archived;
        Ok(hint.clone())
    }

    /// Note that a hint was surfaced into context at this ordinal.
    pub fn mark_reminded(&self, id: &str, ordinal: u64) {
        if let Some(hint) = self.state.lock().get_mut(id) {
            hint.last_reminded_ordinal = Some(ordinal);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock();
        write_json_atomic(&self.dir.join(layout::FORESHADOW_SNAPSHOT), &*state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_create_resolve_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = ForeshadowTracker::open(dir.path()).expect("open");
        let hint = tracker.create(
            "the stranger's ring glints oddly",
            0.8,
            vec![],
            ForeshadowDetector::Manual,
            3,
        );
        assert_eq!(tracker.active().len(), 1);

        tracker.resolve(&hint.id, 17).expect("resolve");
        assert!(tracker.active().is_empty());
        let resolved = tracker.get(&hint.id).expect("hint");
        assert_eq!(resolved.status, ForeshadowStatus::Resolved);
        assert_eq!(resolved.resolved_ordinal, Some(17));
    }

    #[test]
    fn active_sorted_by_importance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = ForeshadowTracker::open(dir.path()).expect("open");
        tracker.create("minor", 0.1, vec![], ForeshadowDetector::Manual, 0);
        tracker.create("major", 0.9, vec![], ForeshadowDetector::Llm, 0);
        let active = tracker.active();
        assert_eq!(active[0].content, "major");
    }

    #[test]
    fn resolve_missing_hint_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracker = ForeshadowTracker::open(dir.path()).expect("open");
        assert!(matches!(
            tracker.resolve("nope", 0),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id;
        {
            let tracker = ForeshadowTracker::open(dir.path()).expect("open");
            id = tracker
                .create("persist me", 0.5, vec![], ForeshadowDetector::Manual, 1)
                .id;
            tracker.flush().expect("flush");
        }
        let tracker = ForeshadowTracker::open(dir.path()).expect("reopen");
        assert!(tracker.get(&id).is_some());
    }
}
