//! Metadata index: four parallel inverted maps over record metadata.

use crate::archive::write_json_atomic;
use crate::constants::layout;
use crate::error::Result;
use crate::types::{ContentType, RecordMetadata};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataSnapshot {
    by_source: HashMap<String, BTreeSet<String>>,
    by_tag: HashMap<String, BTreeSet<String>>,
    by_category: HashMap<String, BTreeSet<String>>,
    by_content_type: HashMap<String, BTreeSet<String>>,
}

/// Filter conditions; all supplied fields must match (intersection).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
}

impl MetadataFilter {
    /// Whether any condition is set.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.source.is_some()
            || !self.tags.is_empty()
            || self.category.is_some()
            || self.content_type.is_some()
    }
}

/// Source / tag / category / content-type postings.
pub struct MetadataIndex {
    dir: PathBuf,
    state: Mutex<MetadataSnapshot>,
}

impl MetadataIndex {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let snapshot: MetadataSnapshot =
            crate::archive::read_json(&dir.join(layout::METADATA_SNAPSHOT))?.unwrap_or_default();
        Ok(Self {
            dir,
            state: Mutex::new(snapshot),
        })
    }

    pub fn add(&self, id: &str, metadata: &RecordMetadata) {
        let mut state = self.state.lock();
        if let Some(source) = &metadata.source {
            state
                .by_source
                .entry(source.clone())
                .or_default()
                .insert(id.to_string());
        }
        for tag in &metadata.tags {
            state
                .by_tag
                .entry(tag.clone())
                .or_default()
                .insert(id.to_string());
        }
        if let Some(category) = &metadata.category {
            state
                .by_category
                .entry(category.clone())
                .or_default()
                .insert(id.to_string());
        }
        state
            .by_content_type
            .entry(metadata.content_type.as_str().to_string())
            .or_default()
            .insert(id.to_string());
    }

    pub fn remove(&self, id: &str) {
        let mut state = self.state.lock();
        let snapshot = &mut *state;
        for map in [
            &mut snapshot.by_source,
            &mut snapshot.by_tag,
            &mut snapshot.by_category,
            &mut snapshot.by_content_type,
        ] {
            map.retain(|_, set| {
                set.remove(id);
                !set.is_empty()
            });
        }
    }

    /// Ids matching every supplied condition. `None` means the filter was
    /// inactive and the caller should not constrain by metadata.
    pub fn query(&self, filter: &MetadataFilter) -> Option<BTreeSet<String>> {
        if !filter.is_active() {
            return None;
        }
        let state = self.state.lock();
        let mut result: Option<BTreeSet<String>> = None;

        let mut intersect = |set: Option<&BTreeSet<String>>| {
            let set = set.cloned().unwrap_or_default();
            result = Some(match result.take() {
                Some(acc) => acc.intersection(&set).cloned().collect(),
                None => set,
            });
        };

        if let Some(source) = &filter.source {
            intersect(state.by_source.get(source));
        }
        for tag in &filter.tags {
            intersect(state.by_tag.get(tag));
        }
        if let Some(category) = &filter.category {
            intersect(state.by_category.get(category));
        }
        if let Some(content_type) = &filter.content_type {
            intersect(state.by_content_type.get(content_type.as_str()));
        }
        result
    }

    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock();
        write_json_atomic(&self.dir.join(layout::METADATA_SNAPSHOT), &*state)
    }

    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        *state = MetadataSnapshot::default();
        write_json_atomic(&self.dir.join(layout::METADATA_SNAPSHOT), &*state)
    }
}
