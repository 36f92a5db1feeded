//! Engine statistics.

use super::MemoryEngine;
use serde::{Deserialize, Serialize};

/// A point-in-time snapshot of engine state, as reported by the stats
/// surfaces. The mode is reported under its current name only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub mode: String,
    pub total_records: u64,
    pub live_records: u64,
    pub scope_count: usize,
    pub entity_count: usize,
    pub edge_count: usize,
    pub keyword_tokens: usize,
    pub vector_entries: Option<usize>,
    pub open_contradictions: usize,
    /// Present only when the gate enables foreshadowing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_foreshadowing: Option<usize>,
}

impl MemoryEngine {
    /// Gather statistics across every open scope.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let scopes = self.scopes.lock();
        let total_records = scopes.values().map(|archive| archive.total_records()).sum();
        let live_records = scopes.values().map(|archive| archive.live_records()).sum();
        let scope_count = scopes.len();
        drop(scopes);

        EngineStats {
            mode: self.gate.mode.as_str().to_string(),
            total_records,
            live_records,
            scope_count,
            entity_count: self.indexes.entities.len(),
            edge_count: self.graph.edge_count(),
            keyword_tokens: self.indexes.inverted.token_count(),
            vector_entries: self.indexes.vector.as_ref().map(crate::index::VectorIndex::len),
            open_contradictions: self.graph.open_contradictions().len(),
            active_foreshadowing: self
                .foreshadow
                .as_ref()
                .map(|tracker| tracker.active().len()),
        }
    }
}
