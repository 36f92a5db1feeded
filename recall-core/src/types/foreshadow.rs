//! Foreshadowing records (narrative mode only).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a foreshadowing hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeshadowStatus {
    Active,
    Resolved,
    Archived,
}

/// How the hint was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForeshadowDetector {
    #[default]
    Manual,
    Llm,
}

/// An unresolved plot hint tracked across a narrative.
///
/// The whole subsystem is absent outside narrative mode; these records can
/// only exist on disk when the gate enabled foreshadowing at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Foreshadowing {
    pub id: String,
    pub content: String,
    pub status: ForeshadowStatus,
    /// Relative weight for context-building, 0.0 to 1.0
    pub importance: f32,
    /// Entity ids the hint involves
    #[serde(default)]
    pub related_entities: Vec<String>,
    /// Archive ordinal at creation
    pub created_ordinal: u64,
    /// Archive ordinal at resolution, if resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_ordinal: Option<u64>,
    /// Archive ordinal of the last reminder emitted into context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reminded_ordinal: Option<u64>,
    #[serde(default)]
    pub detected_by: ForeshadowDetector,
}

impl Foreshadowing {
    /// Create an active hint.
    #[must_use]
    pub fn new(content: impl Into<String>, importance: f32, created_ordinal: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            status: ForeshadowStatus::Active,
            importance: importance.clamp(0.0, 1.0),
            related_entities: Vec::new(),
            created_ordinal,
            resolved_ordinal: None,
            last_reminded_ordinal: None,
            detected_by: ForeshadowDetector::Manual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_is_clamped() {
        assert!((Foreshadowing::new("x", 7.0, 0).importance - 1.0).abs() < f32::EPSILON);
        assert!(Foreshadowing::new("x", -1.0, 0).importance.abs() < f32::EPSILON);
    }
}
