//! Relations (graph edges) with bitemporal stamps.

use crate::constants::defaults;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relation types between entities.
///
/// This enum is the single authoritative definition; callers must not
/// duplicate it. The narrative subset is only offered when the mode gate
/// enables narrative relation types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    // General-purpose set
    RelatedTo,
    PartOf,
    Contains,
    DependsOn,
    Describes,
    Precedes,
    Follows,
    Contradicts,
    Supports,
    LocatedIn,
    WorksAt,
    Knows,
    Owns,
    Causes,
    // Narrative set, gated
    AllyOf,
    EnemyOf,
    Loves,
    Hates,
    FamilyOf,
    Guards,
    Serves,
    PossessesItem,
    AfflictedBy,
}

impl RelationType {
    /// All general-purpose relation types.
    pub const GENERAL: &'static [RelationType] = &[
        RelationType::RelatedTo,
        RelationType::PartOf,
        RelationType::Contains,
        RelationType::DependsOn,
        RelationType::Describes,
        RelationType::Precedes,
        RelationType::Follows,
        RelationType::Contradicts,
        RelationType::Supports,
        RelationType::LocatedIn,
        RelationType::WorksAt,
        RelationType::Knows,
        RelationType::Owns,
        RelationType::Causes,
    ];

    /// Narrative-only relation types.
    pub const NARRATIVE: &'static [RelationType] = &[
        RelationType::AllyOf,
        RelationType::EnemyOf,
        RelationType::Loves,
        RelationType::Hates,
        RelationType::FamilyOf,
        RelationType::Guards,
        RelationType::Serves,
        RelationType::PossessesItem,
        RelationType::AfflictedBy,
    ];

    /// Whether this type belongs to the narrative-only subset.
    #[must_use]
    pub fn is_narrative(&self) -> bool {
        Self::NARRATIVE.contains(self)
    }

    /// Stable wire name, matching the serialized form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::RelatedTo => "RELATED_TO",
            RelationType::PartOf => "PART_OF",
            RelationType::Contains => "CONTAINS",
            RelationType::DependsOn => "DEPENDS_ON",
            RelationType::Describes => "DESCRIBES",
            RelationType::Precedes => "PRECEDES",
            RelationType::Follows => "FOLLOWS",
            RelationType::Contradicts => "CONTRADICTS",
            RelationType::Supports => "SUPPORTS",
            RelationType::LocatedIn => "LOCATED_IN",
            RelationType::WorksAt => "WORKS_AT",
            RelationType::Knows => "KNOWS",
            RelationType::Owns => "OWNS",
            RelationType::Causes => "CAUSES",
            RelationType::AllyOf => "ALLY_OF",
            RelationType::EnemyOf => "ENEMY_OF",
            RelationType::Loves => "LOVES",
            RelationType::Hates => "HATES",
            RelationType::FamilyOf => "FAMILY_OF",
            RelationType::Guards => "GUARDS",
            RelationType::Serves => "SERVES",
            RelationType::PossessesItem => "POSSESSES_ITEM",
            RelationType::AfflictedBy => "AFFLICTED_BY",
        }
    }

    /// Parse the wire name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let all = Self::GENERAL.iter().chain(Self::NARRATIVE.iter());
        for t in all {
            if t.as_str().eq_ignore_ascii_case(value.trim()) {
                return Some(t.clone());
            }
        }
        None
    }

    /// Predicate pairs that cannot simultaneously hold for the same
    /// subject-object pair. Used by contradiction detection.
    pub const EXCLUSIVE_PAIRS: &'static [(RelationType, RelationType)] = &[
        (RelationType::Loves, RelationType::Hates),
        (RelationType::AllyOf, RelationType::EnemyOf),
        (RelationType::Supports, RelationType::Contradicts),
        (RelationType::Precedes, RelationType::Follows),
    ];

    /// The mutually exclusive counterpart, if any.
    #[must_use]
    pub fn exclusive_counterpart(&self) -> Option<&'static RelationType> {
        for (a, b) in Self::EXCLUSIVE_PAIRS {
            if a == self {
                return Some(b);
            }
            if b == self {
                return Some(a);
            }
        }
        None
    }
}

/// A half-open fact-time interval. `end = None` means "still holding".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Range covering all time.
    #[must_use]
    pub fn open() -> Self {
        Self::default()
    }

    /// Range starting at `start` with no end.
    #[must_use]
    pub fn from(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Bounded range.
    #[must_use]
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Whether the instant `t` falls inside the range.
    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| s <= t) && self.end.is_none_or(|e| t < e)
    }

    /// Whether two ranges share any instant.
    #[must_use]
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        let starts_before_other_ends = match (self.start, other.end) {
            (Some(s), Some(e)) => s < e,
            _ => true,
        };
        let other_starts_before_self_ends = match (other.start, self.end) {
            (Some(s), Some(e)) => s < e,
            _ => true,
        };
        starts_before_other_ends && other_starts_before_self_ends
    }
}

/// Bitemporal stamp: when the fact held, when we learned it, and when the
/// edge was live in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitemporalStamp {
    /// Fact validity interval
    pub valid: TimeRange,
    /// When the engine learned the fact
    pub known_at: DateTime<Utc>,
    /// System validity interval (set on supersession)
    pub system: TimeRange,
}

impl BitemporalStamp {
    /// Stamp for a fact valid from `valid_from` and live from now.
    #[must_use]
    pub fn starting(valid_from: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        Self {
            valid: TimeRange {
                start: valid_from,
                end: None,
            },
            known_at: now,
            system: TimeRange::from(now),
        }
    }
}

/// A directed edge between two entities.
///
/// Invariant: `(source_entity_id, relation_type, target_entity_id)` is
/// unique in the graph; inserting the same triple again raises confidence
/// instead of adding a second edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source_entity_id: String,
    pub relation_type: RelationType,
    pub target_entity_id: String,
    /// Free-form edge properties
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Monotonically non-decreasing
    pub confidence: f32,
    /// Evidence text the edge was extracted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    /// Archive ordinal of the producing ingest
    pub created_ordinal: u64,
    /// Fact / knowledge / system time
    pub stamp: BitemporalStamp,
}

impl Relation {
    /// Create an edge with the initial confidence and an open system range.
    #[must_use]
    pub fn new(
        source_entity_id: impl Into<String>,
        relation_type: RelationType,
        target_entity_id: impl Into<String>,
        created_ordinal: u64,
    ) -> Self {
        Self {
            source_entity_id: source_entity_id.into(),
            relation_type,
            target_entity_id: target_entity_id.into(),
            properties: BTreeMap::new(),
            confidence: defaults::RELATION_INITIAL_CONFIDENCE,
            source_text: None,
            created_ordinal,
            stamp: BitemporalStamp::starting(None),
        }
    }

    /// Uniqueness key for the graph.
    #[must_use]
    pub fn key(&self) -> (String, RelationType, String) {
        (
            self.source_entity_id.clone(),
            self.relation_type.clone(),
            self.target_entity_id.clone(),
        )
    }

    /// Raise confidence by one step, saturating at 1.0.
    pub fn bump_confidence(&mut self) {
        self.confidence = (self.confidence + defaults::RELATION_CONFIDENCE_STEP).min(1.0);
    }

    /// Whether the edge is currently live in system time.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.stamp.system.end.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single().expect("valid date")
    }

    #[test]
    fn range_containment() {
        let range = TimeRange::between(at(2020), at(2021));
        assert!(range.contains(at(2020)));
        assert!(!range.contains(at(2021)));
        assert!(TimeRange::open().contains(at(1970)));
    }

    #[test]
    fn range_overlap() {
        let a = TimeRange::between(at(2020), at(2022));
        let b = TimeRange::between(at(2021), at(2023));
        let c = TimeRange::between(at(2022), at(2023));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(TimeRange::open().overlaps(&a));
    }

    #[test]
    fn exclusive_pairs_are_symmetric() {
        assert_eq!(
            RelationType::Loves.exclusive_counterpart(),
            Some(&RelationType::Hates)
        );
        assert_eq!(
            RelationType::Hates.exclusive_counterpart(),
            Some(&RelationType::Loves)
        );
        assert_eq!(RelationType::Knows.exclusive_counterpart(), None);
    }

    #[test]
    fn narrative_subset_is_disjoint_from_general() {
        for t in RelationType::NARRATIVE {
            assert!(!RelationType::GENERAL.contains(t));
            assert!(t.is_narrative());
        }
    }
}
