//! Entities extracted from ingested content.

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Entity classification.
///
/// The schema is dynamic: the builtin set is always available, narrative
/// deployments add roleplay types, and callers may register their own via
/// [`EntityType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Location,
    Organization,
    Item,
    Concept,
    Event,
    Time,
    /// Narrative-mode: a player or non-player character
    Character,
    /// Narrative-mode: a faction or allegiance group
    Faction,
    /// Narrative-mode: a named creature or species
    Creature,
    /// User-registered type
    Custom(String),
}

impl EntityType {
    /// Whether this type is only meaningful under the narrative mode gate.
    #[must_use]
    pub fn is_narrative(&self) -> bool {
        matches!(
            self,
            EntityType::Character | EntityType::Faction | EntityType::Creature
        )
    }

    /// Stable label for display and persistence keys.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            EntityType::Person => "person",
            EntityType::Location => "location",
            EntityType::Organization => "organization",
            EntityType::Item => "item",
            EntityType::Concept => "concept",
            EntityType::Event => "event",
            EntityType::Time => "time",
            EntityType::Character => "character",
            EntityType::Faction => "faction",
            EntityType::Creature => "creature",
            EntityType::Custom(name) => name,
        }
    }
}

/// A tracked entity.
///
/// Invariant: the canonical name and every alias resolve to exactly one
/// entity id through the case-folded name index maintained by the entity
/// index. Entities are created on first extraction, merged on
/// re-observation, and never silently destroyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque unique id
    pub id: String,
    /// Canonical name
    pub name: String,
    /// Alternative surface forms
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    /// Classification
    pub entity_type: EntityType,
    /// Memory ids where the entity appears
    #[serde(default)]
    pub references: BTreeSet<String>,
    /// Rises monotonically with re-observations, capped at 1.0
    pub confidence: f32,
    /// Optional short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Structured attributes (hair colour, employer, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Entity {
    /// Create an entity with a fresh id and the initial confidence.
    #[must_use]
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            aliases: BTreeSet::new(),
            entity_type,
            references: BTreeSet::new(),
            confidence: defaults::ENTITY_INITIAL_CONFIDENCE,
            summary: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Raise confidence by one verification step, saturating at 1.0.
    pub fn bump_confidence(&mut self) {
        self.confidence = (self.confidence + defaults::ENTITY_CONFIDENCE_STEP).min(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_monotone_and_capped() {
        let mut entity = Entity::new("Alice", EntityType::Person);
        let mut previous = entity.confidence;
        for _ in 0..20 {
            entity.bump_confidence();
            assert!(entity.confidence >= previous);
            previous = entity.confidence;
        }
        assert!((entity.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn narrative_types_are_flagged() {
        assert!(EntityType::Character.is_narrative());
        assert!(!EntityType::Person.is_narrative());
        assert_eq!(EntityType::Custom("ship".to_string()).label(), "ship");
    }
}
