//! Rule-based consistency checks against long-term entity state.
//!
//! Narrative attribute classes (hair colour, species, life state, marital
//! state) are evaluated only when the gate enables narrative consistency;
//! numeric checks and timeline coherence run in every mode.

use crate::config::ModeGate;
use crate::extract::ExtractedEntity;
use crate::index::EntityIndex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

/// Attribute classes tracked by the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeClass {
    LifeState,
    MaritalState,
    HairColor,
    Species,
    Age,
}

impl AttributeClass {
    /// Classes that only make sense for narrative casts.
    #[must_use]
    pub fn is_narrative(&self) -> bool {
        matches!(
            self,
            AttributeClass::LifeState
                | AttributeClass::MaritalState
                | AttributeClass::HairColor
                | AttributeClass::Species
        )
    }

    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            AttributeClass::LifeState => "life_state",
            AttributeClass::MaritalState => "marital_state",
            AttributeClass::HairColor => "hair_color",
            AttributeClass::Species => "species",
            AttributeClass::Age => "age",
        }
    }
}

/// One attribute assertion read from incoming text.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeClaim {
    pub entity_name: String,
    pub class: AttributeClass,
    pub value: String,
    pub negated: bool,
}

/// A detected inconsistency. These land in ingest warnings, never errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    pub entity: String,
    pub rule: String,
    pub detail: String,
}

fn life_state_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?P<name>[A-Z][\w']*(?:\s+[A-Z][\w']*)*)\s+(?:is|was)\s+(?P<neg>not\s+)?(?P<state>dead|alive)\b")
            .expect("valid life-state regex")
    })
}

fn marital_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?P<name>[A-Z][\w']*(?:\s+[A-Z][\w']*)*)\s+(?:is|got)\s+(?P<neg>not\s+)?(?P<state>married|single|divorced|widowed)\b")
            .expect("valid marital regex")
    })
}

fn hair_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?P<name>[A-Z][\w']*(?:\s+[A-Z][\w']*)*)(?:'s)?\s+(?:has\s+|hair\s+is\s+)(?P<color>black|brown|blonde?|red|grey|gray|white|silver|blue|green|pink)\s*(?:hair)?\b")
            .expect("valid hair regex")
    })
}

fn species_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?P<name>[A-Z][\w']*(?:\s+[A-Z][\w']*)*)\s+is\s+(?:an?\s+)?(?P<species>human|elf|dwarf|orc|vampire|werewolf|dragon|android|robot)\b")
            .expect("valid species regex")
    })
}

fn age_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?P<name>[A-Z][\w']*(?:\s+[A-Z][\w']*)*)\s+is\s+(?P<age>\d{1,3})\s+years?\s+old\b")
            .expect("valid age regex")
    })
}

fn lifespan_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?P<name>[A-Z][\w']*(?:\s+[A-Z][\w']*)*)\s+(?:was\s+born|died)\s+in\s+(?P<year>(?:19|20)\d{2})\b")
            .expect("valid lifespan regex")
    })
}

/// Pull attribute claims out of text, limited to recognized entities.
#[must_use]
pub fn attribute_claims(text: &str, recognized: &[ExtractedEntity]) -> Vec<AttributeClaim> {
    let known = |name: &str| {
        recognized
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(name))
    };
    let mut claims = Vec::new();

    for capture in life_state_pattern().captures_iter(text) {
        let name = capture["name"].to_string();
        if known(&name) {
            claims.push(AttributeClaim {
                entity_name: name,
                class: AttributeClass::LifeState,
                value: capture["state"].to_lowercase(),
                negated: capture.name("neg").is_some(),
            });
        }
    }
    for capture in marital_pattern().captures_iter(text) {
        let name = capture["name"].to_string();
        if known(&name) {
            claims.push(AttributeClaim {
                entity_name: name,
                class: AttributeClass::MaritalState,
                value: capture["state"].to_lowercase(),
                negated: capture.name("neg").is_some(),
            });
        }
    }
    for capture in hair_pattern().captures_iter(text) {
        let name = capture["name"].to_string();
        if known(&name) {
            claims.push(AttributeClaim {
                entity_name: name,
                class: AttributeClass::HairColor,
                value: capture["color"].to_lowercase(),
                negated: false,
            });
        }
    }
    for capture in species_pattern().captures_iter(text) {
        let name = capture["name"].to_string();
        if known(&name) {
            claims.push(AttributeClaim {
                entity_name: name,
                class: AttributeClass::Species,
                value: capture["species"].to_lowercase(),
                negated: false,
            });
        }
    }
    for capture in age_pattern().captures_iter(text) {
        let name = capture["name"].to_string();
        if known(&name) {
            claims.push(AttributeClaim {
                entity_name: name,
                class: AttributeClass::Age,
                value: capture["age"].to_string(),
                negated: false,
            });
        }
    }
    claims
}

/// Values within one attribute class are mutually exclusive: a differing
/// claim is a conflict (dead vs alive, married vs single, brown vs red).
fn states_conflict(stored: &str, claimed: &str) -> bool {
    stored != claimed
}

/// The consistency checker, gated at construction.
#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    narrative_checks: bool,
}

impl ConsistencyChecker {
    #[must_use]
    pub fn new(gate: &ModeGate) -> Self {
        Self {
            narrative_checks: gate.narrative_consistency,
        }
    }

    /// Compare incoming claims against stored entity attributes, then store
    /// the new values. Returns every detected issue.
    pub fn check_and_record(
        &self,
        text: &str,
        recognized: &[ExtractedEntity],
        entity_ids: &[(String, String)],
        entities: &EntityIndex,
    ) -> Vec<ConsistencyIssue> {
        let mut issues = Vec::new();

        for claim in attribute_claims(text, recognized) {
            if claim.class.is_narrative() && !self.narrative_checks {
                continue;
            }
            let Some((_, entity_id)) = entity_ids
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&claim.entity_name))
            else {
                continue;
            };
            let Some(entity) = entities.get(entity_id) else {
                continue;
            };

            if let Some(stored) = entity.attributes.get(claim.class.key()) {
                if claim.negated {
                    // "X is not dead" while we recorded dead.
                    if stored == &claim.value {
                        issues.push(ConsistencyIssue {
                            entity: claim.entity_name.clone(),
                            rule: "negation".to_string(),
                            detail: format!(
                                "text negates {} = {stored}, which is on record",
                                claim.class.key()
                            ),
                        });
                    }
                    continue;
                }
                if states_conflict(stored, &claim.value) {
                    issues.push(ConsistencyIssue {
                        entity: claim.entity_name.clone(),
                        rule: "attribute_conflict".to_string(),
                        detail: format!(
                            "{} was {stored}, text claims {}",
                            claim.class.key(),
                            claim.value
                        ),
                    });
                }
            }
            if !claim.negated {
                entities.set_attribute(entity_id, claim.class.key(), &claim.value);
            }
        }

        issues.extend(self.timeline_issues(text, entity_ids, entities));
        debug!(count = issues.len(), "consistency check complete");
        issues
    }

    /// Timeline coherence: a death year earlier than a birth year, in the
    /// text itself or against the recorded value. Runs in every mode.
    fn timeline_issues(
        &self,
        text: &str,
        entity_ids: &[(String, String)],
        entities: &EntityIndex,
    ) -> Vec<ConsistencyIssue> {
        let mut issues = Vec::new();
        for capture in lifespan_pattern().captures_iter(text) {
            let name = capture["name"].to_string();
            let year: i32 = match capture["year"].parse() {
                Ok(year) => year,
                Err(_) => continue,
            };
            let event = if capture[0].to_lowercase().contains("born") {
                "birth_year"
            } else {
                "death_year"
            };
            let Some((_, entity_id)) = entity_ids
                .iter()
                .find(|(candidate, _)| candidate.eq_ignore_ascii_case(&name))
            else {
                continue;
            };
            let Some(entity) = entities.get(entity_id) else {
                continue;
            };

            let counterpart = if event == "birth_year" {
                "death_year"
            } else {
                "birth_year"
            };
            if let Some(other) = entity
                .attributes
                .get(counterpart)
                .and_then(|v| v.parse::<i32>().ok())
            {
                let (birth, death) = if event == "birth_year" {
                    (year, other)
                } else {
                    (other, year)
                };
                if death < birth {
                    issues.push(ConsistencyIssue {
                        entity: name.clone(),
                        rule: "timeline".to_string(),
                        detail: format!("death year {death} precedes birth year {birth}"),
                    });
                }
            }
            entities.set_attribute(entity_id, event, &year.to_string());
        }
        issues
    }
}
