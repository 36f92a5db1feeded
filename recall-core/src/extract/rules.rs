//! Rule-based extraction: keywords, entities, relations, complexity.
//!
//! The rules path is complete on its own — the engine is fully operational
//! with no LLM configured.

use crate::constants::defaults;
use crate::types::{EntityType, RelationType};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// An entity surface form recognized in text.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: EntityType,
    pub aliases: Vec<String>,
}

/// A relation recognized between two surface forms.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRelation {
    pub source_name: String,
    pub relation_type: RelationType,
    pub target_name: String,
    /// The sentence the relation was read from
    pub evidence: String,
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "of", "in", "on", "at", "to",
    "for", "from", "with", "by", "about", "as", "is", "are", "was", "were", "be", "been",
    "being", "it", "its", "this", "that", "these", "those", "he", "she", "they", "we", "you",
    "i", "his", "her", "their", "our", "your", "my", "me", "him", "them", "us", "not", "no",
    "so", "do", "does", "did", "have", "has", "had", "will", "would", "can", "could", "should",
    "may", "might", "there", "here", "what", "which", "who", "when", "where", "how", "why",
    "all", "each", "very", "just", "than", "too", "also", "into", "over", "under", "again",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

fn temporal_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b((19|20)\d{2}|january|february|march|april|may|june|july|august|september|october|november|december|yesterday|today|tomorrow|monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
        )
        .expect("valid temporal regex")
    })
}

fn org_suffix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(inc|corp|corporation|ltd|llc|gmbh|university|institute|company|labs|bank|agency|ministry)\.?$")
            .expect("valid org regex")
    })
}

/// Normalized keyword tokens: lower-cased, stopwords out, order-preserving
/// dedup, capped.
#[must_use]
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !stopwords().contains(t))
    {
        if seen.insert(token.to_string()) {
            out.push(token.to_string());
            if out.len() >= defaults::MAX_KEYWORDS_PER_RECORD {
                break;
            }
        }
    }
    out
}

fn is_capitalized(word: &str) -> bool {
    word.chars()
        .next()
        .is_some_and(|c| c.is_uppercase())
}

/// Classify a capitalized run by cue words around it.
fn classify(name: &str, preceding: Option<&str>) -> EntityType {
    if org_suffix_pattern().is_match(name) {
        return EntityType::Organization;
    }
    if temporal_pattern().is_match(name) {
        return EntityType::Time;
    }
    match preceding.map(str::to_lowercase).as_deref() {
        Some("in" | "at" | "near" | "from") => EntityType::Location,
        _ => {
            let word_count = name.split_whitespace().count();
            if word_count <= 2 {
                EntityType::Person
            } else {
                EntityType::Concept
            }
        }
    }
}

/// Capitalized-run entity recognition.
///
/// A run of capitalized words (skipping a sentence-initial stopword) forms
/// one candidate; the type comes from suffix and preposition cues. Crude
/// next to a statistical tagger, but deterministic and dependency-free.
#[must_use]
pub fn entities(text: &str) -> Vec<ExtractedEntity> {
    let mut out: Vec<ExtractedEntity> = Vec::new();
    let mut seen = HashSet::new();

    for sentence in text.split(['.', '!', '?', '\n', ';']) {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        let mut run: Vec<&str> = Vec::new();
        let mut run_start = 0usize;

        let flush = |run: &mut Vec<&str>, run_start: usize, out: &mut Vec<ExtractedEntity>, seen: &mut HashSet<String>, words: &[&str]| {
            if run.is_empty() {
                return;
            }
            // A sentence-initial single common word is usually just case.
            let sentence_initial = run_start == 0 && run.len() == 1;
            let name = run.join(" ");
            let lowered = name.to_lowercase();
            if sentence_initial && stopwords().contains(lowered.as_str()) {
                run.clear();
                return;
            }
            let trimmed = name.trim_matches(|c: char| c == ',' || c == ':' || c == '\'');
            if trimmed.len() >= 2 && seen.insert(trimmed.to_lowercase()) {
                let preceding = run_start
                    .checked_sub(1)
                    .and_then(|i| words.get(i))
                    .copied();
                out.push(ExtractedEntity {
                    name: trimmed.to_string(),
                    entity_type: classify(trimmed, preceding),
                    aliases: Vec::new(),
                });
            }
            run.clear();
        };

        for (i, word) in words.iter().enumerate() {
            let cleaned = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
            if !cleaned.is_empty() && is_capitalized(cleaned) {
                if run.is_empty() {
                    run_start = i;
                }
                run.push(cleaned);
            } else {
                flush(&mut run, run_start, &mut out, &mut seen, &words);
            }
        }
        flush(&mut run, run_start, &mut out, &mut seen, &words);
    }
    out
}

/// Relation verb cue table: phrase → relation type.
const RELATION_CUES: &[(&str, RelationType)] = &[
    ("works at", RelationType::WorksAt),
    ("works for", RelationType::WorksAt),
    ("is employed by", RelationType::WorksAt),
    ("lives in", RelationType::LocatedIn),
    ("is located in", RelationType::LocatedIn),
    ("is in", RelationType::LocatedIn),
    ("moved to", RelationType::LocatedIn),
    ("owns", RelationType::Owns),
    ("knows", RelationType::Knows),
    ("depends on", RelationType::DependsOn),
    ("is part of", RelationType::PartOf),
    ("part of", RelationType::PartOf),
    ("contains", RelationType::Contains),
    ("causes", RelationType::Causes),
    ("loves", RelationType::Loves),
    ("hates", RelationType::Hates),
    ("serves", RelationType::Serves),
    ("guards", RelationType::Guards),
];

/// Pattern-matched relations between already-recognized entities.
///
/// For each entity pair appearing in one sentence, the span between them is
/// checked against the cue table. Narrative-only cues are filtered by the
/// caller when the gate has them off.
#[must_use]
pub fn relations(text: &str, recognized: &[ExtractedEntity]) -> Vec<ExtractedRelation> {
    let mut out = Vec::new();
    for sentence in text.split(['.', '!', '?', '\n', ';']) {
        let lower = sentence.to_lowercase();
        let present: Vec<&ExtractedEntity> = recognized
            .iter()
            .filter(|entity| lower.contains(&entity.name.to_lowercase()))
            .collect();
        if present.len() < 2 {
            continue;
        }
        for source in &present {
            for target in &present {
                if source.name == target.name {
                    continue;
                }
                let source_lower = source.name.to_lowercase();
                let target_lower = target.name.to_lowercase();
                let (Some(source_pos), Some(target_pos)) =
                    (lower.find(&source_lower), lower.find(&target_lower))
                else {
                    continue;
                };
                if source_pos + source_lower.len() > target_pos {
                    continue;
                }
                let between = &lower[source_pos + source_lower.len()..target_pos];
                for (cue, relation_type) in RELATION_CUES {
                    if between.contains(cue) {
                        out.push(ExtractedRelation {
                            source_name: source.name.clone(),
                            relation_type: relation_type.clone(),
                            target_name: target.name.clone(),
                            evidence: sentence.trim().to_string(),
                        });
                        break;
                    }
                }
            }
        }
    }
    out
}

/// Adaptive-extraction complexity score in `[0, 1]`.
///
/// Monotone in length, entity-like token count, punctuation density, and
/// the presence of temporal tokens.
#[must_use]
pub fn complexity(text: &str) -> f32 {
    let chars = text.chars().count() as f32;
    if chars == 0.0 {
        return 0.0;
    }
    let length_signal = (chars / 500.0).min(1.0);
    let entity_signal = (entities(text).len() as f32 / 8.0).min(1.0);
    let punctuation = text
        .chars()
        .filter(|c| c.is_ascii_punctuation())
        .count() as f32;
    let punctuation_signal = (punctuation / chars * 10.0).min(1.0);
    let temporal_signal = if temporal_pattern().is_match(text) { 1.0 } else { 0.0 };

    0.35 * length_signal + 0.35 * entity_signal + 0.15 * punctuation_signal + 0.15 * temporal_signal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_drop_stopwords_and_dedup() {
        let ks = keywords("The capital of France is the city of Paris, Paris!");
        assert!(ks.contains(&"capital".to_string()));
        assert!(ks.contains(&"paris".to_string()));
        assert!(!ks.contains(&"the".to_string()));
        assert_eq!(ks.iter().filter(|k| *k == "paris").count(), 1);
    }

    #[test]
    fn entities_recognize_people_places_orgs() {
        let found = entities("Alice Johnson works at Acme Corp. She lives in Paris.");
        let names: Vec<&str> = found.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"Alice Johnson"));
        assert!(names.contains(&"Acme Corp"));
        assert!(names.contains(&"Paris"));

        let acme = found.iter().find(|e| e.name == "Acme Corp").expect("acme");
        assert_eq!(acme.entity_type, EntityType::Organization);
        let paris = found.iter().find(|e| e.name == "Paris").expect("paris");
        assert_eq!(paris.entity_type, EntityType::Location);
    }

    #[test]
    fn sentence_initial_stopword_is_not_an_entity() {
        let found = entities("The weather is nice");
        assert!(found.iter().all(|e| e.name != "The"));
    }

    #[test]
    fn relations_follow_cue_table() {
        let ents = entities("Alice works at Acme Corp");
        let rels = relations("Alice works at Acme Corp", &ents);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].source_name, "Alice");
        assert_eq!(rels[0].relation_type, RelationType::WorksAt);
        assert_eq!(rels[0].target_name, "Acme Corp");
    }

    #[test]
    fn complexity_is_monotone_in_signal_presence() {
        let simple = complexity("ok");
        let rich = complexity(
            "On January 5, 2023, Alice Johnson of Acme Corp met Bob Smith in Paris to discuss \
             the Globex acquisition; the deal, valued at $2M, closes in March.",
        );
        assert!(rich > simple);
        assert!((0.0..=1.0).contains(&rich));
    }
}
