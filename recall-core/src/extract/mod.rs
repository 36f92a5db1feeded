//! Smart extraction: rules, adaptive, or LLM.

mod llm;
pub mod rules;

pub use rules::{complexity, keywords, ExtractedEntity, ExtractedRelation};

use crate::constants::defaults;
use crate::providers::ChatProvider;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How extraction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Deterministic rules only
    Rules,
    /// Rules, plus LLM when the complexity score crosses the threshold
    #[default]
    Adaptive,
    /// Always consult the LLM (still merged with rules)
    Llm,
}

/// Everything extracted from one piece of content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub entities: Vec<ExtractedEntity>,
    pub keywords: Vec<String>,
    pub relations: Vec<ExtractedRelation>,
    /// True when the LLM contributed to this result
    pub llm_assisted: bool,
}

/// The extractor. Holds no provider itself; the engine passes its chat
/// provider (if any) per call so batch ingest can force rules mode.
#[derive(Debug, Clone)]
pub struct SmartExtractor {
    mode: ExtractionMode,
    llm_threshold: f32,
}

impl Default for SmartExtractor {
    fn default() -> Self {
        Self::new(ExtractionMode::default())
    }
}

impl SmartExtractor {
    #[must_use]
    pub fn new(mode: ExtractionMode) -> Self {
        Self {
            mode,
            llm_threshold: defaults::ADAPTIVE_COMPLEXITY_THRESHOLD,
        }
    }

    #[must_use]
    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Extract entities, keywords, and relations.
    ///
    /// The rules pass always runs and its result stands alone; LLM output
    /// (when the mode and complexity call for it, and a provider exists) is
    /// merged on top. A failing provider degrades to the rules result.
    pub fn extract(&self, text: &str, provider: Option<&dyn ChatProvider>) -> Extraction {
        let mut entities = rules::entities(text);
        let keywords = rules::keywords(text);

        let consult_llm = match self.mode {
            ExtractionMode::Rules => false,
            ExtractionMode::Llm => true,
            ExtractionMode::Adaptive => rules::complexity(text) >= self.llm_threshold,
        };

        let mut llm_assisted = false;
        let mut llm_relations = Vec::new();
        if consult_llm {
            if let Some(provider) = provider {
                match llm::extract_with_llm(provider, text) {
                    Ok((llm_entities, relations)) => {
                        llm_assisted = true;
                        llm_relations = relations;
                        for entity in llm_entities {
                            let known = entities
                                .iter()
                                .any(|e| e.name.eq_ignore_ascii_case(&entity.name));
                            if !known {
                                entities.push(entity);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "LLM extraction unavailable, using rules output");
                    }
                }
            }
        }

        let mut relations = rules::relations(text, &entities);
        for relation in llm_relations {
            let duplicate = relations.iter().any(|r| {
                r.source_name.eq_ignore_ascii_case(&relation.source_name)
                    && r.relation_type == relation.relation_type
                    && r.target_name.eq_ignore_ascii_case(&relation.target_name)
            });
            if !duplicate {
                relations.push(relation);
            }
        }

        Extraction {
            entities,
            keywords,
            relations,
            llm_assisted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityType, RelationType};

    #[test]
    fn rules_mode_never_needs_a_provider() {
        let extractor = SmartExtractor::new(ExtractionMode::Rules);
        let extraction = extractor.extract("Alice works at Acme Corp in Paris", None);
        assert!(!extraction.llm_assisted);
        assert!(extraction
            .entities
            .iter()
            .any(|e| e.name == "Alice"));
        assert!(extraction
            .relations
            .iter()
            .any(|r| r.relation_type == RelationType::WorksAt));
        assert!(extraction.keywords.contains(&"acme".to_string()));
    }

    #[test]
    fn adaptive_without_provider_still_works() {
        let extractor = SmartExtractor::new(ExtractionMode::Adaptive);
        let text = "On January 5, 2023, Alice Johnson of Acme Corp met Bob Smith in Paris \
                    to discuss the Globex acquisition with Carol White and Dave Brown.";
        let extraction = extractor.extract(text, None);
        assert!(!extraction.llm_assisted);
        assert!(!extraction.entities.is_empty());
    }

    #[test]
    fn llm_entities_merge_without_duplicates() {
        use crate::providers::{ChatMessage, ChatOptions, ChatResponse, ChatUsage};

        struct Canned;
        impl ChatProvider for Canned {
            fn chat(&self, _: &[ChatMessage], _: &ChatOptions) -> crate::Result<ChatResponse> {
                Ok(ChatResponse {
                    content: "{\"entities\": [{\"name\": \"Alice\", \"type\": \"person\"}, \
                              {\"name\": \"quantum router\", \"type\": \"item\"}]}"
                        .to_string(),
                    usage: ChatUsage::default(),
                })
            }
            fn model_name(&self) -> &str {
                "canned"
            }
        }

        let extractor = SmartExtractor::new(ExtractionMode::Llm);
        let extraction = extractor.extract("Alice bought a quantum router", Some(&Canned));
        assert!(extraction.llm_assisted);
        let alice_count = extraction
            .entities
            .iter()
            .filter(|e| e.name.eq_ignore_ascii_case("alice"))
            .count();
        assert_eq!(alice_count, 1);
        assert!(extraction
            .entities
            .iter()
            .any(|e| e.entity_type == EntityType::Item));
    }
}
