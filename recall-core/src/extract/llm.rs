//! LLM-assisted extraction.
//!
//! Prompts the configured chat provider for strict JSON and merges the
//! result with the rules output. Any provider failure degrades to rules.

use super::rules::{ExtractedEntity, ExtractedRelation};
use crate::error::Result;
use crate::providers::{ChatMessage, ChatOptions, ChatProvider};
use crate::types::{EntityType, RelationType};
use serde::Deserialize;
use tracing::warn;

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract entities and relations from text. \
Respond with only a JSON object: {\"entities\": [{\"name\": str, \"type\": str}], \
\"relations\": [{\"source\": str, \"type\": str, \"target\": str}]}. \
Entity types: person, location, organization, item, concept, event, time. \
Relation types use UPPER_SNAKE_CASE like WORKS_AT, LOCATED_IN, KNOWS, OWNS, PART_OF.";

#[derive(Debug, Deserialize)]
struct LlmEntity {
    name: String,
    #[serde(rename = "type", default)]
    entity_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LlmRelation {
    source: String,
    #[serde(rename = "type")]
    relation_type: String,
    target: String,
}

#[derive(Debug, Default, Deserialize)]
struct LlmExtraction {
    #[serde(default)]
    entities: Vec<LlmEntity>,
    #[serde(default)]
    relations: Vec<LlmRelation>,
}

fn parse_entity_type(value: Option<&str>) -> EntityType {
    match value.map(str::to_lowercase).as_deref() {
        Some("person") => EntityType::Person,
        Some("location") => EntityType::Location,
        Some("organization" | "org") => EntityType::Organization,
        Some("item") => EntityType::Item,
        Some("event") => EntityType::Event,
        Some("time") => EntityType::Time,
        Some("character") => EntityType::Character,
        Some("faction") => EntityType::Faction,
        Some("creature") => EntityType::Creature,
        Some(other) if !other.is_empty() && other != "concept" => {
            EntityType::Custom(other.to_string())
        }
        _ => EntityType::Concept,
    }
}

/// Pull the first JSON object out of a model response that may wrap it in
/// prose or a code fence.
fn extract_json_block(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Ask the provider to extract entities and relations from `text`.
pub fn extract_with_llm(
    provider: &dyn ChatProvider,
    text: &str,
) -> Result<(Vec<ExtractedEntity>, Vec<ExtractedRelation>)> {
    let messages = [
        ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
        ChatMessage::user(text),
    ];
    let response = provider.chat(&messages, &ChatOptions::default())?;

    let parsed: LlmExtraction = extract_json_block(&response.content)
        .and_then(|block| serde_json::from_str(block).ok())
        .unwrap_or_else(|| {
            warn!("LLM extraction returned unparseable output, using empty result");
            LlmExtraction::default()
        });

    let entities = parsed
        .entities
        .into_iter()
        .filter(|e| !e.name.trim().is_empty())
        .map(|e| ExtractedEntity {
            name: e.name.trim().to_string(),
            entity_type: parse_entity_type(e.entity_type.as_deref()),
            aliases: Vec::new(),
        })
        .collect();

    let relations = parsed
        .relations
        .into_iter()
        .filter_map(|r| {
            let relation_type = RelationType::parse(&r.relation_type)?;
            Some(ExtractedRelation {
                source_name: r.source.trim().to_string(),
                relation_type,
                target_name: r.target.trim().to_string(),
                evidence: text.to_string(),
            })
        })
        .collect();

    Ok((entities, relations))
}
