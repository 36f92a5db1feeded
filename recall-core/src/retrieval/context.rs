//! Context builder: lays out retrieved memories under a token budget.

use crate::config::EngineMode;
use crate::constants::defaults;
use crate::types::{Entity, Foreshadowing};

/// Approximate token count: character-weighted, with CJK characters
/// costing more than Latin ones.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    let mut latin = 0usize;
    let mut cjk = 0usize;
    for c in text.chars() {
        if matches!(c,
            '\u{4E00}'..='\u{9FFF}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{3040}'..='\u{30FF}'
            | '\u{AC00}'..='\u{D7AF}')
        {
            cjk += 1;
        } else {
            latin += 1;
        }
    }
    (latin as f32 / defaults::CHARS_PER_TOKEN_LATIN
        + cjk as f32 / defaults::CHARS_PER_TOKEN_CJK)
        .ceil() as usize
}

/// Inputs to one context build.
#[derive(Debug, Clone, Default)]
pub struct ContextInputs {
    /// Ranked `(memory id, content)` pairs, best first
    pub memories: Vec<(String, String)>,
    /// Active hints (narrative mode only; empty elsewhere)
    pub foreshadowing: Vec<Foreshadowing>,
    /// Entities active in this query
    pub focus_entities: Vec<Entity>,
    /// Recent conversation turns, newest last
    pub recent_turns: Vec<String>,
}

fn preamble(mode: EngineMode) -> &'static str {
    match mode {
        EngineMode::Narrative => {
            "## Memory context\nStay consistent with established characters, \
             relationships, and timeline. Never contradict recorded facts."
        }
        EngineMode::General => {
            "## Memory context\nFacts below were previously recorded. \
             Prefer them over guesses; never contradict recorded facts."
        }
        EngineMode::KnowledgeBase => {
            "## Knowledge context\nReference material retrieved for this query. \
             Cite the relevant entries when answering."
        }
    }
}

/// Lay out the context block, stopping before the budget is exceeded.
///
/// Section order: fixed preamble, active foreshadowing, ranked memories,
/// focus entities, recent turns. Whole sections or entries are dropped —
/// never truncated mid-entry.
#[must_use]
pub fn build_context(mode: EngineMode, inputs: &ContextInputs, token_budget: usize) -> String {
    let mut out = String::new();
    let mut spent = 0usize;

    let try_push = |out: &mut String, spent: &mut usize, block: &str| -> bool {
        let cost = estimate_tokens(block);
        if *spent + cost > token_budget {
            return false;
        }
        out.push_str(block);
        *spent += cost;
        true
    };

    let head = format!("{}\n\n", preamble(mode));
    if !try_push(&mut out, &mut spent, &head) {
        return out;
    }

    if !inputs.foreshadowing.is_empty() {
        let _ = try_push(&mut out, &mut spent, "### Unresolved hints\n");
        let mut hints: Vec<&Foreshadowing> = inputs.foreshadowing.iter().collect();
        hints.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for hint in hints {
            let line = format!("- {}\n", hint.content);
            if !try_push(&mut out, &mut spent, &line) {
                break;
            }
        }
        let _ = try_push(&mut out, &mut spent, "\n");
    }

    if !inputs.memories.is_empty() {
        let _ = try_push(&mut out, &mut spent, "### Relevant memories\n");
        for (i, (_, content)) in inputs.memories.iter().enumerate() {
            let line = format!("{}. {content}\n", i + 1);
            if !try_push(&mut out, &mut spent, &line) {
                break;
            }
        }
        let _ = try_push(&mut out, &mut spent, "\n");
    }

    if !inputs.focus_entities.is_empty() {
        let _ = try_push(&mut out, &mut spent, "### Active entities\n");
        for entity in &inputs.focus_entities {
            let attributes = if entity.attributes.is_empty() {
                String::new()
            } else {
                let pairs: Vec<String> = entity
                    .attributes
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                format!(" ({})", pairs.join(", "))
            };
            let line = format!("- {} [{}]{attributes}\n", entity.name, entity.entity_type.label());
            if !try_push(&mut out, &mut spent, &line) {
                break;
            }
        }
        let _ = try_push(&mut out, &mut spent, "\n");
    }

    if !inputs.recent_turns.is_empty() {
        let _ = try_push(&mut out, &mut spent, "### Recent turns\n");
        for turn in &inputs.recent_turns {
            let line = format!("> {turn}\n");
            if !try_push(&mut out, &mut spent, &line) {
                break;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    #[test]
    fn token_estimation_weights_cjk_heavier() {
        let latin = estimate_tokens("hello world this is a test");
        let cjk = estimate_tokens("\u{6771}\u{4eac}\u{90fd}\u{6e2f}\u{533a}\u{4e09}\u{7530}");
        assert!(latin >= 6);
        assert!(cjk >= 4);
    }

    #[test]
    fn budget_stops_memory_listing() {
        let inputs = ContextInputs {
            memories: (0..100)
                .map(|i| (format!("m{i}"), format!("memory number {i} with some padding text")))
                .collect(),
            ..Default::default()
        };
        let context = build_context(EngineMode::General, &inputs, 80);
        assert!(estimate_tokens(&context) <= 80);
        assert!(context.contains("memory number 0"));
        assert!(!context.contains("memory number 99"));
    }

    #[test]
    fn foreshadowing_sorted_by_importance() {
        let inputs = ContextInputs {
            foreshadowing: vec![
                Foreshadowing::new("minor hint", 0.2, 0),
                Foreshadowing::new("major hint", 0.9, 0),
            ],
            ..Default::default()
        };
        let context = build_context(EngineMode::Narrative, &inputs, 500);
        let major = context.find("major hint").expect("major present");
        let minor = context.find("minor hint").expect("minor present");
        assert!(major < minor);
    }

    #[test]
    fn entities_render_attributes() {
        let mut entity = crate::types::Entity::new("Alice", EntityType::Person);
        entity
            .attributes
            .insert("age".to_string(), "30".to_string());
        let inputs = ContextInputs {
            focus_entities: vec![entity],
            ..Default::default()
        };
        let context = build_context(EngineMode::General, &inputs, 500);
        assert!(context.contains("Alice [person] (age=30)"));
    }
}
