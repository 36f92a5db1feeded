//! Opt-in layers for the extended retrieval configuration.
//!
//! The default funnel is four parallel paths plus fusion. The layered
//! configuration adds a bloom pre-filter, a temporal pre-filter, graph
//! expansion from seed entities, and an optional LLM relevance filter;
//! with only the builtin rerank selected the output stays identical to
//! the default pipeline.

use crate::graph::KnowledgeGraph;
use crate::index::EntityIndex;
use crate::providers::{ChatMessage, ChatOptions, ChatProvider};
use std::collections::BTreeSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use tracing::warn;

/// A fixed-size bloom filter over query-relevant tokens.
///
/// Used as a cheap pre-filter: a token that is definitely absent from the
/// corpus skips its posting lookup entirely.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    hashes: u32,
}

impl BloomFilter {
    /// Sized for `expected` entries at roughly 1% false positives.
    #[must_use]
    pub fn new(expected: usize) -> Self {
        let bit_count = (expected.max(64) * 10).next_power_of_two();
        Self {
            bits: vec![0; bit_count / 64],
            hashes: 7,
        }
    }

    fn positions(&self, item: &str) -> impl Iterator<Item = usize> + '_ {
        let mut hasher = DefaultHasher::new();
        item.hash(&mut hasher);
        let h1 = hasher.finish();
        let h2 = h1.rotate_left(31) | 1;
        let bit_count = (self.bits.len() * 64) as u64;
        (0..self.hashes).map(move |i| {
            (h1.wrapping_add(h2.wrapping_mul(u64::from(i))) % bit_count) as usize
        })
    }

    pub fn insert(&mut self, item: &str) {
        let positions: Vec<usize> = self.positions(item).collect();
        for pos in positions {
            self.bits[pos / 64] |= 1 << (pos % 64);
        }
    }

    /// False means definitely absent; true means possibly present.
    #[must_use]
    pub fn might_contain(&self, item: &str) -> bool {
        self.positions(item)
            .all(|pos| self.bits[pos / 64] & (1 << (pos % 64)) != 0)
    }
}

/// Graph BFS expansion: memories referenced by entities within `depth`
/// hops of the seed entities found in the query.
#[must_use]
pub fn graph_expansion(
    seed_names: &[String],
    entities: &EntityIndex,
    graph: &KnowledgeGraph,
    depth: usize,
) -> Vec<String> {
    let mut related_entities: BTreeSet<String> = BTreeSet::new();
    for name in seed_names {
        if let Some(entity) = entities.resolve(name) {
            let (reachable, _) = graph.subgraph(&entity.id, depth);
            related_entities.extend(reachable);
        }
    }
    let mut memories: BTreeSet<String> = BTreeSet::new();
    for entity_id in related_entities {
        if let Some(entity) = entities.get(&entity_id) {
            memories.extend(entity.references.iter().cloned());
        }
    }
    memories.into_iter().collect()
}

/// LLM relevance filter: keep only candidates the model judges relevant.
///
/// Any provider failure keeps every candidate — the filter can only ever
/// narrow, never lose results to an outage.
#[must_use]
pub fn llm_relevance_filter(
    provider: &dyn ChatProvider,
    query: &str,
    candidates: Vec<(String, String)>,
) -> Vec<String> {
    let listing: String = candidates
        .iter()
        .enumerate()
        .map(|(i, (_, content))| format!("{i}: {content}\n"))
        .collect();
    let prompt = format!(
        "Query: {query}\n\nCandidates:\n{listing}\n\
         Reply with only the numbers of candidates relevant to the query, comma-separated."
    );
    let messages = [
        ChatMessage::system("You filter search results for relevance."),
        ChatMessage::user(prompt),
    ];
    match provider.chat(&messages, &ChatOptions::default()) {
        Ok(response) => {
            let kept: BTreeSet<usize> = response
                .content
                .split(|c: char| !c.is_ascii_digit())
                .filter_map(|s| s.parse().ok())
                .collect();
            if kept.is_empty() {
                return candidates.into_iter().map(|(id, _)| id).collect();
            }
            candidates
                .into_iter()
                .enumerate()
                .filter(|(i, _)| kept.contains(i))
                .map(|(_, (id, _))| id)
                .collect()
        }
        Err(e) => {
            warn!(error = %e, "LLM relevance filter unavailable, keeping all candidates");
            candidates.into_iter().map(|(id, _)| id).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityType, Relation, RelationType, ResolutionStrategy};

    #[test]
    fn bloom_filter_has_no_false_negatives() {
        let mut bloom = BloomFilter::new(100);
        for i in 0..100 {
            bloom.insert(&format!("token-{i}"));
        }
        for i in 0..100 {
            assert!(bloom.might_contain(&format!("token-{i}")));
        }
    }

    #[test]
    fn bloom_filter_rejects_most_absent_items() {
        let mut bloom = BloomFilter::new(100);
        for i in 0..100 {
            bloom.insert(&format!("token-{i}"));
        }
        let false_positives = (0..1000)
            .filter(|i| bloom.might_contain(&format!("absent-{i}")))
            .count();
        assert!(false_positives < 50, "too many false positives: {false_positives}");
    }

    #[test]
    fn graph_expansion_reaches_neighbour_references() {
        let dir = tempfile::tempdir().expect("tempdir");
        let entities = EntityIndex::open(dir.path().join("e")).expect("entities");
        let graph = KnowledgeGraph::open(dir.path().join("g")).expect("graph");

        let alice = entities.observe("Alice", EntityType::Person, "m-alice", &[]);
        let acme = entities.observe("Acme", EntityType::Organization, "m-acme", &[]);
        graph
            .add_edge(
                Relation::new(alice, RelationType::WorksAt, acme, 0),
                ResolutionStrategy::Auto,
            )
            .expect("edge");

        let memories = graph_expansion(&["Alice".to_string()], &entities, &graph, 1);
        assert!(memories.contains(&"m-alice".to_string()));
        assert!(memories.contains(&"m-acme".to_string()));
    }

    #[test]
    fn relevance_filter_keeps_all_on_provider_failure() {
        struct Down;
        impl ChatProvider for Down {
            fn chat(
                &self,
                _: &[ChatMessage],
                _: &ChatOptions,
            ) -> crate::Result<crate::providers::ChatResponse> {
                Err(crate::Error::ProviderUnavailable("down".to_string()))
            }
            fn model_name(&self) -> &str {
                "down"
            }
        }
        let kept = llm_relevance_filter(
            &Down,
            "query",
            vec![
                ("a".to_string(), "first".to_string()),
                ("b".to_string(), "second".to_string()),
            ],
        );
        assert_eq!(kept.len(), 2);
    }
}
