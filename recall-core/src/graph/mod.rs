//! Temporal knowledge graph with contradiction detection.
//!
//! Adjacency-list storage over entity ids: `outgoing[source]`,
//! `incoming[target]`, `by_type[type]`. Edges are unique by
//! `(source, type, target)`; re-insertion raises confidence. Every edge
//! carries bitemporal stamps, and episodes back-link each ingest to the
//! entities and edges it produced.

pub mod contradiction;

pub use contradiction::{detect, effective_strategy, DetectedConflict};

use crate::archive::write_json_atomic;
use crate::constants::layout;
use crate::error::{Error, Result};
use crate::types::{Contradiction, ContradictionKind, Relation, RelationType, ResolutionStrategy};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Which edge ends count as neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// One ingest grouped with everything it produced, for traceability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEpisode {
    pub id: String,
    /// Memory record the episode came from
    pub memory_id: String,
    /// Verbatim source text
    pub source_text: String,
    pub entity_ids: Vec<String>,
    pub edge_keys: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of inserting an edge.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeOutcome {
    /// New edge stored
    Inserted,
    /// Triple already present; confidence raised
    ConfidenceRaised,
    /// Stored after superseding a conflicting edge
    Superseded { expired_key: String },
    /// Stored alongside a flagged conflict (coexist or manual)
    Flagged { kind: ContradictionKind },
    /// Dropped: existing edge wins and the triple was flagged
    CoexistKept,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GraphSnapshot {
    edges: Vec<Relation>,
    episodes: Vec<GraphEpisode>,
    contradictions: Vec<Contradiction>,
}

#[derive(Default)]
struct GraphState {
    edges: HashMap<String, Relation>,
    outgoing: HashMap<String, BTreeSet<String>>,
    incoming: HashMap<String, BTreeSet<String>>,
    by_type: HashMap<String, BTreeSet<String>>,
    episodes: Vec<GraphEpisode>,
    contradictions: Vec<Contradiction>,
}

impl GraphState {
    fn link(&mut self, key: &str, edge: &Relation) {
        self.outgoing
            .entry(edge.source_entity_id.clone())
            .or_default()
            .insert(key.to_string());
        self.incoming
            .entry(edge.target_entity_id.clone())
            .or_default()
            .insert(key.to_string());
        self.by_type
            .entry(edge.relation_type.as_str().to_string())
            .or_default()
            .insert(key.to_string());
    }

    fn edges_touching(&self, entity_id: &str, direction: Direction) -> Vec<String> {
        let mut keys = BTreeSet::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            if let Some(set) = self.outgoing.get(entity_id) {
                keys.extend(set.iter().cloned());
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            if let Some(set) = self.incoming.get(entity_id) {
                keys.extend(set.iter().cloned());
            }
        }
        keys.into_iter().collect()
    }
}

/// Uniqueness key for an edge triple.
#[must_use]
pub fn edge_key(source: &str, relation_type: &RelationType, target: &str) -> String {
    format!("{source}|{}|{target}", relation_type.as_str())
}

/// The knowledge graph. Mutations are rare relative to reads, so a single
/// reader/writer lock covers the whole structure.
pub struct KnowledgeGraph {
    dir: PathBuf,
    state: RwLock<GraphState>,
}

impl KnowledgeGraph {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let snapshot: GraphSnapshot =
            crate::archive::read_json(&dir.join(layout::GRAPH_SNAPSHOT))?.unwrap_or_default();
        let mut state = GraphState {
            episodes: snapshot.episodes,
            contradictions: snapshot.contradictions,
            ..GraphState::default()
        };
        for edge in snapshot.edges {
            let key = edge_key(&edge.source_entity_id, &edge.relation_type, &edge.target_entity_id);
            state.link(&key, &edge);
            state.edges.insert(key, edge);
        }
        Ok(Self {
            dir,
            state: RwLock::new(state),
        })
    }

    /// Insert an edge, enforcing triple uniqueness and running the
    /// contradiction rules.
    ///
    /// `Conflict` is returned only under the `Reject` strategy; every other
    /// path stores or merges and reports what happened.
    pub fn add_edge(
        &self,
        edge: Relation,
        strategy: ResolutionStrategy,
    ) -> Result<EdgeOutcome> {
        let mut state = self.state.write();
        let key = edge_key(&edge.source_entity_id, &edge.relation_type, &edge.target_entity_id);

        let conflict = {
            let existing: Vec<(String, &Relation)> = state
                .edges_touching(&edge.source_entity_id, Direction::Outgoing)
                .into_iter()
                .filter_map(|k| state.edges.get(&k).map(|e| (k, e)))
                .collect();
            contradiction::detect(&existing, &edge)
        };

        let Some(conflict) = conflict else {
            if let Some(existing) = state.edges.get_mut(&key) {
                existing.bump_confidence();
                for (k, v) in edge.properties {
                    existing.properties.entry(k).or_insert(v);
                }
                return Ok(EdgeOutcome::ConfidenceRaised);
            }
            state.link(&key, &edge);
            state.edges.insert(key, edge);
            return Ok(EdgeOutcome::Inserted);
        };

        let applied = contradiction::effective_strategy(strategy, conflict.kind);
        debug!(kind = ?conflict.kind, strategy = ?applied, "edge conflict");
        match applied {
            ResolutionStrategy::Reject => {
                state.contradictions.push(Contradiction {
                    fact_a_id: conflict.existing_key.clone(),
                    fact_b_id: key,
                    kind: conflict.kind,
                    strategy: applied,
                    resolved: true,
                });
                Err(Error::Conflict(format!(
                    "edge conflicts with {}",
                    conflict.existing_key
                )))
            }
            ResolutionStrategy::Supersede => {
                let boundary = edge.stamp.valid.start.unwrap_or(edge.stamp.known_at);
                if let Some(existing) = state.edges.get_mut(&conflict.existing_key) {
                    existing.stamp.valid.end = Some(boundary);
                }
                state.contradictions.push(Contradiction {
                    fact_a_id: conflict.existing_key.clone(),
                    fact_b_id: key.clone(),
                    kind: conflict.kind,
                    strategy: applied,
                    resolved: true,
                });
                state.link(&key, &edge);
                state.edges.insert(key, edge);
                Ok(EdgeOutcome::Superseded {
                    expired_key: conflict.existing_key,
                })
            }
            ResolutionStrategy::Coexist | ResolutionStrategy::Manual => {
                state.contradictions.push(Contradiction {
                    fact_a_id: conflict.existing_key.clone(),
                    fact_b_id: key.clone(),
                    kind: conflict.kind,
                    strategy: applied,
                    resolved: false,
                });
                if state.edges.contains_key(&key) {
                    // Same triple: keep the existing edge, the flag records
                    // the disputed claim.
                    return Ok(EdgeOutcome::CoexistKept);
                }
                state.link(&key, &edge);
                state.edges.insert(key, edge);
                Ok(EdgeOutcome::Flagged {
                    kind: conflict.kind,
                })
            }
            ResolutionStrategy::Auto => unreachable!("auto resolves to a concrete strategy"),
        }
    }

    /// Edges touching `entity_id` whose fact and system ranges contain now.
    pub fn neighbours(
        &self,
        entity_id: &str,
        relation_type: Option<&RelationType>,
        direction: Direction,
    ) -> Vec<Relation> {
        self.neighbours_at(entity_id, relation_type, direction, Utc::now())
    }

    /// Edges touching `entity_id` whose fact range contains `fact_time` and
    /// which are live in system time.
    pub fn neighbours_at(
        &self,
        entity_id: &str,
        relation_type: Option<&RelationType>,
        direction: Direction,
        fact_time: DateTime<Utc>,
    ) -> Vec<Relation> {
        let state = self.state.read();
        state
            .edges_touching(entity_id, direction)
            .into_iter()
            .filter_map(|key| state.edges.get(&key))
            .filter(|edge| edge.is_current() && edge.stamp.valid.contains(fact_time))
            .filter(|edge| relation_type.is_none_or(|t| edge.relation_type == *t))
            .cloned()
            .collect()
    }

    /// Every edge (live or expired) touching an entity.
    pub fn all_edges_of(&self, entity_id: &str, direction: Direction) -> Vec<Relation> {
        let state = self.state.read();
        state
            .edges_touching(entity_id, direction)
            .into_iter()
            .filter_map(|key| state.edges.get(&key).cloned())
            .collect()
    }

    /// Edge by triple, if present.
    pub fn get_edge(
        &self,
        source: &str,
        relation_type: &RelationType,
        target: &str,
    ) -> Option<Relation> {
        self.state
            .read()
            .edges
            .get(&edge_key(source, relation_type, target))
            .cloned()
    }

    /// BFS shortest path between two entities over live edges, bounded by
    /// `max_depth`. Returns the entity id path including both endpoints.
    pub fn shortest_path(&self, from: &str, to: &str, max_depth: usize) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string()]);
        }
        let state = self.state.read();
        let mut visited: HashMap<String, String> = HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back((from.to_string(), 0usize));
        visited.insert(from.to_string(), String::new());

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for key in state.edges_touching(&current, Direction::Both) {
                let Some(edge) = state.edges.get(&key) else {
                    continue;
                };
                if !edge.is_current() {
                    continue;
                }
                let next = if edge.source_entity_id == current {
                    &edge.target_entity_id
                } else {
                    &edge.source_entity_id
                };
                if visited.contains_key(next) {
                    continue;
                }
                visited.insert(next.clone(), current.clone());
                if next.as_str() == to {
                    let mut path = vec![next.clone()];
                    let mut cursor = current.clone();
                    while !cursor.is_empty() {
                        path.push(cursor.clone());
                        cursor = visited.get(&cursor).cloned().unwrap_or_default();
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back((next.clone(), depth + 1));
            }
        }
        None
    }

    /// Entities and edges reachable within `depth` hops of `entity_id`.
    pub fn subgraph(&self, entity_id: &str, depth: usize) -> (Vec<String>, Vec<Relation>) {
        let state = self.state.read();
        let mut seen_entities = BTreeSet::new();
        let mut seen_edges: BTreeSet<String> = BTreeSet::new();
        let mut queue = VecDeque::new();
        seen_entities.insert(entity_id.to_string());
        queue.push_back((entity_id.to_string(), 0usize));

        while let Some((current, level)) = queue.pop_front() {
            if level >= depth {
                continue;
            }
            for key in state.edges_touching(&current, Direction::Both) {
                let Some(edge) = state.edges.get(&key) else {
                    continue;
                };
                if !edge.is_current() {
                    continue;
                }
                seen_edges.insert(key);
                for next in [&edge.source_entity_id, &edge.target_entity_id] {
                    if seen_entities.insert(next.clone()) {
                        queue.push_back((next.clone(), level + 1));
                    }
                }
            }
        }
        let edges = seen_edges
            .into_iter()
            .filter_map(|key| state.edges.get(&key).cloned())
            .collect();
        (seen_entities.into_iter().collect(), edges)
    }

    /// Record an episode linking a memory to the entities and edges its
    /// ingest produced.
    pub fn record_episode(
        &self,
        memory_id: &str,
        source_text: &str,
        entity_ids: Vec<String>,
        edge_keys: Vec<String>,
    ) -> String {
        let episode = GraphEpisode {
            id: Uuid::new_v4().to_string(),
            memory_id: memory_id.to_string(),
            source_text: source_text.to_string(),
            entity_ids,
            edge_keys,
            created_at: Utc::now(),
        };
        let id = episode.id.clone();
        self.state.write().episodes.push(episode);
        id
    }

    /// Episodes that produced a given edge.
    pub fn episodes_for_edge(&self, key: &str) -> Vec<GraphEpisode> {
        self.state
            .read()
            .episodes
            .iter()
            .filter(|episode| episode.edge_keys.iter().any(|k| k.as_str() == key))
            .cloned()
            .collect()
    }

    /// Open (unresolved) contradictions.
    pub fn open_contradictions(&self) -> Vec<Contradiction> {
        self.state
            .read()
            .contradictions
            .iter()
            .filter(|c| !c.resolved)
            .cloned()
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.state.read().edges.len()
    }

    pub fn flush(&self) -> Result<()> {
        let state = self.state.read();
        let snapshot = GraphSnapshot {
            edges: state.edges.values().cloned().collect(),
            episodes: state.episodes.clone(),
            contradictions: state.contradictions.clone(),
        };
        write_json_atomic(&self.dir.join(layout::GRAPH_SNAPSHOT), &snapshot)
    }
}
