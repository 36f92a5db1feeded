//! Contradiction records produced by the temporal knowledge graph.

use serde::{Deserialize, Serialize};

/// What kind of conflict was detected between two facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    /// Same subject and predicate, different object, overlapping fact time
    Direct,
    /// Same triple with conflicting fact ranges
    Temporal,
    /// Predicate pair from the builtin exclusivity list
    ExclusivePredicate,
}

/// How a detected contradiction is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Later fact wins; earlier edge gets `valid_until` closed
    Supersede,
    /// Keep both with bitemporal stamps, flag for review
    Coexist,
    /// Drop the new edge
    Reject,
    /// Store as an open contradiction for user action
    Manual,
    /// Direct → supersede, temporal → coexist, exclusive → manual
    #[default]
    Auto,
}

/// A recorded conflict between two edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    /// Key of the pre-existing edge: `source|type|target`
    pub fact_a_id: String,
    /// Key of the incoming edge
    pub fact_b_id: String,
    pub kind: ContradictionKind,
    /// The strategy that was applied
    pub strategy: ResolutionStrategy,
    /// False while awaiting user action (coexist / manual)
    pub resolved: bool,
}
