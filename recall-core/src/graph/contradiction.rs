//! Contradiction rules evaluated on each new edge.

use crate::types::{ContradictionKind, Relation, ResolutionStrategy};

/// Result of checking an incoming edge against the existing graph.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedConflict {
    pub kind: ContradictionKind,
    /// Key of the conflicting existing edge
    pub existing_key: String,
}

/// Check the incoming edge against edges sharing its source entity.
///
/// Rules, in evaluation order:
/// 1. Temporal — same `(subject, predicate, object)` with disjoint fact
///    ranges (two separate claims of the same ongoing state).
/// 2. Direct — same subject and predicate, different object, overlapping
///    fact time, both live.
/// 3. Exclusive predicate — the counterpart predicate from the builtin
///    exclusivity list holds for the same subject-object pair.
pub fn detect(
    existing: &[(String, &Relation)],
    incoming: &Relation,
) -> Option<DetectedConflict> {
    for (key, edge) in existing {
        if !edge.is_current() {
            continue;
        }
        let same_triple = edge.relation_type == incoming.relation_type
            && edge.target_entity_id == incoming.target_entity_id;
        if same_triple {
            if !edge.stamp.valid.overlaps(&incoming.stamp.valid) {
                return Some(DetectedConflict {
                    kind: ContradictionKind::Temporal,
                    existing_key: key.clone(),
                });
            }
            continue;
        }
        if edge.relation_type == incoming.relation_type
            && edge.target_entity_id != incoming.target_entity_id
            && edge.stamp.valid.overlaps(&incoming.stamp.valid)
        {
            return Some(DetectedConflict {
                kind: ContradictionKind::Direct,
                existing_key: key.clone(),
            });
        }
        if let Some(counterpart) = incoming.relation_type.exclusive_counterpart() {
            if edge.relation_type == *counterpart
                && edge.target_entity_id == incoming.target_entity_id
            {
                return Some(DetectedConflict {
                    kind: ContradictionKind::ExclusivePredicate,
                    existing_key: key.clone(),
                });
            }
        }
    }
    None
}

/// Map the configured strategy to the one applied for a given kind.
///
/// `Auto` resolves direct conflicts by supersession, temporal conflicts by
/// coexist-and-flag, and exclusive-predicate conflicts by manual review.
#[must_use]
pub fn effective_strategy(
    configured: ResolutionStrategy,
    kind: ContradictionKind,
) -> ResolutionStrategy {
    match configured {
        ResolutionStrategy::Auto => match kind {
            ContradictionKind::Direct => ResolutionStrategy::Supersede,
            ContradictionKind::Temporal => ResolutionStrategy::Coexist,
            ContradictionKind::ExclusivePredicate => ResolutionStrategy::Manual,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RelationType, TimeRange};
    use chrono::{TimeZone, Utc};

    fn at(year: i32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single().expect("valid date")
    }

    fn edge(
        source: &str,
        rt: RelationType,
        target: &str,
        valid: TimeRange,
    ) -> Relation {
        let mut relation = Relation::new(source, rt, target, 0);
        relation.stamp.valid = valid;
        relation
    }

    #[test]
    fn direct_conflict_on_overlapping_objects() {
        let acme = edge("alice", RelationType::WorksAt, "acme", TimeRange::from(at(2020)));
        let globex = edge("alice", RelationType::WorksAt, "globex", TimeRange::from(at(2023)));
        let existing = vec![("k1".to_string(), &acme)];
        let conflict = detect(&existing, &globex).expect("conflict");
        assert_eq!(conflict.kind, ContradictionKind::Direct);
        assert_eq!(conflict.existing_key, "k1");
    }

    #[test]
    fn disjoint_same_triple_is_temporal() {
        let old = edge(
            "alice",
            RelationType::LocatedIn,
            "paris",
            TimeRange::between(at(2020), at(2021)),
        );
        let new = edge(
            "alice",
            RelationType::LocatedIn,
            "paris",
            TimeRange::between(at(2022), at(2023)),
        );
        let existing = vec![("k1".to_string(), &old)];
        let conflict = detect(&existing, &new).expect("conflict");
        assert_eq!(conflict.kind, ContradictionKind::Temporal);
    }

    #[test]
    fn exclusive_predicates_collide() {
        let loves = edge("alice", RelationType::Loves, "bob", TimeRange::open());
        let hates = edge("alice", RelationType::Hates, "bob", TimeRange::open());
        let existing = vec![("k1".to_string(), &loves)];
        let conflict = detect(&existing, &hates).expect("conflict");
        assert_eq!(conflict.kind, ContradictionKind::ExclusivePredicate);
    }

    #[test]
    fn unrelated_edges_do_not_conflict() {
        let works = edge("alice", RelationType::WorksAt, "acme", TimeRange::open());
        let knows = edge("alice", RelationType::Knows, "bob", TimeRange::open());
        let existing = vec![("k1".to_string(), &works)];
        assert!(detect(&existing, &knows).is_none());
    }

    #[test]
    fn auto_strategy_mapping() {
        assert_eq!(
            effective_strategy(ResolutionStrategy::Auto, ContradictionKind::Direct),
            ResolutionStrategy::Supersede
        );
        assert_eq!(
            effective_strategy(ResolutionStrategy::Auto, ContradictionKind::Temporal),
            ResolutionStrategy::Coexist
        );
        assert_eq!(
            effective_strategy(ResolutionStrategy::Auto, ContradictionKind::ExclusivePredicate),
            ResolutionStrategy::Manual
        );
        assert_eq!(
            effective_strategy(ResolutionStrategy::Reject, ContradictionKind::Direct),
            ResolutionStrategy::Reject
        );
    }
}
