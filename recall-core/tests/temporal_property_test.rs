//! Property: temporal index queries agree with a linear-scan reference
//! model for every generated workload.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use recall_core::index::{TemporalEntry, TemporalIndex};
use recall_core::TimeRange;

#[derive(Debug, Clone)]
struct Stamp {
    id: String,
    start: Option<i64>,
    len: Option<i64>,
}

fn ts(days: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(days * 86_400, 0).single().expect("valid timestamp")
}

fn stamp_strategy() -> impl Strategy<Value = Stamp> {
    (0u32..64, proptest::option::of(0i64..1000), proptest::option::of(1i64..400)).prop_map(
        |(id, start, len)| Stamp {
            id: format!("m{id}"),
            start,
            len,
        },
    )
}

fn range_of(stamp: &Stamp) -> TimeRange {
    TimeRange {
        start: stamp.start.map(ts),
        end: match (stamp.start, stamp.len) {
            (Some(start), Some(len)) => Some(ts(start + len)),
            _ => None,
        },
    }
}

proptest! {
    #[test]
    fn at_point_matches_linear_scan(
        stamps in proptest::collection::vec(stamp_strategy(), 1..40),
        probe in 0i64..1500,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = TemporalIndex::open(dir.path()).expect("open");

        // Last write wins per id, as in the index.
        let mut reference: std::collections::HashMap<String, TimeRange> = Default::default();
        for stamp in &stamps {
            let range = range_of(stamp);
            index.insert(&stamp.id, TemporalEntry::new(range));
            reference.insert(stamp.id.clone(), range);
        }

        let t = ts(probe);
        let mut expected: Vec<String> = reference
            .iter()
            .filter(|(_, range)| range.contains(t))
            .map(|(id, _)| id.clone())
            .collect();
        expected.sort();

        prop_assert_eq!(index.at_point(t), expected);
    }

    #[test]
    fn range_matches_linear_scan(
        stamps in proptest::collection::vec(stamp_strategy(), 1..40),
        window_start in 0i64..1200,
        window_len in 1i64..400,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = TemporalIndex::open(dir.path()).expect("open");

        let mut reference: std::collections::HashMap<String, TimeRange> = Default::default();
        for stamp in &stamps {
            let range = range_of(stamp);
            index.insert(&stamp.id, TemporalEntry::new(range));
            reference.insert(stamp.id.clone(), range);
        }

        let window = TimeRange::between(ts(window_start), ts(window_start + window_len));
        let mut expected: Vec<String> = reference
            .iter()
            .filter(|(_, range)| range.overlaps(&window))
            .map(|(id, _)| id.clone())
            .collect();
        expected.sort();

        prop_assert_eq!(
            index.range(ts(window_start), ts(window_start + window_len)),
            expected
        );
    }

    #[test]
    fn insert_remove_restores_queries(
        stamps in proptest::collection::vec(stamp_strategy(), 1..20),
        extra in stamp_strategy(),
        probe in 0i64..1500,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = TemporalIndex::open(dir.path()).expect("open");
        for stamp in &stamps {
            index.insert(&stamp.id, TemporalEntry::new(range_of(stamp)));
        }
        let before = index.at_point(ts(probe));

        // A fresh id inserted then removed must leave queries unchanged.
        let fresh_id = "fresh-entry";
        index.insert(fresh_id, TemporalEntry::new(range_of(&extra)));
        index.remove(fresh_id);

        prop_assert_eq!(index.at_point(ts(probe)), before);
    }
}
