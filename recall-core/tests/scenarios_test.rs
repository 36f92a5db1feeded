//! The concrete behavioral scenarios the engine guarantees.

use chrono::{TimeZone, Utc};
use recall_core::{
    Direction, EngineConfig, EngineMode, MemoryEngine, RecordMetadata, RelationType,
    ResolutionStrategy, ScopeId, SearchRequest, TemporalConstraint,
};

fn scope() -> ScopeId {
    ScopeId::new("user", "default", "session")
}

fn at(year: i32, month: u32, day: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("valid date")
}

fn dated_metadata(from: &str, until: Option<&str>) -> RecordMetadata {
    let mut metadata = RecordMetadata::default();
    metadata
        .extra
        .insert("valid_from".to_string(), serde_json::json!(from));
    if let Some(until) = until {
        metadata
            .extra
            .insert("valid_until".to_string(), serde_json::json!(until));
    }
    metadata
}

#[test]
fn raw_fallback_guarantees_recall_with_vector_index_disabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = EngineConfig::new(dir.path());
    config.lite = true; // vector index absent entirely
    let engine = MemoryEngine::open(config).expect("open");

    let outcome = engine
        .add(
            "The vault access code is \u{3a9}-7742-alpha",
            &scope(),
            RecordMetadata::default(),
        )
        .expect("add");

    let hits = engine
        .search(&SearchRequest::new("\u{3a9}-7742").in_scope(scope()))
        .expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, outcome.id);
    assert!(hits[0].score > 0.0);
    assert!(hits[0].paths.contains(&"raw".to_string()));
}

#[test]
fn substring_recall_holds_for_arbitrary_fragments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("open");

    let content = "Backup passphrase: correct horse battery staple 9931";
    let outcome = engine
        .add(content, &scope(), RecordMetadata::default())
        .expect("add");

    for fragment in ["horse battery", "staple 9931", "passphrase: correct", "9931"] {
        let hits = engine
            .search(&SearchRequest::new(fragment).in_scope(scope()))
            .expect("search");
        assert!(
            hits.iter().any(|hit| hit.id == outcome.id),
            "fragment {fragment:?} must be recalled"
        );
    }
}

#[test]
fn temporal_range_and_point_queries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("open");

    let first = engine
        .add(
            "Contract one covered the 2020 period",
            &scope(),
            dated_metadata("2020-01-01T00:00:00Z", Some("2020-12-31T00:00:00Z")),
        )
        .expect("add");
    let second = engine
        .add(
            "Contract two covered mid 2021 to mid 2022",
            &scope(),
            dated_metadata("2021-06-01T00:00:00Z", Some("2022-06-01T00:00:00Z")),
        )
        .expect("add");
    let third = engine
        .add(
            "Contract three runs from 2023 onward",
            &scope(),
            dated_metadata("2023-01-01T00:00:00Z", None),
        )
        .expect("add");

    let range_hits = engine
        .search(
            &SearchRequest::new("contract")
                .in_scope(scope())
                .top_k(10)
                .with_temporal(TemporalConstraint::Range {
                    start: at(2021, 1, 1),
                    end: at(2021, 12, 31),
                }),
        )
        .expect("range search");
    let ids: Vec<&str> = range_hits.iter().map(|hit| hit.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str()]);

    let point_hits = engine
        .search(
            &SearchRequest::new("contract")
                .in_scope(scope())
                .top_k(10)
                .with_temporal(TemporalConstraint::AtPoint(at(2024, 1, 1))),
        )
        .expect("point search");
    let ids: Vec<&str> = point_hits.iter().map(|hit| hit.id.as_str()).collect();
    assert_eq!(ids, vec![third.id.as_str()]);

    let _ = first;
}

#[test]
fn contradiction_superseded_with_bitemporal_history() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = EngineConfig::new(dir.path());
    config.contradiction_strategy = ResolutionStrategy::Supersede;
    let engine = MemoryEngine::open(config).expect("open");

    engine
        .add(
            "Alice works at Acme",
            &scope(),
            dated_metadata("2020-01-01T00:00:00Z", None),
        )
        .expect("first job");
    engine
        .add(
            "Alice works at Globex",
            &scope(),
            dated_metadata("2023-01-01T00:00:00Z", None),
        )
        .expect("second job");

    let now = engine
        .neighbours("Alice", Some(&RelationType::WorksAt), Direction::Both)
        .expect("neighbours now");
    assert_eq!(now.len(), 1);
    let globex = engine.entity("Globex").expect("globex entity");
    assert_eq!(now[0].target_entity_id, globex.id);

    let then = engine
        .neighbours_at(
            "Alice",
            Some(&RelationType::WorksAt),
            Direction::Both,
            at(2021, 6, 1),
        )
        .expect("neighbours in 2021");
    assert_eq!(then.len(), 1);
    let acme = engine.entity("Acme").expect("acme entity");
    assert_eq!(then[0].target_entity_id, acme.id);

    // Both edges persist; the earlier one has a closed fact range.
    assert_eq!(then[0].stamp.valid.end, Some(at(2023, 1, 1)));
}

#[test]
fn multi_path_fusion_surfaces_every_match_kind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("open");

    // Entity-path memory: query will use the short alias only.
    let by_entity = engine
        .add(
            "Initech Corporation announced a reorganization of middleware",
            &scope(),
            RecordMetadata::default(),
        )
        .expect("add entity memory");
    // Keyword/vector memory: shares plain tokens with the query.
    let by_keyword = engine
        .add(
            "the printer jam meeting covered toner budgets",
            &scope(),
            RecordMetadata::default(),
        )
        .expect("add keyword memory");
    // Exact-phrase memory.
    let by_phrase = engine
        .add(
            "password hint: TPS-cover-sheet-42",
            &scope(),
            RecordMetadata::default(),
        )
        .expect("add phrase memory");

    let hits = engine
        .search(
            &SearchRequest::new("Initech printer jam TPS-cover-sheet-42")
                .in_scope(scope())
                .top_k(10),
        )
        .expect("search");
    let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
    assert!(ids.contains(&by_entity.id.as_str()));
    assert!(ids.contains(&by_keyword.id.as_str()));
    assert!(ids.contains(&by_phrase.id.as_str()));
    for hit in &hits {
        assert!(hit.score > 0.0);
    }
}

#[test]
fn layered_pipeline_with_builtin_rerank_matches_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("open");

    for (i, topic) in ["storage quotas", "auth tokens", "rate limits", "vector search"]
        .iter()
        .enumerate()
    {
        engine
            .add(
                &format!("design note {i}: tuning {topic} for launch"),
                &scope(),
                RecordMetadata::default(),
            )
            .expect("add");
    }

    let default_hits = engine
        .search(&SearchRequest::new("tuning vector search").in_scope(scope()))
        .expect("default search");
    let mut layered_request = SearchRequest::new("tuning vector search").in_scope(scope());
    layered_request.layered = true;
    let layered_hits = engine.search(&layered_request).expect("layered search");

    // No LLM and no graph seeds: the opt-in layers are invisible.
    assert_eq!(default_hits, layered_hits);
}

#[test]
fn general_mode_never_stores_narrative_relations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = MemoryEngine::open(EngineConfig::new(dir.path()).with_mode(EngineMode::General))
        .expect("open");

    engine
        .add("Mordred hates Arthur", &scope(), RecordMetadata::default())
        .expect("add");
    let neighbours = engine.neighbours("Mordred", None, Direction::Both);
    // Either the entity was never linked, or no HATES edge exists.
    if let Ok(edges) = neighbours {
        assert!(edges
            .iter()
            .all(|edge| edge.relation_type != RelationType::Hates));
    }
}
