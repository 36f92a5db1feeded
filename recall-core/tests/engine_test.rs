//! End-to-end engine tests over a temporary data root.

use recall_core::{
    AddOptions, BatchItem, EngineConfig, EngineMode, Error, MemoryEngine, RecordMetadata,
    ScopeId, SearchRequest,
};

fn engine_in(dir: &tempfile::TempDir, mode: EngineMode) -> MemoryEngine {
    MemoryEngine::open(EngineConfig::new(dir.path()).with_mode(mode)).expect("open engine")
}

fn scope() -> ScopeId {
    ScopeId::new("user", "default", "session")
}

#[test]
fn add_then_search_finds_the_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);

    let outcome = engine
        .add(
            "The deploy key rotates every thursday morning",
            &scope(),
            RecordMetadata::default(),
        )
        .expect("add");
    assert!(outcome.accepted);

    let hits = engine
        .search(&SearchRequest::new("deploy key rotates").in_scope(scope()))
        .expect("search");
    assert!(!hits.is_empty());
    assert_eq!(hits[0].id, outcome.id);
    assert!(hits[0].score > 0.0);
}

#[test]
fn id_is_stable_and_get_roundtrips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);

    let outcome = engine
        .add("a stable fact", &scope(), RecordMetadata::default())
        .expect("add");
    let record = engine.get(&outcome.id).expect("get").expect("record");
    assert_eq!(record.id, outcome.id);
    assert_eq!(record.content, "a stable fact");
}

#[test]
fn dedup_is_idempotent_for_identical_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);

    let first = engine
        .add("Paris is the capital of France.", &scope(), RecordMetadata::default())
        .expect("first add");
    let second = engine
        .add("Paris is the capital of France.", &scope(), RecordMetadata::default())
        .expect("second add");

    assert!(first.accepted);
    assert!(!second.accepted);
    assert_eq!(first.id, second.id);
    assert_eq!(engine.stats().live_records, 1);
}

#[test]
fn near_duplicate_punctuation_variant_collapses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);

    let text = "the quarterly revenue grew by twelve percent in the third quarter of the year";
    let first = engine
        .add(text, &scope(), RecordMetadata::default())
        .expect("first add");
    let second = engine
        .add(&format!("{text}!!"), &scope(), RecordMetadata::default())
        .expect("second add");
    assert_eq!(first.id, second.id);
    assert!(!second.accepted);
}

#[test]
fn skip_dedup_stores_duplicates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);

    engine
        .add("repeated content", &scope(), RecordMetadata::default())
        .expect("add");
    let outcome = engine
        .add_with_options(
            "repeated content",
            &scope(),
            RecordMetadata::default(),
            AddOptions {
                skip_dedup: true,
                skip_llm: true,
            },
        )
        .expect("add with skip");
    assert!(outcome.accepted);
    assert_eq!(engine.stats().live_records, 2);
}

#[test]
fn scope_isolation_is_authoritative() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);

    let scope_a = ScopeId::new("alice", "default", "s1");
    let scope_b = ScopeId::new("bob", "default", "s1");
    engine
        .add("alice private shard alpha", &scope_a, RecordMetadata::default())
        .expect("add a");
    engine
        .add("bob private shard alpha", &scope_b, RecordMetadata::default())
        .expect("add b");

    let hits = engine
        .search(&SearchRequest::new("shard alpha").in_scope(scope_b.clone()))
        .expect("search");
    assert!(!hits.is_empty());
    for hit in &hits {
        let record = engine.get(&hit.id).expect("get").expect("record");
        assert_eq!(record.scope, scope_b);
    }
}

#[test]
fn batch_matches_sequential_semantics() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);

    let items = vec![
        BatchItem {
            content: "batch fact one about rust".to_string(),
            metadata: RecordMetadata::default(),
        },
        BatchItem {
            content: "batch fact two about storage".to_string(),
            metadata: RecordMetadata::default(),
        },
        BatchItem {
            content: "batch fact one about rust".to_string(), // duplicate of item 1
            metadata: RecordMetadata::default(),
        },
    ];
    let ids = engine
        .add_batch(items, &scope(), AddOptions {
            skip_dedup: false,
            skip_llm: true,
        })
        .expect("batch");
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], ids[2]);
    assert_eq!(engine.stats().live_records, 2);
}

#[test]
fn delete_unlinks_everywhere() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);

    let outcome = engine
        .add("short lived secret gamma", &scope(), RecordMetadata::default())
        .expect("add");
    assert!(engine.delete(&outcome.id).expect("delete"));

    assert!(engine.get(&outcome.id).expect("get").is_none());
    let hits = engine
        .search(&SearchRequest::new("secret gamma").in_scope(scope()))
        .expect("search");
    assert!(hits.is_empty());
    // Deleting again is a no-op, not an error.
    assert!(!engine.delete(&outcome.id).expect("second delete"));
}

#[test]
fn foreshadowing_is_absent_outside_narrative_mode() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);

    let err = engine
        .foreshadow_add("the locket hums at night", 0.7, vec![])
        .expect_err("must be gated");
    assert!(matches!(err, Error::FeatureDisabled(_)));

    // Nothing was written for the disabled subsystem.
    engine.flush().expect("flush");
    let foreshadow_dir = dir.path().join("indexes").join("foreshadowing");
    assert!(!foreshadow_dir.exists());
}

#[test]
fn foreshadowing_lifecycle_in_narrative_mode() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::Narrative);

    let hint = engine
        .foreshadow_add("the locket hums at night", 0.7, vec![])
        .expect("add hint");
    assert_eq!(engine.foreshadow_active().expect("active").len(), 1);

    engine.foreshadow_resolve(&hint.id).expect("resolve");
    assert!(engine.foreshadow_active().expect("active").is_empty());
}

#[test]
fn narrative_mode_keeps_sub_tenant_general_collapses_it() {
    let dir_a = tempfile::tempdir().expect("tempdir");
    let narrative = engine_in(&dir_a, EngineMode::Narrative);
    let dir_b = tempfile::tempdir().expect("tempdir");
    let general = engine_in(&dir_b, EngineMode::General);

    let character_scope = ScopeId::new("user", "bard", "s1");
    let outcome = narrative
        .add("the bard knows a secret", &character_scope, RecordMetadata::default())
        .expect("narrative add");
    let record = narrative.get(&outcome.id).expect("get").expect("record");
    assert_eq!(record.scope.sub_tenant_id, "bard");

    let outcome = general
        .add("the bard knows a secret", &character_scope, RecordMetadata::default())
        .expect("general add");
    let record = general.get(&outcome.id).expect("get").expect("record");
    assert_eq!(record.scope.sub_tenant_id, "default");
}

#[test]
fn two_engines_with_different_modes_coexist() {
    let dir_a = tempfile::tempdir().expect("tempdir");
    let dir_b = tempfile::tempdir().expect("tempdir");
    let narrative = engine_in(&dir_a, EngineMode::Narrative);
    let general = engine_in(&dir_b, EngineMode::General);

    assert!(narrative.gate().foreshadowing);
    assert!(!general.gate().foreshadowing);
    assert_eq!(narrative.stats().mode, "narrative");
    assert_eq!(general.stats().mode, "general");
}

#[test]
fn stats_reflect_ingest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);

    engine
        .add("Alice works at Acme Corp", &scope(), RecordMetadata::default())
        .expect("add");
    let stats = engine.stats();
    assert_eq!(stats.total_records, 1);
    assert_eq!(stats.live_records, 1);
    assert!(stats.entity_count >= 2);
    assert!(stats.keyword_tokens > 0);
    assert_eq!(stats.active_foreshadowing, None);
}

#[test]
fn context_builder_stays_under_budget() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);

    let topics = [
        "database schema", "queue backlog", "billing rollout", "cache warmup",
        "index rebuild", "login latency", "audit trail", "replica lag",
        "search ranking", "token budget", "deploy window", "alert routing",
        "backup cadence", "schema drift", "error budget", "canary split",
        "quota policy", "retry storm", "cold start", "shard balance",
    ];
    for (i, topic) in topics.iter().enumerate() {
        engine
            .add(
                &format!("migration project note {i}: investigate {topic} before cutover"),
                &scope(),
                RecordMetadata::default(),
            )
            .expect("add");
    }
    let context = engine
        .context("migration project", &scope(), vec![], 120)
        .expect("context");
    assert!(recall_core::retrieval::estimate_tokens(&context) <= 120);
    assert!(context.contains("Memory context"));
}

#[test]
fn empty_query_results_are_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir, EngineMode::General);
    let hits = engine
        .search(&SearchRequest::new("nothing was ever ingested"))
        .expect("search");
    assert!(hits.is_empty());
}
