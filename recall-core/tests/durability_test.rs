//! Durability across restarts: everything added before shutdown is
//! retrievable through every enabled index after reopen.

use recall_core::{
    EngineConfig, EngineMode, MemoryEngine, RecordMetadata, ScopeId, SearchRequest,
};

fn scope() -> ScopeId {
    ScopeId::new("user", "default", "session")
}

#[test]
fn records_survive_clean_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let id;
    {
        let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("open");
        id = engine
            .add(
                "the durable fact about the scheduler rewrite",
                &scope(),
                RecordMetadata::default(),
            )
            .expect("add")
            .id;
        engine.shutdown();
    }

    let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("reopen");
    // Archive lookup by id.
    let record = engine.get(&id).expect("get").expect("record");
    assert_eq!(record.content, "the durable fact about the scheduler rewrite");

    // Keyword index.
    let hits = engine
        .search(&SearchRequest::new("scheduler rewrite").in_scope(scope()))
        .expect("keyword search");
    assert!(hits.iter().any(|hit| hit.id == id));

    // Raw-substring fallback.
    let hits = engine
        .search(&SearchRequest::new("durable fact abo").in_scope(scope()))
        .expect("raw search");
    assert!(hits.iter().any(|hit| hit.id == id));

    // Stats recovered without any ingest this session.
    assert_eq!(engine.stats().live_records, 1);
}

#[test]
fn dedup_state_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first_id;
    {
        let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("open");
        first_id = engine
            .add("exactly this sentence", &scope(), RecordMetadata::default())
            .expect("add")
            .id;
        engine.shutdown();
    }

    let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("reopen");
    let outcome = engine
        .add("exactly this sentence", &scope(), RecordMetadata::default())
        .expect("re-add");
    assert!(!outcome.accepted);
    assert_eq!(outcome.id, first_id);
}

#[test]
fn entities_and_graph_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("open");
        engine
            .add("Carol works at Initech", &scope(), RecordMetadata::default())
            .expect("add");
        engine.shutdown();
    }

    let engine = MemoryEngine::open(EngineConfig::new(dir.path())).expect("reopen");
    let carol = engine.entity("Carol").expect("carol survives");
    assert!(!carol.references.is_empty());
    let edges = engine
        .neighbours("Carol", None, recall_core::Direction::Both)
        .expect("neighbours");
    assert_eq!(edges.len(), 1);
}

#[test]
fn narrative_data_remains_readable_in_general_mode() {
    let dir = tempfile::tempdir().expect("tempdir");
    let id;
    {
        let engine =
            MemoryEngine::open(EngineConfig::new(dir.path()).with_mode(EngineMode::Narrative))
                .expect("open narrative");
        id = engine
            .add(
                "the knight guards the bridge",
                &ScopeId::new("user", "knight", "s1"),
                RecordMetadata::default(),
            )
            .expect("add")
            .id;
        engine
            .foreshadow_add("the bridge will fall", 0.5, vec![])
            .expect("hint");
        engine.shutdown();
    }

    // Reopen under general mode: records readable, narrative extras ignored.
    let engine = MemoryEngine::open(EngineConfig::new(dir.path()).with_mode(EngineMode::General))
        .expect("reopen general");
    let record = engine.get(&id).expect("get").expect("record");
    assert_eq!(record.content, "the knight guards the bridge");
    assert!(engine.foreshadow_active().is_err());
}

#[test]
fn deleting_the_data_root_removes_every_trace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("engine-root");
    {
        let engine = MemoryEngine::open(EngineConfig::new(&root)).expect("open");
        engine
            .add("transient state", &scope(), RecordMetadata::default())
            .expect("add");
        engine.shutdown();
    }
    std::fs::remove_dir_all(&root).expect("remove root");
    assert!(!root.exists());

    // A fresh engine over the same path starts empty.
    let engine = MemoryEngine::open(EngineConfig::new(&root)).expect("fresh open");
    assert_eq!(engine.stats().total_records, 0);
    let hits = engine
        .search(&SearchRequest::new("transient state"))
        .expect("search");
    assert!(hits.is_empty());
}
