//! Global constants for recall-core
//!
//! Centralizes the tunable numbers used across the storage, index, dedup,
//! and retrieval subsystems.

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    // Archive layout
    pub const RECORDS_PER_FILE: u64 = 1_000;
    pub const FILES_PER_VOLUME: u64 = 100;
    pub const VOLUME_CAPACITY: u64 = RECORDS_PER_FILE * FILES_PER_VOLUME;
    pub const PRELOADED_RECENT_VOLUMES: usize = 2;
    pub const ID_MAP_PERSIST_INTERVAL: u64 = 256;

    // Index durability
    pub const INDEX_DIRTY_FLUSH_THRESHOLD: u64 = 512;
    pub const WAL_COMPACTION_THRESHOLD: u64 = 4_096;

    // Deduplication
    pub const MINHASH_PERMUTATIONS: usize = 128;
    pub const MINHASH_SHINGLE_SIZE: usize = 3;
    pub const LSH_BANDS: usize = 16;
    pub const DEDUP_JACCARD_THRESHOLD: f32 = 0.85;
    pub const DEDUP_SEMANTIC_HIGH: f32 = 0.90;
    pub const DEDUP_SEMANTIC_LOW: f32 = 0.70;
    pub const DEDUP_RECENT_WINDOW: usize = 32;

    // Retrieval
    pub const RRF_K: f32 = 60.0;
    pub const VECTOR_PATH_WEIGHT: f32 = 1.0;
    pub const KEYWORD_PATH_WEIGHT: f32 = 1.0;
    pub const ENTITY_PATH_WEIGHT: f32 = 0.8;
    pub const RAW_PATH_WEIGHT: f32 = 1.5;
    pub const FILTER_OVERFETCH_FACTOR: usize = 2;
    pub const DEFAULT_TOP_K: usize = 10;
    pub const DEFAULT_SEARCH_DEADLINE: Duration = Duration::from_secs(5);

    // Context builder
    pub const DEFAULT_CONTEXT_TOKEN_BUDGET: usize = 2_000;
    /// Characters per estimated token for Latin text
    pub const CHARS_PER_TOKEN_LATIN: f32 = 4.0;
    /// Characters per estimated token for CJK text
    pub const CHARS_PER_TOKEN_CJK: f32 = 1.5;

    // Extraction
    pub const ADAPTIVE_COMPLEXITY_THRESHOLD: f32 = 0.55;
    pub const MAX_KEYWORDS_PER_RECORD: usize = 32;

    // Provider adapters
    pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);
    pub const PROVIDER_MAX_RETRIES: usize = 3;
    pub const PROVIDER_RETRY_BASE_DELAY_MS: u64 = 200;

    // Entity confidence
    pub const ENTITY_INITIAL_CONFIDENCE: f32 = 0.5;
    pub const ENTITY_CONFIDENCE_STEP: f32 = 0.1;
    pub const RELATION_INITIAL_CONFIDENCE: f32 = 0.5;
    pub const RELATION_CONFIDENCE_STEP: f32 = 0.1;
}

/// File and directory names under the data root
pub mod layout {
    pub const DATA_DIR: &str = "data";
    pub const INDEXES_DIR: &str = "indexes";
    pub const MODELS_DIR: &str = "models";
    pub const CACHE_DIR: &str = "cache";
    pub const LOGS_DIR: &str = "logs";
    pub const CONFIG_DIR: &str = "config";

    pub const MANIFEST_FILE: &str = "manifest.json";
    pub const ID_MAP_FILE: &str = "id_map.json";
    pub const VOLUME_INDEX_FILE: &str = "volume_index.json";

    pub const INVERTED_SNAPSHOT: &str = "inverted.json";
    pub const INVERTED_WAL: &str = "inverted.wal";
    pub const NGRAM_SNAPSHOT: &str = "ngram.json";
    pub const ENTITY_SNAPSHOT: &str = "entities.json";
    pub const VECTOR_SNAPSHOT: &str = "vectors.json";
    pub const TEMPORAL_SNAPSHOT: &str = "temporal.json";
    pub const METADATA_SNAPSHOT: &str = "metadata.json";
    pub const GRAPH_SNAPSHOT: &str = "graph.json";
    pub const DEDUP_SNAPSHOT: &str = "dedup.json";
    pub const FORESHADOW_SNAPSHOT: &str = "foreshadowing.json";
    pub const CATALOG_FILE: &str = "catalog.json";
}
