//! Engine configuration and the mode gate.
//!
//! Configuration is resolved once, at engine construction, from three
//! layers: builtin defaults, an optional env file (`KEY=VALUE` lines), and
//! the process environment. The resolved [`ModeGate`] is an explicit value
//! carried on the engine — never a global — so multiple engines with
//! different modes can coexist in one process.

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Operating mode selected at construction. Switching requires a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Roleplay / story capture with character isolation and foreshadowing
    Narrative,
    /// General conversational memory
    #[default]
    General,
    /// Document and article knowledge base
    KnowledgeBase,
}

impl EngineMode {
    /// Stable name reported by stats and surfaces.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineMode::Narrative => "narrative",
            EngineMode::General => "general",
            EngineMode::KnowledgeBase => "knowledge_base",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "narrative" => Some(EngineMode::Narrative),
            "general" => Some(EngineMode::General),
            "knowledge_base" | "knowledge-base" | "kb" => Some(EngineMode::KnowledgeBase),
            _ => None,
        }
    }
}

/// Feature booleans derived from the mode, each overridable by environment.
///
/// Components receive the gate at construction and decide whether to
/// instantiate narrative-specific subsystems at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeGate {
    pub mode: EngineMode,
    /// Foreshadowing tracking subsystem
    pub foreshadowing: bool,
    /// Sub-tenant (character) isolation
    pub sub_tenant_isolation: bool,
    /// Narrative-specific consistency checks
    pub narrative_consistency: bool,
    /// Narrative relation types in the graph
    pub narrative_relations: bool,
    /// Narrative persistent-condition entity attributes
    pub narrative_conditions: bool,
}

impl ModeGate {
    /// Derive the gate from a mode with no overrides.
    #[must_use]
    pub fn for_mode(mode: EngineMode) -> Self {
        let narrative = mode == EngineMode::Narrative;
        Self {
            mode,
            foreshadowing: narrative,
            sub_tenant_isolation: narrative,
            narrative_consistency: narrative,
            narrative_relations: narrative,
            narrative_conditions: narrative,
        }
    }

    /// Apply `true`/`false` overrides from a key-value view of the
    /// environment.
    fn apply_overrides(mut self, env: &HashMap<String, String>) -> Self {
        let flag = |key: &str, current: bool| -> bool {
            match env.get(key).map(|v| v.trim().to_lowercase()) {
                Some(v) if v == "1" || v == "true" || v == "on" => true,
                Some(v) if v == "0" || v == "false" || v == "off" => false,
                Some(other) => {
                    warn!(key, value = %other, "unparseable feature flag, keeping default");
                    current
                }
                None => current,
            }
        };
        self.foreshadowing = flag(keys::FEATURE_FORESHADOWING, self.foreshadowing);
        self.sub_tenant_isolation = flag(keys::FEATURE_SUBTENANT, self.sub_tenant_isolation);
        self.narrative_consistency =
            flag(keys::FEATURE_NARRATIVE_CONSISTENCY, self.narrative_consistency);
        self.narrative_relations =
            flag(keys::FEATURE_NARRATIVE_RELATIONS, self.narrative_relations);
        self.narrative_conditions =
            flag(keys::FEATURE_NARRATIVE_CONDITIONS, self.narrative_conditions);
        self
    }
}

/// Recognized configuration keys. Anything else in an env file is ignored
/// with a warning.
pub mod keys {
    pub const MODE: &str = "RECALL_MODE";
    pub const DATA_DIR: &str = "RECALL_DATA_DIR";
    pub const LOG: &str = "RECALL_LOG";

    pub const FEATURE_FORESHADOWING: &str = "RECALL_FEATURE_FORESHADOWING";
    pub const FEATURE_SUBTENANT: &str = "RECALL_FEATURE_SUBTENANT";
    pub const FEATURE_NARRATIVE_CONSISTENCY: &str = "RECALL_FEATURE_NARRATIVE_CONSISTENCY";
    pub const FEATURE_NARRATIVE_RELATIONS: &str = "RECALL_FEATURE_NARRATIVE_RELATIONS";
    pub const FEATURE_NARRATIVE_CONDITIONS: &str = "RECALL_FEATURE_NARRATIVE_CONDITIONS";

    pub const LLM_BASE_URL: &str = "RECALL_LLM_BASE_URL";
    pub const LLM_MODEL: &str = "RECALL_LLM_MODEL";
    pub const LLM_API_KEY: &str = "RECALL_LLM_API_KEY";

    pub const EMBED_BASE_URL: &str = "RECALL_EMBED_BASE_URL";
    pub const EMBED_MODEL: &str = "RECALL_EMBED_MODEL";
    pub const EMBED_API_KEY: &str = "RECALL_EMBED_API_KEY";
    pub const EMBED_DIMENSION: &str = "RECALL_EMBED_DIMENSION";

    pub const DEDUP_JACCARD: &str = "RECALL_DEDUP_JACCARD";
    pub const DEDUP_SEMANTIC_HIGH: &str = "RECALL_DEDUP_SEMANTIC_HIGH";
    pub const DEDUP_SEMANTIC_LOW: &str = "RECALL_DEDUP_SEMANTIC_LOW";

    pub const RERANK_BACKEND: &str = "RECALL_RERANK_BACKEND";

    /// Every key the engine recognizes.
    pub const ALL: &[&str] = &[
        MODE,
        DATA_DIR,
        LOG,
        FEATURE_FORESHADOWING,
        FEATURE_SUBTENANT,
        FEATURE_NARRATIVE_CONSISTENCY,
        FEATURE_NARRATIVE_RELATIONS,
        FEATURE_NARRATIVE_CONDITIONS,
        LLM_BASE_URL,
        LLM_MODEL,
        LLM_API_KEY,
        EMBED_BASE_URL,
        EMBED_MODEL,
        EMBED_API_KEY,
        EMBED_DIMENSION,
        DEDUP_JACCARD,
        DEDUP_SEMANTIC_HIGH,
        DEDUP_SEMANTIC_LOW,
        RERANK_BACKEND,
    ];
}

/// Remote provider endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl ProviderEndpoint {
    /// Whether enough is configured to attempt remote calls.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }
}

/// Deduplicator thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    pub jaccard_threshold: f32,
    pub semantic_high: f32,
    pub semantic_low: f32,
    /// Allow stage-3 LLM confirmation for the grey zone
    pub llm_confirm: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            jaccard_threshold: defaults::DEDUP_JACCARD_THRESHOLD,
            semantic_high: defaults::DEDUP_SEMANTIC_HIGH,
            semantic_low: defaults::DEDUP_SEMANTIC_LOW,
            llm_confirm: false,
        }
    }
}

/// Which rerank backend the retrieval funnel uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RerankBackend {
    /// Keyword/entity bonus scorer, always available
    #[default]
    Builtin,
    /// Remote rerank API
    Remote,
    /// No rerank stage
    None,
}

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory for all persistent state
    pub data_dir: PathBuf,
    pub mode: EngineMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_overrides: Option<ModeGate>,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub llm: ProviderEndpoint,
    #[serde(default)]
    pub embedding: ProviderEndpoint,
    /// Override for the embedding dimension table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_dimension: Option<usize>,
    #[serde(default)]
    pub rerank_backend: RerankBackend,
    /// Endpoint for the remote rerank backend
    #[serde(default)]
    pub rerank: ProviderEndpoint,
    /// Edge-conflict resolution strategy
    #[serde(default)]
    pub contradiction_strategy: crate::types::ResolutionStrategy,
    /// Disable the vector index entirely ("lite" mode)
    #[serde(default)]
    pub lite: bool,
}

impl EngineConfig {
    /// Defaults rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            mode: EngineMode::default(),
            gate_overrides: None,
            dedup: DedupConfig::default(),
            llm: ProviderEndpoint::default(),
            embedding: ProviderEndpoint::default(),
            embed_dimension: None,
            rerank_backend: RerankBackend::default(),
            rerank: ProviderEndpoint::default(),
            contradiction_strategy: crate::types::ResolutionStrategy::default(),
            lite: false,
        }
    }

    /// Set the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: EngineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Resolve the mode gate: derived booleans plus environment overrides.
    #[must_use]
    pub fn resolve_gate(&self) -> ModeGate {
        if let Some(gate) = self.gate_overrides {
            return gate;
        }
        let env: HashMap<String, String> = std::env::vars().collect();
        ModeGate::for_mode(self.mode).apply_overrides(&env)
    }

    /// Load configuration from an env file, layering process environment on
    /// top. Unknown keys warn and are skipped.
    pub fn from_env_file(data_dir: impl Into<PathBuf>, path: &Path) -> crate::Result<Self> {
        let mut values = parse_env_file(path)?;
        for (key, value) in std::env::vars() {
            if keys::ALL.contains(&key.as_str()) {
                values.insert(key, value);
            }
        }
        Ok(Self::from_values(data_dir, &values))
    }

    /// Build a config from an already-resolved key-value map.
    #[must_use]
    pub fn from_values(data_dir: impl Into<PathBuf>, values: &HashMap<String, String>) -> Self {
        let mut config = Self::new(data_dir);
        if let Some(dir) = values.get(keys::DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(mode) = values.get(keys::MODE) {
            match EngineMode::parse(mode) {
                Some(parsed) => config.mode = parsed,
                None => warn!(value = %mode, "unknown mode, keeping {}", config.mode.as_str()),
            }
        }
        config.gate_overrides = Some(ModeGate::for_mode(config.mode).apply_overrides(values));

        config.llm.base_url = values.get(keys::LLM_BASE_URL).cloned();
        config.llm.model = values.get(keys::LLM_MODEL).cloned();
        config.llm.api_key = values.get(keys::LLM_API_KEY).cloned();
        config.embedding.base_url = values.get(keys::EMBED_BASE_URL).cloned();
        config.embedding.model = values.get(keys::EMBED_MODEL).cloned();
        config.embedding.api_key = values.get(keys::EMBED_API_KEY).cloned();
        config.embed_dimension = values
            .get(keys::EMBED_DIMENSION)
            .and_then(|v| v.trim().parse().ok());

        let threshold = |key: &str, current: f32| -> f32 {
            values
                .get(key)
                .and_then(|v| v.trim().parse::<f32>().ok())
                .filter(|v| (0.0..=1.0).contains(v))
                .unwrap_or(current)
        };
        config.dedup.jaccard_threshold =
            threshold(keys::DEDUP_JACCARD, config.dedup.jaccard_threshold);
        config.dedup.semantic_high =
            threshold(keys::DEDUP_SEMANTIC_HIGH, config.dedup.semantic_high);
        config.dedup.semantic_low = threshold(keys::DEDUP_SEMANTIC_LOW, config.dedup.semantic_low);

        if let Some(backend) = values.get(keys::RERANK_BACKEND) {
            config.rerank_backend = match backend.trim().to_lowercase().as_str() {
                "builtin" => RerankBackend::Builtin,
                "remote" => RerankBackend::Remote,
                "none" | "off" => RerankBackend::None,
                other => {
                    warn!(value = %other, "unknown rerank backend, using builtin");
                    RerankBackend::Builtin
                }
            };
        }
        config
    }
}

/// Parse `KEY=VALUE` lines; `#` comments and blanks are skipped; unknown
/// keys warn and are dropped.
fn parse_env_file(path: &Path) -> crate::Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    let mut values = HashMap::new();
    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            warn!(line = line_no + 1, "skipping malformed env line");
            continue;
        };
        let key = key.trim();
        if keys::ALL.contains(&key) {
            values.insert(key.to_string(), value.trim().to_string());
        } else {
            warn!(key, "ignoring unrecognized configuration key");
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_derivation_per_mode() {
        let narrative = ModeGate::for_mode(EngineMode::Narrative);
        assert!(narrative.foreshadowing);
        assert!(narrative.sub_tenant_isolation);

        let general = ModeGate::for_mode(EngineMode::General);
        assert!(!general.foreshadowing);
        assert!(!general.narrative_relations);

        let kb = ModeGate::for_mode(EngineMode::KnowledgeBase);
        assert!(!kb.foreshadowing);
    }

    #[test]
    fn overrides_flip_individual_features() {
        let mut env = HashMap::new();
        env.insert(keys::FEATURE_FORESHADOWING.to_string(), "on".to_string());
        let gate = ModeGate::for_mode(EngineMode::General).apply_overrides(&env);
        assert!(gate.foreshadowing);
        assert!(!gate.narrative_relations);
    }

    #[test]
    fn values_resolve_mode_and_thresholds() {
        let mut values = HashMap::new();
        values.insert(keys::MODE.to_string(), "knowledge-base".to_string());
        values.insert(keys::DEDUP_JACCARD.to_string(), "0.9".to_string());
        values.insert(keys::DEDUP_SEMANTIC_LOW.to_string(), "nonsense".to_string());
        let config = EngineConfig::from_values("/tmp/recall", &values);
        assert_eq!(config.mode, EngineMode::KnowledgeBase);
        assert!((config.dedup.jaccard_threshold - 0.9).abs() < f32::EPSILON);
        assert!((config.dedup.semantic_low - defaults::DEDUP_SEMANTIC_LOW).abs() < f32::EPSILON);
    }

    #[test]
    fn env_file_skips_unknown_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("recall.env");
        std::fs::write(
            &path,
            "# comment\nRECALL_MODE=narrative\nNOT_A_KEY=1\nRECALL_EMBED_DIMENSION=384\n",
        )
        .expect("write env file");
        let config = EngineConfig::from_env_file(dir.path(), &path).expect("load");
        assert_eq!(config.mode, EngineMode::Narrative);
        assert_eq!(config.embed_dimension, Some(384));
    }
}
