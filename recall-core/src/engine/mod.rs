//! The memory engine: construction and the public operation surface.
//!
//! One engine owns one data root. The mode gate is resolved once here and
//! carried as a value — multiple engines with different modes coexist in
//! one process. All persistent state lives under the data root; deleting
//! that directory removes every trace.

mod ingest;
pub(crate) mod maintenance;
mod query;
mod stats;

pub use ingest::{AddOptions, AddOutcome, BatchItem};
pub use stats::EngineStats;

use crate::archive::ArchiveLog;
use crate::config::{EngineConfig, ModeGate};
use crate::consistency::ConsistencyChecker;
use crate::constants::{defaults, layout};
use crate::dedup::Deduplicator;
use crate::error::{Error, Result};
use crate::extract::SmartExtractor;
use crate::foreshadow::ForeshadowTracker;
use crate::graph::{Direction, GraphEpisode, KnowledgeGraph};
use crate::index::IndexSet;
use crate::providers::{
    chat_provider_from, embedding_backend_from, rerank_provider_from, ChatProvider,
    EmbeddingService, RerankProvider,
};
use crate::scope::ScopeId;
use crate::types::{Contradiction, Entity, ForeshadowDetector, Foreshadowing, MemoryRecord, Relation, RelationType};
use maintenance::{MaintenanceHandle, Shared, Tick};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// The engine.
pub struct MemoryEngine {
    config: EngineConfig,
    gate: ModeGate,
    data_dir: PathBuf,
    scopes: Arc<Mutex<HashMap<ScopeId, Arc<ArchiveLog>>>>,
    catalog: Arc<Mutex<HashMap<String, ScopeId>>>,
    indexes: Arc<IndexSet>,
    graph: Arc<KnowledgeGraph>,
    dedup: Arc<Deduplicator>,
    extractor: SmartExtractor,
    consistency: ConsistencyChecker,
    foreshadow: Option<Arc<ForeshadowTracker>>,
    llm: Option<Arc<dyn ChatProvider>>,
    embeddings: Arc<EmbeddingService>,
    reranker: Option<Arc<dyn RerankProvider>>,
    maintenance: MaintenanceHandle,
}

impl MemoryEngine {
    /// Open an engine over `config.data_dir`, creating the directory layout
    /// on first use.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let gate = config.resolve_gate();
        let root = config.data_dir.clone();
        for sub in [
            layout::DATA_DIR,
            layout::INDEXES_DIR,
            layout::MODELS_DIR,
            layout::CACHE_DIR,
            layout::LOGS_DIR,
            layout::CONFIG_DIR,
        ] {
            fs::create_dir_all(root.join(sub))?;
        }
        let indexes_dir = root.join(layout::INDEXES_DIR);

        let embeddings = Arc::new(EmbeddingService::new(embedding_backend_from(
            &config.embedding,
            config.embed_dimension,
        )));
        let vector_dimension = if config.lite {
            None
        } else {
            Some(embeddings.dimension())
        };

        let indexes = Arc::new(IndexSet::open(&indexes_dir, vector_dimension)?);
        let graph = Arc::new(KnowledgeGraph::open(indexes_dir.join("graph"))?);
        let dedup = Arc::new(Deduplicator::open(
            indexes_dir.join("dedup"),
            config.dedup,
        )?);
        let foreshadow = if gate.foreshadowing {
            Some(Arc::new(ForeshadowTracker::open(
                indexes_dir.join("foreshadowing"),
            )?))
        } else {
            None
        };

        let catalog: HashMap<String, ScopeId> =
            crate::archive::read_json(&indexes_dir.join(layout::CATALOG_FILE))?.unwrap_or_default();
        let catalog = Arc::new(Mutex::new(catalog));
        let scopes = Arc::new(Mutex::new(HashMap::new()));

        let maintenance = MaintenanceHandle::spawn(Shared {
            indexes: Arc::clone(&indexes),
            graph: Arc::clone(&graph),
            dedup: Arc::clone(&dedup),
            foreshadow: foreshadow.clone(),
            scopes: Arc::clone(&scopes),
            catalog: Arc::clone(&catalog),
            catalog_path: indexes_dir.join(layout::CATALOG_FILE),
        });

        info!(mode = gate.mode.as_str(), root = %root.display(), "engine opened");
        let engine = Self {
            llm: chat_provider_from(&config.llm).map(Arc::from),
            reranker: rerank_provider_from(&config.rerank).map(Arc::from),
            extractor: SmartExtractor::default(),
            consistency: ConsistencyChecker::new(&gate),
            config,
            gate,
            data_dir: root,
            scopes,
            catalog,
            indexes,
            graph,
            dedup,
            foreshadow,
            embeddings,
            maintenance,
        };

        // Reopen every scope the catalog knows about so counts and warmup
        // do not wait for the first touch.
        let known_scopes: std::collections::HashSet<ScopeId> =
            engine.catalog.lock().values().cloned().collect();
        for scope in known_scopes {
            engine.archive_for(&scope)?;
        }
        Ok(engine)
    }

    /// The resolved mode gate.
    #[must_use]
    pub fn gate(&self) -> &ModeGate {
        &self.gate
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Force the fixed default sub-tenant outside narrative mode.
    pub(crate) fn effective_scope(&self, scope: &ScopeId) -> ScopeId {
        if self.gate.sub_tenant_isolation {
            scope.clone()
        } else {
            scope.with_default_sub_tenant()
        }
    }

    /// Archive for a scope, opened (and its recent volumes preloaded) on
    /// first touch.
    pub(crate) fn archive_for(&self, scope: &ScopeId) -> Result<Arc<ArchiveLog>> {
        // Held across the open so two callers cannot race the same scope
        // into two writers.
        let mut scopes = self.scopes.lock();
        if let Some(archive) = scopes.get(scope) {
            return Ok(Arc::clone(archive));
        }
        let dir = self
            .data_dir
            .join(layout::DATA_DIR)
            .join(scope.relative_path())
            .join("archive");
        let archive = Arc::new(ArchiveLog::open(dir)?);
        archive.preload_recent(defaults::PRELOADED_RECENT_VOLUMES)?;
        scopes.insert(scope.clone(), Arc::clone(&archive));
        Ok(archive)
    }

    /// Fetch a record by id, across scopes.
    pub fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let scope = match self.catalog.lock().get(id) {
            Some(scope) => scope.clone(),
            None => return Ok(None),
        };
        self.archive_for(&scope)?.get_by_id(id)
    }

    /// Delete a record by id: tombstone in the archive, unlink from every
    /// index and the dedup state.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let scope = match self.catalog.lock().get(id) {
            Some(scope) => scope.clone(),
            None => return Ok(false),
        };
        let archive = self.archive_for(&scope)?;
        let Some(record) = archive.delete_by_id(id)? else {
            return Ok(false);
        };
        if let Err(e) = self.indexes.remove_record(&record) {
            warn!(id, error = %e, "index unlink failed; archive tombstone stands");
        }
        self.dedup.remove(id);
        self.catalog.lock().remove(id);
        self.maintenance.notify(Tick::FlushNow);
        Ok(true)
    }

    /// Most recent records in a scope, newest first.
    pub fn list(&self, scope: &ScopeId, limit: usize) -> Result<Vec<MemoryRecord>> {
        let scope = self.effective_scope(scope);
        let archive = self.archive_for(&scope)?;
        let total = archive.total_records();
        let start = total.saturating_sub(limit as u64);
        let mut records = archive.range(start, total)?;
        records.reverse();
        Ok(records)
    }

    /// All known entities.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.indexes.entities.all()
    }

    /// Resolve an entity by name or alias.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<Entity> {
        self.indexes.entities.resolve(name)
    }

    /// Current neighbours of an entity (name or alias), optionally filtered
    /// by relation type.
    pub fn neighbours(
        &self,
        entity_name: &str,
        relation_type: Option<&RelationType>,
        direction: Direction,
    ) -> Result<Vec<Relation>> {
        let entity = self
            .indexes
            .entities
            .resolve(entity_name)
            .ok_or_else(|| Error::NotFound(format!("entity {entity_name}")))?;
        Ok(self.graph.neighbours(&entity.id, relation_type, direction))
    }

    /// Neighbours as of a given fact time (bitemporal query).
    pub fn neighbours_at(
        &self,
        entity_name: &str,
        relation_type: Option<&RelationType>,
        direction: Direction,
        fact_time: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Relation>> {
        let entity = self
            .indexes
            .entities
            .resolve(entity_name)
            .ok_or_else(|| Error::NotFound(format!("entity {entity_name}")))?;
        Ok(self
            .graph
            .neighbours_at(&entity.id, relation_type, direction, fact_time))
    }

    /// BFS subgraph around an entity.
    pub fn traverse(&self, entity_name: &str, depth: usize) -> Result<(Vec<String>, Vec<Relation>)> {
        let entity = self
            .indexes
            .entities
            .resolve(entity_name)
            .ok_or_else(|| Error::NotFound(format!("entity {entity_name}")))?;
        Ok(self.graph.subgraph(&entity.id, depth))
    }

    /// Shortest path between two entities.
    pub fn shortest_path(
        &self,
        from: &str,
        to: &str,
        max_depth: usize,
    ) -> Result<Option<Vec<String>>> {
        let from = self
            .indexes
            .entities
            .resolve(from)
            .ok_or_else(|| Error::NotFound(format!("entity {from}")))?;
        let to = self
            .indexes
            .entities
            .resolve(to)
            .ok_or_else(|| Error::NotFound(format!("entity {to}")))?;
        Ok(self.graph.shortest_path(&from.id, &to.id, max_depth))
    }

    /// Episodes that produced an edge, for traceability.
    #[must_use]
    pub fn episodes_for_edge(&self, edge_key: &str) -> Vec<GraphEpisode> {
        self.graph.episodes_for_edge(edge_key)
    }

    /// Contradictions awaiting user action.
    #[must_use]
    pub fn open_contradictions(&self) -> Vec<Contradiction> {
        self.graph.open_contradictions()
    }

    fn foreshadow_tracker(&self) -> Result<&Arc<ForeshadowTracker>> {
        self.foreshadow.as_ref().ok_or_else(|| {
            Error::FeatureDisabled(format!(
                "foreshadowing is not available in {} mode",
                self.gate.mode.as_str()
            ))
        })
    }

    /// Create a foreshadowing hint. `FeatureDisabled` outside narrative
    /// mode; nothing is ever written to disk for the disabled subsystem.
    pub fn foreshadow_add(
        &self,
        content: &str,
        importance: f32,
        related_entities: Vec<String>,
    ) -> Result<Foreshadowing> {
        let tracker = self.foreshadow_tracker()?;
        let ordinal = self.total_records();
        let hint = tracker.create(
            content,
            importance,
            related_entities,
            ForeshadowDetector::Manual,
            ordinal,
        );
        self.maintenance.notify(Tick::Ingest);
        Ok(hint)
    }

    /// Active hints, most important first.
    pub fn foreshadow_active(&self) -> Result<Vec<Foreshadowing>> {
        Ok(self.foreshadow_tracker()?.active())
    }

    /// Resolve a hint.
    pub fn foreshadow_resolve(&self, id: &str) -> Result<Foreshadowing> {
        let tracker = self.foreshadow_tracker()?;
        let hint = tracker.resolve(id, self.total_records())?;
        self.maintenance.notify(Tick::Ingest);
        Ok(hint)
    }

    pub(crate) fn total_records(&self) -> u64 {
        self.scopes
            .lock()
            .values()
            .map(|archive| archive.total_records())
            .sum()
    }

    /// Rebuild the text-derived indices from every scope's archive. The
    /// recovery route for index corruption.
    pub fn rebuild_indexes(&self) -> Result<()> {
        let archives: Vec<Arc<ArchiveLog>> = self.scopes.lock().values().cloned().collect();
        for archive in &archives {
            self.indexes.rebuild_from(archive)?;
        }
        Ok(())
    }

    /// Flush everything dirty to disk now.
    pub fn flush(&self) -> Result<()> {
        maintenance::flush_all(&Shared {
            indexes: Arc::clone(&self.indexes),
            graph: Arc::clone(&self.graph),
            dedup: Arc::clone(&self.dedup),
            foreshadow: self.foreshadow.clone(),
            scopes: Arc::clone(&self.scopes),
            catalog: Arc::clone(&self.catalog),
            catalog_path: self
                .data_dir
                .join(layout::INDEXES_DIR)
                .join(layout::CATALOG_FILE),
        });
        Ok(())
    }

    /// Flush and stop the maintenance worker. Also runs on drop.
    pub fn shutdown(&self) {
        self.maintenance.shutdown();
    }
}
