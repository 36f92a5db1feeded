#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

//! # Recall Core
//!
//! A local, embeddable long-term memory engine for conversational AI and
//! knowledge-capture workloads.
//!
//! The central promise is **non-forgetting recall**: every ingested
//! fragment is preserved verbatim in an append-only archive, and every
//! query runs a funnel of complementary search paths whose last stage is a
//! raw-substring fallback that cannot miss an exact match.
//!
//! ## Subsystems
//!
//! - [`archive`]: volume-sharded append-only log — the source of truth
//! - [`index`]: keyword, phrase, entity, vector, temporal, metadata indices
//! - [`retrieval`]: parallel recall paths, reciprocal rank fusion, rerank,
//!   context building
//! - [`dedup`]: three-stage near-duplicate detection (MinHash/LSH,
//!   embeddings, optional LLM confirm)
//! - [`graph`]: temporal knowledge graph with contradiction detection
//! - [`engine`]: the orchestrator binding everything behind a mode gate
//! - [`providers`]: auto-detected LLM / embedding / rerank adapters
//!
//! ## Quick start
//!
//! ```no_run
//! use recall_core::{EngineConfig, MemoryEngine, RecordMetadata, ScopeId, SearchRequest};
//!
//! fn main() -> recall_core::Result<()> {
//!     let engine = MemoryEngine::open(EngineConfig::new("./recall-data"))?;
//!     let scope = ScopeId::new("alice", "default", "chat-1");
//!
//!     let outcome = engine.add(
//!         "The vault access code is 7742-alpha",
//!         &scope,
//!         RecordMetadata::default(),
//!     )?;
//!     println!("stored {} (accepted: {})", outcome.id, outcome.accepted);
//!
//!     let hits = engine.search(&SearchRequest::new("7742").in_scope(scope))?;
//!     assert!(!hits.is_empty());
//!     Ok(())
//! }
//! ```
//!
//! ## Modes
//!
//! The engine runs in one of three modes — narrative, general, or
//! knowledge-base — resolved once at construction into a [`config::ModeGate`].
//! Narrative-only subsystems (foreshadowing, character isolation,
//! narrative relation types and consistency checks) are not instantiated
//! outside narrative mode. Engines with different modes coexist freely in
//! one process.
//!
//! ## Degraded operation
//!
//! External adapters are optional. With no LLM, extraction runs on rules;
//! with no embedding provider, a deterministic local embedder stands in;
//! with no rerank backend, the builtin scorer is used. The engine never
//! fails an ingest or a query because a provider is down.

pub mod archive;
pub mod config;
pub mod consistency;
pub mod constants;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod extract;
pub mod foreshadow;
pub mod graph;
pub mod index;
pub mod providers;
pub mod retrieval;
pub mod scope;
pub mod types;

// Re-export the primary API surface.
pub use config::{DedupConfig, EngineConfig, EngineMode, ModeGate, ProviderEndpoint, RerankBackend};
pub use engine::{AddOptions, AddOutcome, BatchItem, EngineStats, MemoryEngine};
pub use error::{Error, Result};
pub use graph::Direction;
pub use index::MetadataFilter;
pub use retrieval::{SearchHit, SearchRequest, TemporalConstraint};
pub use scope::ScopeId;
pub use types::{
    ContentType, Contradiction, Entity, EntityType, Foreshadowing, MemoryRecord, RecordMetadata,
    Relation, RelationType, ResolutionStrategy, TimeRange,
};
