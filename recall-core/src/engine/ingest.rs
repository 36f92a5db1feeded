//! The ingest pipeline: mode gate → dedup → extraction → consistency →
//! persist → index fan-out → graph → background notify.
//!
//! Persistence is the only fatal step. Everything after the archive append
//! degrades into warnings — the archive is the source of truth and every
//! index is rebuildable from it.

use super::maintenance::Tick;
use super::MemoryEngine;
use crate::dedup::{DedupVerdict, Stage1};
use crate::error::{Error, Result};
use crate::extract::Extraction;
use crate::index::dot;
use crate::providers::{ChatMessage, ChatOptions};
use crate::scope::ScopeId;
use crate::types::{MemoryRecord, RecordMetadata, Relation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Per-call ingest switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOptions {
    /// Bypass the deduplicator entirely
    #[serde(default)]
    pub skip_dedup: bool,
    /// Force rules-only extraction
    #[serde(default)]
    pub skip_llm: bool,
}

/// Result of one ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddOutcome {
    /// Id of the stored record — or of the pre-existing record on a
    /// duplicate
    pub id: String,
    /// False when the content was a duplicate and nothing new was stored
    pub accepted: bool,
    /// Entity names recognized in the content
    pub entities: Vec<String>,
    /// Degraded steps and detected inconsistencies
    pub warnings: Vec<String>,
}

/// One item of a batch ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub content: String,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

impl MemoryEngine {
    /// Ingest one piece of content.
    pub fn add(
        &self,
        content: &str,
        scope: &ScopeId,
        metadata: RecordMetadata,
    ) -> Result<AddOutcome> {
        self.add_with_options(content, scope, metadata, AddOptions::default())
    }

    /// Ingest with explicit dedup/LLM switches.
    pub fn add_with_options(
        &self,
        content: &str,
        scope: &ScopeId,
        metadata: RecordMetadata,
        options: AddOptions,
    ) -> Result<AddOutcome> {
        if content.trim().is_empty() {
            return Err(Error::InvalidArgument("content is empty".to_string()));
        }
        let scope = self.effective_scope(scope);
        let mut warnings = Vec::new();

        if !options.skip_dedup {
            match self.dedup_verdict(content, &mut warnings) {
                DedupVerdict::DuplicateOf(id) => {
                    debug!(id, "duplicate content, returning existing record");
                    return Ok(AddOutcome {
                        id,
                        accepted: false,
                        entities: Vec::new(),
                        warnings,
                    });
                }
                DedupVerdict::Uncertain { id, similarity } => {
                    warnings.push(format!(
                        "possible duplicate of {id} (similarity {similarity:.2})"
                    ));
                }
                DedupVerdict::Unique => {}
            }
        }

        let provider = if options.skip_llm {
            None
        } else {
            self.llm.as_deref()
        };
        let extraction = self.extractor.extract(content, provider);

        let embedding = self.embed_for_index(content, &mut warnings);
        self.ingest_record(content, scope, metadata, extraction, embedding, warnings)
    }

    /// Batch ingest: embeddings in one call, index flush once at the end.
    /// Produces the same logical result as sequential `add`.
    pub fn add_batch(
        &self,
        items: Vec<BatchItem>,
        scope: &ScopeId,
        options: AddOptions,
    ) -> Result<Vec<String>> {
        let scope = self.effective_scope(scope);

        let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; items.len()];
        if self.indexes.vector.is_some() {
            let contents: Vec<String> = items.iter().map(|item| item.content.clone()).collect();
            match self.embeddings.encode_batch(&contents) {
                Ok(vectors) => {
                    embeddings = vectors.into_iter().map(Some).collect();
                }
                Err(e) => {
                    warn!(error = %e, "batch embedding unavailable, vector index will lag");
                }
            }
        }

        let mut ids = Vec::with_capacity(items.len());
        for (item, embedding) in items.into_iter().zip(embeddings) {
            let mut warnings = Vec::new();
            if item.content.trim().is_empty() {
                ids.push(String::new());
                continue;
            }
            if !options.skip_dedup {
                if let DedupVerdict::DuplicateOf(id) =
                    self.dedup_verdict(&item.content, &mut warnings)
                {
                    ids.push(id);
                    continue;
                }
            }
            // Batch extraction never consults the LLM when skip_llm is set.
            let provider = if options.skip_llm {
                None
            } else {
                self.llm.as_deref()
            };
            let extraction = self.extractor.extract(&item.content, provider);
            let outcome = self.ingest_record(
                &item.content,
                scope.clone(),
                item.metadata,
                extraction,
                embedding,
                warnings,
            )?;
            ids.push(outcome.id);
        }
        self.maintenance.notify(Tick::FlushNow);
        Ok(ids)
    }

    /// Steps 5-8 of the pipeline, shared by single and batch ingest.
    fn ingest_record(
        &self,
        content: &str,
        scope: ScopeId,
        metadata: RecordMetadata,
        extraction: Extraction,
        embedding: Option<Vec<f32>>,
        mut warnings: Vec<String>,
    ) -> Result<AddOutcome> {
        let mut record = MemoryRecord::new(content.to_string(), scope.clone(), metadata);
        record.keywords = extraction.keywords.clone();

        // Observe entities first so the record carries their ids.
        let mut entity_ids: Vec<(String, String)> = Vec::new();
        for entity in &extraction.entities {
            let id = self.indexes.entities.observe(
                &entity.name,
                entity.entity_type.clone(),
                &record.id,
                &entity.aliases,
            );
            record.entities_mentioned.push(id.clone());
            entity_ids.push((entity.name.clone(), id));
        }

        for issue in self.consistency.check_and_record(
            content,
            &extraction.entities,
            &entity_ids,
            &self.indexes.entities,
        ) {
            warnings.push(format!(
                "consistency[{}] {}: {}",
                issue.rule, issue.entity, issue.detail
            ));
        }

        // Persist. The only step allowed to fail the ingest.
        let archive = self.archive_for(&scope)?;
        let ordinal = archive.append(&record)?;
        self.catalog.lock().insert(record.id.clone(), scope);

        // Index fan-out: never fails the write.
        if let Err(e) = self.indexes.index_record(&record) {
            warn!(id = %record.id, error = %e, "index update failed, archive is authoritative");
            warnings.push(format!("index update failed: {e}"));
        }
        if let (Some(vector_index), Some(embedding)) = (&self.indexes.vector, embedding) {
            if let Err(e) = vector_index.add(&record.id, embedding) {
                warn!(id = %record.id, error = %e, "vector index update failed");
                warnings.push(format!("vector index update failed: {e}"));
            }
        }

        let edge_keys = self.insert_relations(&record, ordinal, &extraction, &entity_ids, &mut warnings);
        if !entity_ids.is_empty() || !edge_keys.is_empty() {
            self.graph.record_episode(
                &record.id,
                content,
                entity_ids.iter().map(|(_, id)| id.clone()).collect(),
                edge_keys,
            );
        }

        self.dedup.register(&record.id, content);
        if self.indexes.note_writes(1) {
            self.maintenance.notify(Tick::FlushNow);
        } else {
            self.maintenance.notify(Tick::Ingest);
        }

        Ok(AddOutcome {
            id: record.id,
            accepted: true,
            entities: extraction.entities.into_iter().map(|e| e.name).collect(),
            warnings,
        })
    }

    /// Step 7: relations into the graph, honoring the contradiction
    /// strategy and the narrative-relation gate.
    fn insert_relations(
        &self,
        record: &MemoryRecord,
        ordinal: u64,
        extraction: &Extraction,
        entity_ids: &[(String, String)],
        warnings: &mut Vec<String>,
    ) -> Vec<String> {
        let resolve = |name: &str| {
            entity_ids
                .iter()
                .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
                .map(|(_, id)| id.clone())
        };
        let fact_range = crate::index::IndexSet::fact_range_of(record);
        let mut edge_keys = Vec::new();

        for extracted in &extraction.relations {
            if extracted.relation_type.is_narrative() && !self.gate.narrative_relations {
                continue;
            }
            let (Some(source), Some(target)) =
                (resolve(&extracted.source_name), resolve(&extracted.target_name))
            else {
                continue;
            };
            let mut edge = Relation::new(source, extracted.relation_type.clone(), target, ordinal);
            edge.source_text = Some(extracted.evidence.clone());
            edge.stamp.valid = fact_range;
            let key = crate::graph::edge_key(
                &edge.source_entity_id,
                &edge.relation_type,
                &edge.target_entity_id,
            );
            match self.graph.add_edge(edge, self.config.contradiction_strategy) {
                Ok(_) => edge_keys.push(key),
                Err(Error::Conflict(detail)) => {
                    warnings.push(format!("relation rejected: {detail}"));
                }
                Err(e) => {
                    warn!(error = %e, "graph update failed");
                    warnings.push(format!("graph update failed: {e}"));
                }
            }
        }
        edge_keys
    }

    /// Embed content for the vector index, degrading on provider failure.
    fn embed_for_index(&self, content: &str, warnings: &mut Vec<String>) -> Option<Vec<f32>> {
        self.indexes.vector.as_ref()?;
        match self.embeddings.encode(content) {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "embedding unavailable, vector index will lag");
                warnings.push(format!("embedding unavailable: {e}"));
                None
            }
        }
    }

    /// Stages 1-3 of deduplication.
    fn dedup_verdict(&self, content: &str, warnings: &mut Vec<String>) -> DedupVerdict {
        let candidates = match self.dedup.stage1(content) {
            Stage1::ExactDuplicate(id) | Stage1::NearDuplicate { id, .. } => {
                return DedupVerdict::DuplicateOf(id);
            }
            Stage1::Candidates(candidates) => candidates,
        };
        if candidates.is_empty() {
            return DedupVerdict::Unique;
        }

        // Stage 2: embedding similarity over the candidate set.
        let query = match self.embeddings.encode(content) {
            Ok(vector) => vector,
            Err(e) => {
                warnings.push(format!("semantic dedup degraded to stage 1: {e}"));
                return DedupVerdict::Unique;
            }
        };
        let mut best: Option<(String, f32)> = None;
        for id in candidates {
            let Some(candidate_content) = self.indexes.phrases.content_of(&id) else {
                continue;
            };
            let Ok(candidate_vector) = self.embeddings.encode(&candidate_content) else {
                continue;
            };
            let similarity = dot(&query, &candidate_vector);
            if best.as_ref().is_none_or(|(_, s)| similarity > *s) {
                best = Some((id, similarity));
            }
        }
        let Some((id, similarity)) = best else {
            return DedupVerdict::Unique;
        };
        let config = self.dedup.config();
        if similarity >= config.semantic_high {
            return DedupVerdict::DuplicateOf(id);
        }
        if similarity < config.semantic_low {
            return DedupVerdict::Unique;
        }

        // Stage 3: optional LLM confirmation for the grey zone.
        if config.llm_confirm {
            if let Some(provider) = self.llm.as_deref() {
                let existing = self.indexes.phrases.content_of(&id).unwrap_or_default();
                let prompt = format!(
                    "Are these two statements duplicates of the same fact? \
                     Answer only yes or no.\nA: {content}\nB: {existing}"
                );
                match provider.chat(
                    &[ChatMessage::user(prompt)],
                    &ChatOptions {
                        max_tokens: 8,
                        ..ChatOptions::default()
                    },
                ) {
                    Ok(response) if response.content.trim().to_lowercase().starts_with("yes") => {
                        return DedupVerdict::DuplicateOf(id);
                    }
                    Ok(_) => return DedupVerdict::Unique,
                    Err(e) => {
                        warnings.push(format!("dedup LLM confirm unavailable: {e}"));
                    }
                }
            }
        }
        DedupVerdict::Uncertain { id, similarity }
    }
}
