//! Entity index: entities by id plus a case-folded name/alias resolver.

use crate::archive::write_json_atomic;
use crate::constants::layout;
use crate::error::Result;
use crate::types::{Entity, EntityType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Default, Serialize, Deserialize)]
struct EntitySnapshot {
    entities: HashMap<String, Entity>,
    /// Case-folded name or alias → entity id
    names: HashMap<String, String>,
}

/// Entities keyed by id, with name+alias resolution.
///
/// Invariant: every name and alias resolves to a unique entity id through
/// the folded name map. Re-observing merges references and aliases and
/// raises confidence; entities are never silently destroyed.
pub struct EntityIndex {
    dir: PathBuf,
    state: Mutex<EntitySnapshot>,
}

fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}

impl EntityIndex {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let snapshot: EntitySnapshot =
            crate::archive::read_json(&dir.join(layout::ENTITY_SNAPSHOT))?.unwrap_or_default();
        Ok(Self {
            dir,
            state: Mutex::new(snapshot),
        })
    }

    /// Record an observation of `name` in memory `memory_id`.
    ///
    /// Returns the entity id: the existing one (merged, confidence bumped)
    /// when the folded name or an alias already resolves, otherwise a fresh
    /// entity.
    pub fn observe(
        &self,
        name: &str,
        entity_type: EntityType,
        memory_id: &str,
        aliases: &[String],
    ) -> String {
        let mut state = self.state.lock();
        let folded = fold(name);

        let id = match state.names.get(&folded) {
            Some(id) => id.clone(),
            None => {
                let entity = Entity::new(name, entity_type);
                let id = entity.id.clone();
                state.names.insert(folded, id.clone());
                state.entities.insert(id.clone(), entity);
                id
            }
        };

        // Register aliases first so the merge below sees them.
        for alias in aliases {
            let alias_folded = fold(alias);
            if alias_folded.is_empty() || state.names.contains_key(&alias_folded) {
                continue;
            }
            state.names.insert(alias_folded, id.clone());
            if let Some(entity) = state.entities.get_mut(&id) {
                entity.aliases.insert(alias.clone());
            }
        }

        if let Some(entity) = state.entities.get_mut(&id) {
            entity.references.insert(memory_id.to_string());
            entity.bump_confidence();
            if fold(&entity.name) != fold(name) {
                entity.aliases.insert(name.to_string());
            }
        }
        id
    }

    /// Resolve a surface form (name or alias) to an entity.
    pub fn resolve(&self, name: &str) -> Option<Entity> {
        let state = self.state.lock();
        let id = state.names.get(&fold(name))?;
        state.entities.get(id).cloned()
    }

    pub fn get(&self, id: &str) -> Option<Entity> {
        self.state.lock().entities.get(id).cloned()
    }

    /// Set a structured attribute on an entity.
    pub fn set_attribute(&self, id: &str, key: &str, value: &str) {
        if let Some(entity) = self.state.lock().entities.get_mut(id) {
            entity.attributes.insert(key.to_string(), value.to_string());
        }
    }

    /// Remove a memory reference from every entity that carries it.
    pub fn unlink_memory(&self, memory_id: &str) {
        let mut state = self.state.lock();
        for entity in state.entities.values_mut() {
            entity.references.remove(memory_id);
        }
    }

    /// All entities, unordered.
    pub fn all(&self) -> Vec<Entity> {
        self.state.lock().entities.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&self) -> Result<()> {
        let state = self.state.lock();
        write_json_atomic(&self.dir.join(layout::ENTITY_SNAPSHOT), &*state)
    }

    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.entities.clear();
        state.names.clear();
        write_json_atomic(&self.dir.join(layout::ENTITY_SNAPSHOT), &*state)
    }
}
