//! Vector index over unit-norm embeddings.
//!
//! Inner product over unit vectors equals cosine similarity. A parallel
//! array maps internal position → memory id. The dimension is fixed at
//! construction and must match the embedding provider; a mismatched add is
//! a hard error, never a silent truncation.

use crate::archive::write_json_atomic;
use crate::constants::layout;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
struct VectorSnapshot {
    dimension: usize,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug)]
struct VectorState {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

/// Nearest-neighbour index with a parallel position → id array.
#[derive(Debug)]
pub struct VectorIndex {
    dir: PathBuf,
    dimension: usize,
    state: RwLock<VectorState>,
}

/// Normalize to unit length. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Inner product; equals cosine for unit-norm inputs.
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

impl VectorIndex {
    /// Open the index with a fixed dimension. A persisted snapshot with a
    /// different dimension is a corruption error — the provider changed
    /// under a live index.
    pub fn open(dir: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let snapshot: Option<VectorSnapshot> =
            crate::archive::read_json(&dir.join(layout::VECTOR_SNAPSHOT))?;
        let state = match snapshot {
            Some(snapshot) => {
                if snapshot.dimension != dimension {
                    return Err(Error::Corruption(format!(
                        "vector snapshot dimension {} does not match configured {}",
                        snapshot.dimension, dimension
                    )));
                }
                VectorState {
                    ids: snapshot.ids,
                    vectors: snapshot.vectors,
                }
            }
            None => VectorState {
                ids: Vec::new(),
                vectors: Vec::new(),
            },
        };
        Ok(Self {
            dir,
            dimension,
            state: RwLock::new(state),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.state.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add one embedding. The vector is normalized in place before storage.
    pub fn add(&self, id: &str, mut vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        normalize(&mut vector);
        let mut state = self.state.write();
        state.ids.push(id.to_string());
        state.vectors.push(vector);
        Ok(())
    }

    /// Batched add under one critical section.
    pub fn add_batch(&self, items: Vec<(String, Vec<f32>)>) -> Result<()> {
        for (_, vector) in &items {
            if vector.len() != self.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }
        let mut state = self.state.write();
        for (id, mut vector) in items {
            normalize(&mut vector);
            state.ids.push(id);
            state.vectors.push(vector);
        }
        Ok(())
    }

    /// Top-k by inner product. Query is normalized before scoring.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(String, f32)>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let mut query = query.to_vec();
        normalize(&mut query);

        let state = self.state.read();
        let mut scored: Vec<(String, f32)> = state
            .vectors
            .iter()
            .zip(state.ids.iter())
            .map(|(vector, id)| (id.clone(), dot(&query, vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Stored vector for an id, if present.
    pub fn vector_of(&self, id: &str) -> Option<Vec<f32>> {
        let state = self.state.read();
        state
            .ids
            .iter()
            .position(|candidate| candidate.as_str() == id)
            .map(|pos| state.vectors[pos].clone())
    }

    /// Remove an id, keeping the parallel arrays aligned.
    pub fn remove(&self, id: &str) {
        let mut state = self.state.write();
        if let Some(pos) = state.ids.iter().position(|candidate| candidate.as_str() == id) {
            state.ids.swap_remove(pos);
            state.vectors.swap_remove(pos);
        }
    }

    pub fn flush(&self) -> Result<()> {
        let state = self.state.read();
        let snapshot = VectorSnapshot {
            dimension: self.dimension,
            ids: state.ids.clone(),
            vectors: state.vectors.clone(),
        };
        write_json_atomic(&self.dir.join(layout::VECTOR_SNAPSHOT), &snapshot)
    }

    pub fn clear(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            state.ids.clear();
            state.vectors.clear();
        }
        self.flush()
    }
}
