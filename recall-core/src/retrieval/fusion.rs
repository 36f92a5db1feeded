//! Reciprocal rank fusion.

use std::collections::HashMap;

/// One recall path's ranked output.
#[derive(Debug, Clone)]
pub struct PathResult {
    /// Stable path name ("vector", "keyword", "entity", "raw", ...)
    pub path: &'static str,
    /// Fusion weight for this path
    pub weight: f32,
    /// Ids best-first; rank is positional (1-based)
    pub ranked_ids: Vec<String>,
}

/// A fused candidate with per-path provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub id: String,
    pub score: f32,
    /// Paths that surfaced this candidate
    pub paths: Vec<&'static str>,
}

/// Reciprocal rank fusion: for each candidate and each path where it
/// appears at 1-based rank `r`, the score gains `w / (k + r)`. The raw
/// path carries the highest weight so exact matches always survive.
#[must_use]
pub fn rrf_fuse(paths: &[PathResult], k: f32) -> Vec<FusedCandidate> {
    let mut scores: HashMap<&str, (f32, Vec<&'static str>)> = HashMap::new();
    for path in paths {
        for (rank0, id) in path.ranked_ids.iter().enumerate() {
            let contribution = path.weight / (k + (rank0 + 1) as f32);
            let entry = scores.entry(id.as_str()).or_insert_with(|| (0.0, Vec::new()));
            entry.0 += contribution;
            if !entry.1.contains(&path.path) {
                entry.1.push(path.path);
            }
        }
    }
    let mut fused: Vec<FusedCandidate> = scores
        .into_iter()
        .map(|(id, (score, mut paths))| {
            // Deterministic regardless of path arrival order.
            paths.sort_unstable();
            FusedCandidate {
                id: id.to_string(),
                score,
                paths,
            }
        })
        .collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    fused
}
