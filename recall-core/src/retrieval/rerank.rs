//! Rerank stage: builtin signal scorer, pluggable external backend.
//!
//! The builtin scorer weights the fused score with keyword and entity match
//! bonuses. It is the same code in the default pipeline and in the layered
//! configuration, so selecting the builtin backend changes nothing about
//! the output.

use super::fusion::FusedCandidate;
use crate::providers::RerankProvider;
use tracing::warn;

/// Per-candidate signals the builtin scorer needs.
#[derive(Debug, Clone)]
pub struct CandidateSignals {
    pub candidate: FusedCandidate,
    /// Record content, for the external backend
    pub content: String,
    /// Query keywords present in the record's keyword list
    pub keyword_matches: usize,
    /// Query entities present in the record's entity list
    pub entity_matches: usize,
}

const KEYWORD_BONUS: f32 = 0.002;
const ENTITY_BONUS: f32 = 0.004;

/// Builtin rescoring: fused score plus flat per-match bonuses. Order is
/// re-sorted; candidates the fusion stage loved keep their advantage.
#[must_use]
pub fn builtin_rescore(mut candidates: Vec<CandidateSignals>) -> Vec<FusedCandidate> {
    for signals in &mut candidates {
        signals.candidate.score += KEYWORD_BONUS * signals.keyword_matches as f32
            + ENTITY_BONUS * signals.entity_matches as f32;
    }
    let mut rescored: Vec<FusedCandidate> =
        candidates.into_iter().map(|s| s.candidate).collect();
    rescored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    rescored
}

/// External rerank over the candidate contents. Provider failure degrades
/// to the builtin scorer — reranking never fails a query.
#[must_use]
pub fn remote_rescore(
    provider: &dyn RerankProvider,
    query: &str,
    candidates: Vec<CandidateSignals>,
    top_k: usize,
) -> Vec<FusedCandidate> {
    let documents: Vec<String> = candidates.iter().map(|s| s.content.clone()).collect();
    match provider.rerank(query, &documents, top_k) {
        Ok(ranking) => {
            let mut rescored: Vec<FusedCandidate> = ranking
                .into_iter()
                .filter_map(|(index, score)| {
                    candidates.get(index).map(|signals| {
                        let mut candidate = signals.candidate.clone();
                        candidate.score = score;
                        candidate
                    })
                })
                .collect();
            rescored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            rescored
        }
        Err(e) => {
            warn!(error = %e, "remote rerank unavailable, using builtin scorer");
            builtin_rescore(candidates)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(id: &str, score: f32, keywords: usize, entities: usize) -> CandidateSignals {
        CandidateSignals {
            candidate: FusedCandidate {
                id: id.to_string(),
                score,
                paths: vec!["keyword"],
            },
            content: format!("content of {id}"),
            keyword_matches: keywords,
            entity_matches: entities,
        }
    }

    #[test]
    fn bonuses_break_near_ties() {
        let rescored = builtin_rescore(vec![
            signals("plain", 0.0160, 0, 0),
            signals("matched", 0.0158, 2, 1),
        ]);
        assert_eq!(rescored[0].id, "matched");
    }

    #[test]
    fn large_fusion_gaps_survive_bonuses() {
        let rescored = builtin_rescore(vec![
            signals("strong", 0.050, 0, 0),
            signals("weak", 0.010, 3, 3),
        ]);
        assert_eq!(rescored[0].id, "strong");
    }

    #[test]
    fn failing_remote_backend_degrades_to_builtin() {
        struct Down;
        impl RerankProvider for Down {
            fn rerank(
                &self,
                _: &str,
                _: &[String],
                _: usize,
            ) -> crate::Result<Vec<(usize, f32)>> {
                Err(crate::Error::ProviderUnavailable("down".to_string()))
            }
        }
        let rescored = remote_rescore(&Down, "q", vec![signals("a", 0.5, 0, 0)], 5);
        assert_eq!(rescored.len(), 1);
        assert_eq!(rescored[0].id, "a");
    }

    #[test]
    fn remote_scores_replace_fused_scores() {
        struct Reversed;
        impl RerankProvider for Reversed {
            fn rerank(
                &self,
                _: &str,
                documents: &[String],
                _: usize,
            ) -> crate::Result<Vec<(usize, f32)>> {
                Ok((0..documents.len())
                    .map(|i| (i, i as f32))
                    .collect())
            }
        }
        let rescored = remote_rescore(
            &Reversed,
            "q",
            vec![signals("first", 0.9, 0, 0), signals("second", 0.1, 0, 0)],
            5,
        );
        assert_eq!(rescored[0].id, "second");
    }
}
