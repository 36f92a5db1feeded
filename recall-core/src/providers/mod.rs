//! Provider-neutral adapters for external LLM, embedding, and rerank
//! services.
//!
//! The engine consumes narrow traits; concrete implementations are chosen
//! once, at construction, by inspecting the configured base URL. No extra
//! configuration key selects a provider. When the `providers` feature is
//! off, or nothing is configured, the factories return local fallbacks
//! (deterministic hash embeddings, no LLM, builtin rerank) so the engine
//! stays fully operational offline.

pub mod embedding;
pub mod llm;
pub mod rerank;

pub use embedding::{embedding_backend_from, EmbeddingBackend, EmbeddingService, HashEmbedding};
pub use llm::{chat_provider_from, ChatMessage, ChatOptions, ChatProvider, ChatResponse, ChatRole, ChatUsage};
pub use rerank::{rerank_provider_from, RerankProvider};

/// Provider family inferred from a base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    Google,
    Voyage,
    Cohere,
    OpenAiCompatible,
}

/// URL-substring detection rule table.
#[must_use]
pub fn detect_provider(base_url: &str) -> ProviderKind {
    let url = base_url.to_lowercase();
    if url.contains("anthropic.com") {
        ProviderKind::Anthropic
    } else if url.contains("googleapis.com") || url.contains("generativelanguage") {
        ProviderKind::Google
    } else if url.contains("voyageai") {
        ProviderKind::Voyage
    } else if url.contains("cohere") {
        ProviderKind::Cohere
    } else {
        ProviderKind::OpenAiCompatible
    }
}

/// Bounded exponential backoff with jitter around a blocking call.
///
/// Retries only recoverable failures (rate limits, transient transport
/// errors); after the attempts are exhausted the last error surfaces as
/// `ProviderUnavailable` / `ResourceExhausted` from the adapter.
#[cfg(feature = "providers")]
pub(crate) fn with_backoff<T>(
    operation_name: &str,
    mut call: impl FnMut() -> crate::Result<T>,
) -> crate::Result<T> {
    use crate::constants::defaults;
    use rand::Rng;

    let mut delay_ms = defaults::PROVIDER_RETRY_BASE_DELAY_MS;
    let mut last_err = None;
    for attempt in 0..=defaults::PROVIDER_MAX_RETRIES {
        match call() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_recoverable() && attempt < defaults::PROVIDER_MAX_RETRIES => {
                let jitter = rand::rng().random_range(0..=delay_ms / 2);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay_ms + jitter,
                    error = %e,
                    "provider call failed, backing off"
                );
                std::thread::sleep(std::time::Duration::from_millis(delay_ms + jitter));
                delay_ms = delay_ms.saturating_mul(2);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        crate::Error::ProviderUnavailable(format!("{operation_name}: retries exhausted"))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection_rule_table() {
        assert_eq!(
            detect_provider("https://api.anthropic.com"),
            ProviderKind::Anthropic
        );
        assert_eq!(
            detect_provider("https://generativelanguage.googleapis.com/v1beta"),
            ProviderKind::Google
        );
        assert_eq!(
            detect_provider("https://api.voyageai.com/v1"),
            ProviderKind::Voyage
        );
        assert_eq!(
            detect_provider("https://api.cohere.com/v1"),
            ProviderKind::Cohere
        );
        assert_eq!(
            detect_provider("https://api.openai.com/v1"),
            ProviderKind::OpenAiCompatible
        );
        assert_eq!(
            detect_provider("http://localhost:8080/v1"),
            ProviderKind::OpenAiCompatible
        );
    }
}
