//! Rerank provider contract and the remote-API adapter.
//!
//! The builtin scorer lives with the retrieval funnel; this module covers
//! the optional external backend selected by `RECALL_RERANK_BACKEND=remote`.

use crate::config::ProviderEndpoint;
use crate::error::Result;

/// The rerank interface: scores a document list against a query and
/// returns `(original index, score)` pairs, best first.
pub trait RerankProvider: Send + Sync {
    fn rerank(&self, query: &str, documents: &[String], top_k: usize)
        -> Result<Vec<(usize, f32)>>;
}

/// Build a remote rerank provider from the configured endpoint, or `None`
/// when unconfigured / compiled out — retrieval then uses the builtin
/// scorer.
#[must_use]
pub fn rerank_provider_from(endpoint: &ProviderEndpoint) -> Option<Box<dyn RerankProvider>> {
    #[cfg(feature = "providers")]
    {
        let base_url = endpoint.base_url.clone()?;
        let model = endpoint.model.clone().unwrap_or_default();
        let api_key = endpoint.api_key.clone().unwrap_or_default();
        Some(Box::new(remote::RemoteReranker::new(base_url, model, api_key)))
    }
    #[cfg(not(feature = "providers"))]
    {
        let _ = endpoint;
        None
    }
}

#[cfg(feature = "providers")]
mod remote {
    use super::*;
    use crate::constants::defaults;
    use crate::error::Error;
    use crate::providers::with_backoff;
    use serde_json::json;

    /// Cohere-style `/rerank` wire format, which OpenAI-compatible rerank
    /// deployments also speak.
    pub struct RemoteReranker {
        base_url: String,
        model: String,
        api_key: String,
        client: reqwest::blocking::Client,
    }

    impl RemoteReranker {
        pub fn new(base_url: String, model: String, api_key: String) -> Self {
            Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                model,
                api_key,
                client: reqwest::blocking::Client::builder()
                    .timeout(defaults::PROVIDER_TIMEOUT)
                    .build()
                    .unwrap_or_default(),
            }
        }
    }

    impl RerankProvider for RemoteReranker {
        fn rerank(
            &self,
            query: &str,
            documents: &[String],
            top_k: usize,
        ) -> Result<Vec<(usize, f32)>> {
            let url = format!("{}/v1/rerank", self.base_url);
            let body = json!({
                "model": self.model,
                "query": query,
                "documents": documents,
                "top_n": top_k,
            });
            let value = with_backoff("rerank", || {
                let response = self
                    .client
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&body)
                    .send()
                    .map_err(|e| Error::ProviderUnavailable(format!("{url}: {e}")))?;
                let status = response.status();
                if status.as_u16() == 429 {
                    return Err(Error::ResourceExhausted("rerank rate limited".to_string()));
                }
                if !status.is_success() {
                    return Err(Error::ProviderUnavailable(format!("{url}: {status}")));
                }
                response
                    .json::<serde_json::Value>()
                    .map_err(|e| Error::ProviderUnavailable(format!("{url}: {e}")))
            })?;
            let results = value["results"]
                .as_array()
                .map(|results| {
                    results
                        .iter()
                        .filter_map(|r| {
                            let index = r["index"].as_u64()? as usize;
                            let score = r["relevance_score"].as_f64()? as f32;
                            Some((index, score))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(results)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_endpoint_yields_no_provider() {
        assert!(rerank_provider_from(&ProviderEndpoint::default()).is_none());
    }
}
