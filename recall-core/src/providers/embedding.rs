//! Embedding provider contract and concrete adapters.
//!
//! Every backend returns unit-norm vectors so inner product equals cosine.
//! The dimension is fixed for the life of a vector index; a model's
//! dimension comes from the builtin table unless the caller overrides it.

use crate::config::ProviderEndpoint;
use crate::error::Result;
use crate::index::normalize;
use lru::LruCache;
use parking_lot::Mutex;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::num::NonZeroUsize;

/// Known model name → vector dimension.
pub const MODEL_DIMENSIONS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
    ("text-embedding-004", 768),
    ("embedding-001", 768),
    ("gemini-embedding-001", 3072),
    ("voyage-3", 1024),
    ("voyage-3-lite", 512),
    ("voyage-code-3", 1024),
    ("embed-english-v3.0", 1024),
    ("embed-multilingual-v3.0", 1024),
];

/// Dimension for a known model name.
#[must_use]
pub fn dimension_for_model(model: &str) -> Option<usize> {
    MODEL_DIMENSIONS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, dimension)| *dimension)
}

/// The narrow embedding interface the engine consumes.
pub trait EmbeddingBackend: Send + Sync {
    /// Encode one text to a unit-norm vector.
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Batched encode; default loops over `encode`.
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }

    /// Output dimension, fixed for the backend's lifetime.
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Deterministic offline embedder: hashed token buckets, unit-normalized.
///
/// Not semantically meaningful, but stable across runs, which keeps the
/// vector path and dedup stage 2 exercised with no network access.
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingBackend for HashEmbedding {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hash-bucket"
    }
}

/// Caching wrapper around a backend: repeated query embeddings hit an LRU.
pub struct EmbeddingService {
    backend: Box<dyn EmbeddingBackend>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingService {
    #[must_use]
    pub fn new(backend: Box<dyn EmbeddingBackend>) -> Self {
        let capacity = NonZeroUsize::new(256).expect("nonzero cache capacity");
        Self {
            backend,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.lock().get(text) {
            return Ok(cached.clone());
        }
        let vector = self.backend.encode(text)?;
        self.cache.lock().put(text.to_string(), vector.clone());
        Ok(vector)
    }

    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.backend.encode_batch(texts)
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }
}

/// Build a backend from the configured endpoint.
///
/// Remote backends are auto-detected from the base URL; with no endpoint
/// (or with remote providers compiled out) the deterministic hash embedder
/// keeps the engine fully local. `dimension_override` beats the model
/// table; the final fallback dimension is 384.
#[must_use]
pub fn embedding_backend_from(
    endpoint: &ProviderEndpoint,
    dimension_override: Option<usize>,
) -> Box<dyn EmbeddingBackend> {
    let model = endpoint.model.clone().unwrap_or_default();
    let dimension = dimension_override
        .or_else(|| dimension_for_model(&model))
        .unwrap_or(384);

    #[cfg(feature = "providers")]
    if let Some(base_url) = endpoint.base_url.clone() {
        let api_key = endpoint.api_key.clone().unwrap_or_default();
        return match super::detect_provider(&base_url) {
            super::ProviderKind::Google => {
                Box::new(remote::GoogleEmbedding::new(base_url, model, api_key, dimension))
            }
            super::ProviderKind::Voyage => {
                Box::new(remote::VoyageEmbedding::new(base_url, model, api_key, dimension))
            }
            super::ProviderKind::Cohere => {
                Box::new(remote::CohereEmbedding::new(base_url, model, api_key, dimension))
            }
            _ => Box::new(remote::OpenAiCompatibleEmbedding::new(
                base_url, model, api_key, dimension,
            )),
        };
    }

    Box::new(HashEmbedding::new(dimension))
}

#[cfg(feature = "providers")]
mod remote {
    use super::*;
    use crate::constants::defaults;
    use crate::error::Error;
    use crate::providers::with_backoff;
    use serde_json::{json, Value};

    fn http_client() -> reqwest::blocking::Client {
        reqwest::blocking::Client::builder()
            .timeout(defaults::PROVIDER_TIMEOUT)
            .build()
            .unwrap_or_default()
    }

    fn post_json(
        client: &reqwest::blocking::Client,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<Value> {
        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        let response = request
            .send()
            .map_err(|e| Error::ProviderUnavailable(format!("{url}: {e}")))?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::ResourceExhausted("embedding rate limited".to_string()));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::ProviderUnavailable(format!("{url}: {status}: {body}")));
        }
        response
            .json()
            .map_err(|e| Error::ProviderUnavailable(format!("{url}: bad response body: {e}")))
    }

    fn parse_vectors(values: Vec<Value>, dimension: usize) -> Result<Vec<Vec<f32>>> {
        values
            .into_iter()
            .map(|value| {
                let mut vector: Vec<f32> = value
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .filter_map(|v| v.as_f64())
                            .map(|v| v as f32)
                            .collect()
                    })
                    .unwrap_or_default();
                if vector.len() != dimension {
                    return Err(Error::DimensionMismatch {
                        expected: dimension,
                        actual: vector.len(),
                    });
                }
                normalize(&mut vector);
                Ok(vector)
            })
            .collect()
    }

    macro_rules! embedding_adapter {
        ($name:ident) => {
            pub struct $name {
                base_url: String,
                model: String,
                api_key: String,
                dimension: usize,
                client: reqwest::blocking::Client,
            }

            impl $name {
                pub fn new(
                    base_url: String,
                    model: String,
                    api_key: String,
                    dimension: usize,
                ) -> Self {
                    Self {
                        base_url: base_url.trim_end_matches('/').to_string(),
                        model,
                        api_key,
                        dimension,
                        client: http_client(),
                    }
                }
            }
        };
    }

    embedding_adapter!(OpenAiCompatibleEmbedding);

    impl EmbeddingBackend for OpenAiCompatibleEmbedding {
        fn encode(&self, text: &str) -> Result<Vec<f32>> {
            self.encode_batch(&[text.to_string()])?
                .into_iter()
                .next()
                .ok_or_else(|| Error::ProviderUnavailable("empty embedding response".to_string()))
        }

        fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let url = format!("{}/embeddings", self.base_url);
            let body = json!({"model": self.model, "input": texts});
            let headers = [("Authorization", format!("Bearer {}", self.api_key))];
            let value = with_backoff("embed", || post_json(&self.client, &url, &headers, &body))?;
            let raw: Vec<Value> = value["data"]
                .as_array()
                .map(|a| a.iter().map(|d| d["embedding"].clone()).collect())
                .unwrap_or_default();
            parse_vectors(raw, self.dimension)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }

    embedding_adapter!(GoogleEmbedding);

    impl EmbeddingBackend for GoogleEmbedding {
        fn encode(&self, text: &str) -> Result<Vec<f32>> {
            let url = format!(
                "{}/v1beta/models/{}:embedContent?key={}",
                self.base_url, self.model, self.api_key
            );
            let body = json!({"content": {"parts": [{"text": text}]}});
            let value = with_backoff("embed", || post_json(&self.client, &url, &[], &body))?;
            let raw = vec![value["embedding"]["values"].clone()];
            parse_vectors(raw, self.dimension)?
                .into_iter()
                .next()
                .ok_or_else(|| Error::ProviderUnavailable("empty embedding response".to_string()))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }

    embedding_adapter!(VoyageEmbedding);

    impl EmbeddingBackend for VoyageEmbedding {
        fn encode(&self, text: &str) -> Result<Vec<f32>> {
            self.encode_batch(&[text.to_string()])?
                .into_iter()
                .next()
                .ok_or_else(|| Error::ProviderUnavailable("empty embedding response".to_string()))
        }

        fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let url = format!("{}/v1/embeddings", self.base_url);
            let body = json!({"model": self.model, "input": texts});
            let headers = [("Authorization", format!("Bearer {}", self.api_key))];
            let value = with_backoff("embed", || post_json(&self.client, &url, &headers, &body))?;
            let raw: Vec<Value> = value["data"]
                .as_array()
                .map(|a| a.iter().map(|d| d["embedding"].clone()).collect())
                .unwrap_or_default();
            parse_vectors(raw, self.dimension)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }

    embedding_adapter!(CohereEmbedding);

    impl EmbeddingBackend for CohereEmbedding {
        fn encode(&self, text: &str) -> Result<Vec<f32>> {
            self.encode_batch(&[text.to_string()])?
                .into_iter()
                .next()
                .ok_or_else(|| Error::ProviderUnavailable("empty embedding response".to_string()))
        }

        fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let url = format!("{}/v1/embed", self.base_url);
            let body = json!({
                "model": self.model,
                "texts": texts,
                "input_type": "search_document",
            });
            let headers = [("Authorization", format!("Bearer {}", self.api_key))];
            let value = with_backoff("embed", || post_json(&self.client, &url, &headers, &body))?;
            let raw: Vec<Value> = value["embeddings"].as_array().cloned().unwrap_or_default();
            parse_vectors(raw, self.dimension)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedding_is_deterministic_and_unit_norm() {
        let backend = HashEmbedding::new(64);
        let a = backend.encode("the capital of france").expect("encode");
        let b = backend.encode("the capital of france").expect("encode");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn similar_texts_are_closer_than_unrelated() {
        let backend = HashEmbedding::new(128);
        let a = backend.encode("paris is the capital of france").expect("encode");
        let b = backend.encode("paris, france's capital").expect("encode");
        let c = backend.encode("gradient descent optimizer settings").expect("encode");
        let sim = |x: &[f32], y: &[f32]| crate::index::dot(x, y);
        assert!(sim(&a, &b) > sim(&a, &c));
    }

    #[test]
    fn dimension_table_lookup() {
        assert_eq!(dimension_for_model("text-embedding-3-small"), Some(1536));
        assert_eq!(dimension_for_model("voyage-3-lite"), Some(512));
        assert_eq!(dimension_for_model("unknown-model"), None);
    }

    #[test]
    fn unconfigured_endpoint_falls_back_to_hash() {
        let backend = embedding_backend_from(&ProviderEndpoint::default(), None);
        assert_eq!(backend.model_name(), "hash-bucket");
        assert_eq!(backend.dimension(), 384);
    }

    #[test]
    fn service_caches_repeat_queries() {
        let service = EmbeddingService::new(Box::new(HashEmbedding::new(32)));
        let first = service.encode("query").expect("encode");
        let second = service.encode("query").expect("encode");
        assert_eq!(first, second);
    }
}
