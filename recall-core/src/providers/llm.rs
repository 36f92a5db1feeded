//! LLM provider contract and concrete adapters.
//!
//! The engine talks to exactly one narrow interface: `chat` over a message
//! list with token/temperature/stop controls, returning content plus usage.
//! System messages are translated into each provider's native convention.

use crate::config::ProviderEndpoint;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Message role in a chat exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Request controls.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub max_tokens: usize,
    pub temperature: f32,
    pub stop: Vec<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.0,
            stop: Vec::new(),
        }
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub usage: ChatUsage,
}

/// The narrow LLM interface the engine consumes.
pub trait ChatProvider: Send + Sync {
    /// Blocking chat call with timeout handled by the adapter.
    fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse>;

    /// Model identifier used for requests.
    fn model_name(&self) -> &str;
}

/// Build a provider from the configured endpoint, auto-detected from the
/// base URL. `None` when no endpoint is configured or remote providers are
/// compiled out — callers degrade to rules-only behavior.
#[must_use]
pub fn chat_provider_from(endpoint: &ProviderEndpoint) -> Option<Box<dyn ChatProvider>> {
    #[cfg(feature = "providers")]
    {
        let base_url = endpoint.base_url.clone()?;
        let model = endpoint.model.clone().unwrap_or_default();
        let api_key = endpoint.api_key.clone().unwrap_or_default();
        let provider: Box<dyn ChatProvider> = match super::detect_provider(&base_url) {
            super::ProviderKind::Anthropic => {
                Box::new(remote::AnthropicChat::new(base_url, model, api_key))
            }
            super::ProviderKind::Google => {
                Box::new(remote::GoogleChat::new(base_url, model, api_key))
            }
            _ => Box::new(remote::OpenAiCompatibleChat::new(base_url, model, api_key)),
        };
        Some(provider)
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
    use serde_json::{json, Value};

    fn http_client() -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(defaults::PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| Error::ProviderUnavailable(format!("http client: {e}")))
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> Error {
        if status.as_u16() == 429 {
            Error::ResourceExhausted(format!("rate limited: {body}"))
        } else if status.is_server_error() {
            Error::ProviderUnavailable(format!("server error {status}: {body}"))
        } else {
            Error::InvalidArgument(format!("provider rejected request {status}: {body}"))
        }
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
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        response
            .json()
            .map_err(|e| Error::ProviderUnavailable(format!("{url}: bad response body: {e}")))
    }

    /// OpenAI-compatible `/chat/completions` — the default wire format.
    pub struct OpenAiCompatibleChat {
        base_url: String,
        model: String,
        api_key: String,
        client: reqwest::blocking::Client,
    }

    impl OpenAiCompatibleChat {
        pub fn new(base_url: String, model: String, api_key: String) -> Self {
            Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                model,
                api_key,
                client: http_client().unwrap_or_default(),
            }
        }
    }

    impl ChatProvider for OpenAiCompatibleChat {
        fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse> {
            let body = json!({
                "model": self.model,
                "messages": messages,
                "max_tokens": options.max_tokens,
                "temperature": options.temperature,
                "stop": if options.stop.is_empty() { Value::Null } else { json!(options.stop) },
            });
            let url = format!("{}/chat/completions", self.base_url);
            let headers = [("Authorization", format!("Bearer {}", self.api_key))];
            let value = with_backoff("chat", || post_json(&self.client, &url, &headers, &body))?;
            let content = value["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            Ok(ChatResponse {
                content,
                usage: ChatUsage {
                    prompt_tokens: value["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as usize,
                    completion_tokens: value["usage"]["completion_tokens"].as_u64().unwrap_or(0)
                        as usize,
                },
            })
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }

    /// Anthropic messages API. System messages move to the top-level
    /// `system` field per that provider's convention.
    pub struct AnthropicChat {
        base_url: String,
        model: String,
        api_key: String,
        client: reqwest::blocking::Client,
    }

    impl AnthropicChat {
        pub fn new(base_url: String, model: String, api_key: String) -> Self {
            Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                model,
                api_key,
                client: http_client().unwrap_or_default(),
            }
        }
    }

    impl ChatProvider for AnthropicChat {
        fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse> {
            let system: Vec<&str> = messages
                .iter()
                .filter(|m| m.role == ChatRole::System)
                .map(|m| m.content.as_str())
                .collect();
            let turns: Vec<Value> = messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .map(|m| {
                    json!({
                        "role": if m.role == ChatRole::Assistant { "assistant" } else { "user" },
                        "content": m.content,
                    })
                })
                .collect();
            let mut body = json!({
                "model": self.model,
                "max_tokens": options.max_tokens,
                "temperature": options.temperature,
                "messages": turns,
            });
            if !system.is_empty() {
                body["system"] = json!(system.join("\n\n"));
            }
            if !options.stop.is_empty() {
                body["stop_sequences"] = json!(options.stop);
            }
            let url = format!("{}/v1/messages", self.base_url);
            let headers = [
                ("x-api-key", self.api_key.clone()),
                ("anthropic-version", "2023-06-01".to_string()),
            ];
            let value = with_backoff("chat", || post_json(&self.client, &url, &headers, &body))?;
            let content = value["content"][0]["text"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            Ok(ChatResponse {
                content,
                usage: ChatUsage {
                    prompt_tokens: value["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
                    completion_tokens: value["usage"]["output_tokens"].as_u64().unwrap_or(0)
                        as usize,
                },
            })
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }

    /// Google generateContent API. System messages become the
    /// `systemInstruction` block.
    pub struct GoogleChat {
        base_url: String,
        model: String,
        api_key: String,
        client: reqwest::blocking::Client,
    }

    impl GoogleChat {
        pub fn new(base_url: String, model: String, api_key: String) -> Self {
            Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                model,
                api_key,
                client: http_client().unwrap_or_default(),
            }
        }
    }

    impl ChatProvider for GoogleChat {
        fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse> {
            let system: Vec<&str> = messages
                .iter()
                .filter(|m| m.role == ChatRole::System)
                .map(|m| m.content.as_str())
                .collect();
            let contents: Vec<Value> = messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .map(|m| {
                    json!({
                        "role": if m.role == ChatRole::Assistant { "model" } else { "user" },
                        "parts": [{"text": m.content}],
                    })
                })
                .collect();
            let mut body = json!({
                "contents": contents,
                "generationConfig": {
                    "maxOutputTokens": options.max_tokens,
                    "temperature": options.temperature,
                },
            });
            if !system.is_empty() {
                body["systemInstruction"] = json!({"parts": [{"text": system.join("\n\n")}]});
            }
            if !options.stop.is_empty() {
                body["generationConfig"]["stopSequences"] = json!(options.stop);
            }
            let url = format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                self.base_url, self.model, self.api_key
            );
            let value = with_backoff("chat", || post_json(&self.client, &url, &[], &body))?;
            let content = value["candidates"][0]["content"]["parts"][0]["text"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            Ok(ChatResponse {
                content,
                usage: ChatUsage {
                    prompt_tokens: value["usageMetadata"]["promptTokenCount"]
                        .as_u64()
                        .unwrap_or(0) as usize,
                    completion_tokens: value["usageMetadata"]["candidatesTokenCount"]
                        .as_u64()
                        .unwrap_or(0) as usize,
                },
            })
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
    fn unconfigured_endpoint_yields_no_provider() {
        assert!(chat_provider_from(&ProviderEndpoint::default()).is_none());
    }

    #[test]
    fn chat_messages_serialize_with_lowercase_roles() {
        let message = ChatMessage::system("be brief");
        let json = serde_json::to_string(&message).expect("serialize");
        assert_eq!(json, r#"{"role":"system","content":"be brief"}"#);
    }
}
