//! Yandex Foundation Models embedding and completion providers.
//!
//! This module is only available when the `yandex` feature is enabled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error};

use crate::completion::{Completion, CompletionOptions, CompletionProvider, Message, ResponseFormat};
use crate::document::Usage;
use crate::embedding::{Embedding, EmbeddingKind, EmbeddingProvider};
use crate::error::{RagError, Result};

/// The default Foundation Models API root.
pub const DEFAULT_BASE_URL: &str = "https://llm.api.cloud.yandex.net/foundationModels/v1";

/// The default document-side embedding model.
pub const DEFAULT_DOCUMENT_MODEL: &str = "text-search-doc";

/// The default query-side embedding model.
pub const DEFAULT_QUERY_MODEL: &str = "text-search-query";

/// The default generation model.
pub const DEFAULT_COMPLETION_MODEL: &str = "yandexgpt";

const PROVIDER: &str = "Yandex";

/// Connection settings shared by the Yandex providers.
#[derive(Debug, Clone)]
pub struct YandexConfig {
    /// Cloud folder that owns the models.
    pub folder_id: String,
    /// API key sent as `Authorization: Api-Key ...`.
    pub api_key: String,
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Model for passages.
    pub document_model: String,
    /// Model for questions.
    pub query_model: String,
    /// Model for answers.
    pub completion_model: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl YandexConfig {
    /// Create a config with default models and endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::AuthenticationError`] if either credential is empty.
    pub fn new(folder_id: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let folder_id = folder_id.into();
        let api_key = api_key.into();
        if folder_id.trim().is_empty() || api_key.trim().is_empty() {
            return Err(RagError::AuthenticationError {
                provider: PROVIDER.into(),
                message: "folder id and API key must not be empty".into(),
            });
        }
        Ok(Self {
            folder_id,
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            document_model: DEFAULT_DOCUMENT_MODEL.into(),
            query_model: DEFAULT_QUERY_MODEL.into(),
            completion_model: DEFAULT_COMPLETION_MODEL.into(),
            timeout: Duration::from_secs(60),
        })
    }

    /// Create a config from `YANDEX_FOLDER_ID` and `YANDEX_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::AuthenticationError`] if a variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name).map_err(|_| RagError::AuthenticationError {
                provider: PROVIDER.into(),
                message: format!("{name} environment variable not set"),
            })
        };
        Self::new(read("YANDEX_FOLDER_ID")?, read("YANDEX_API_KEY")?)
    }

    /// Override the API root (e.g. for a proxy or a test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the embedding models.
    pub fn with_embedding_models(
        mut self,
        document: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        self.document_model = document.into();
        self.query_model = query.into();
        self
    }

    /// Override the generation model.
    pub fn with_completion_model(mut self, model: impl Into<String>) -> Self {
        self.completion_model = model.into();
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn model_uri(&self, scheme: &str, model: &str) -> String {
        if model.contains("://") {
            model.to_string()
        } else {
            format!("{scheme}://{}/{model}/latest", self.folder_id)
        }
    }
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingRequest<'a> {
    model_uri: String,
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingResponse {
    embedding: Vec<f32>,
    #[serde(default, deserialize_with = "int64")]
    num_tokens: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    model_uri: String,
    completion_options: WireOptions,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    json_object: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireOptions {
    stream: bool,
    temperature: f32,
    max_tokens: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    result: CompletionResult,
}

#[derive(Deserialize)]
struct CompletionResult {
    alternatives: Vec<Alternative>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Alternative {
    message: AlternativeMessage,
}

#[derive(Deserialize)]
struct AlternativeMessage {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default, deserialize_with = "int64")]
    input_text_tokens: Option<u64>,
    #[serde(default, deserialize_with = "int64")]
    completion_tokens: Option<u64>,
    #[serde(default, deserialize_with = "int64")]
    total_tokens: Option<u64>,
}

impl From<WireUsage> for Usage {
    fn from(wire: WireUsage) -> Self {
        let prompt_tokens = wire.input_text_tokens.unwrap_or(0);
        let completion_tokens = wire.completion_tokens.unwrap_or(0);
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: wire.total_tokens.unwrap_or(prompt_tokens + completion_tokens),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorResponse {
    Nested { error: ErrorDetail },
    Flat(ErrorDetail),
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// The API encodes int64 fields as JSON strings.
fn int64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(u64),
        Text(String),
    }

    match Option::<Int64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Int64::Number(n)) => Ok(Some(n)),
        Some(Int64::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

// ── Shared HTTP client ─────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Service {
    Embedding,
    Completion,
}

impl Service {
    fn error(self, message: String) -> RagError {
        match self {
            Self::Embedding => RagError::EmbeddingError { provider: PROVIDER.into(), message },
            Self::Completion => RagError::CompletionError { provider: PROVIDER.into(), message },
        }
    }
}

#[derive(Clone)]
struct YandexClient {
    http: reqwest::Client,
    config: Arc<YandexConfig>,
}

impl YandexClient {
    fn new(config: YandexConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build().map_err(|e| {
            RagError::ConfigError(format!("failed to build HTTP client: {e}"))
        })?;
        Ok(Self { http, config: Arc::new(config) })
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        service: Service,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}/{path}", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Api-Key {}", self.config.api_key))
            .header("x-folder-id", &self.config.folder_id)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, %url, error = %e, "request failed");
                service.error(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(ErrorResponse::Nested { error }) | Ok(ErrorResponse::Flat(error)) => {
                    error.message
                }
                Err(_) => body,
            };
            error!(provider = PROVIDER, %status, %url, "API error");
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(RagError::AuthenticationError {
                    provider: PROVIDER.into(),
                    message: format!("API returned {status}: {detail}"),
                });
            }
            return Err(service.error(format!("API returned {status}: {detail}")));
        }

        response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            service.error(format!("failed to parse response: {e}"))
        })
    }
}

// ── Providers ──────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the `textEmbedding` endpoint.
///
/// Passages go to `document_model`, questions to `query_model`.
///
/// # Example
///
/// ```rust,ignore
/// use passage_rag::yandex::{YandexConfig, YandexEmbeddingProvider};
///
/// let provider = YandexEmbeddingProvider::new(YandexConfig::from_env()?)?;
/// ```
#[derive(Clone)]
pub struct YandexEmbeddingProvider {
    client: YandexClient,
}

impl YandexEmbeddingProvider {
    /// Create a provider from connection settings.
    pub fn new(config: YandexConfig) -> Result<Self> {
        Ok(Self { client: YandexClient::new(config)? })
    }
}

#[async_trait]
impl EmbeddingProvider for YandexEmbeddingProvider {
    async fn embed(&self, text: &str, kind: EmbeddingKind) -> Result<Embedding> {
        let model = self.model_name(kind);
        debug!(provider = PROVIDER, model, text_len = text.len(), "embedding text");

        let model_uri = self.client.config.model_uri("emb", model);
        let request = EmbeddingRequest { model_uri, text };
        let response: EmbeddingResponse =
            self.client.post(Service::Embedding, "textEmbedding", &request).await?;
        Ok(Embedding { vector: response.embedding, tokens: response.num_tokens })
    }

    fn model_name(&self, kind: EmbeddingKind) -> &str {
        match kind {
            EmbeddingKind::Document => &self.client.config.document_model,
            EmbeddingKind::Query => &self.client.config.query_model,
        }
    }
}

/// A [`CompletionProvider`] backed by the synchronous `completion` endpoint.
#[derive(Clone)]
pub struct YandexCompletionProvider {
    client: YandexClient,
}

impl YandexCompletionProvider {
    /// Create a provider from connection settings.
    pub fn new(config: YandexConfig) -> Result<Self> {
        Ok(Self { client: YandexClient::new(config)? })
    }
}

#[async_trait]
impl CompletionProvider for YandexCompletionProvider {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let model = self.model_name();
        debug!(
            provider = PROVIDER,
            model,
            message_count = messages.len(),
            temperature = options.temperature,
            max_tokens = options.max_tokens,
            "requesting completion"
        );

        let request = CompletionRequest {
            model_uri: self.client.config.model_uri("gpt", model),
            completion_options: WireOptions {
                stream: false,
                temperature: options.temperature,
                max_tokens: options.max_tokens.to_string(),
            },
            messages,
            json_object: options.response_format == ResponseFormat::Structured,
        };
        let response: CompletionResponse =
            self.client.post(Service::Completion, "completion", &request).await?;

        Ok(Completion {
            alternatives: response
                .result
                .alternatives
                .into_iter()
                .map(|alternative| alternative.message.text)
                .collect(),
            usage: response.result.usage.map(Usage::from),
        })
    }

    fn model_name(&self) -> &str {
        &self.client.config.completion_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_credentials() {
        assert!(matches!(YandexConfig::new("", "key"), Err(RagError::AuthenticationError { .. })));
    }

    #[test]
    fn builds_model_uris() {
        let config = YandexConfig::new("b1g", "key").unwrap();
        assert_eq!(config.model_uri("emb", "text-search-doc"), "emb://b1g/text-search-doc/latest");
        assert_eq!(config.model_uri("gpt", "gpt://other/custom/rc"), "gpt://other/custom/rc");
    }

    #[test]
    fn parses_string_encoded_usage() {
        let raw = r#"{
            "result": {
                "alternatives": [
                    { "message": { "role": "assistant", "text": "hi" }, "status": "ALTERNATIVE_STATUS_FINAL" }
                ],
                "usage": { "inputTextTokens": "12", "completionTokens": "3", "totalTokens": "15" },
                "modelVersion": "23.10.2024"
            }
        }"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        let usage = Usage::from(parsed.result.usage.unwrap());
        assert_eq!(usage, Usage { prompt_tokens: 12, completion_tokens: 3, total_tokens: 15 });
    }

    #[test]
    fn serializes_completion_request_in_api_shape() {
        let config = YandexConfig::new("b1g", "key").unwrap();
        let messages = [Message::user("question")];
        let request = CompletionRequest {
            model_uri: config.model_uri("gpt", "yandexgpt"),
            completion_options: WireOptions {
                stream: false,
                temperature: 0.3,
                max_tokens: "2000".into(),
            },
            messages: &messages,
            json_object: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["modelUri"], "gpt://b1g/yandexgpt/latest");
        assert_eq!(value["completionOptions"]["maxTokens"], "2000");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["text"], "question");
        assert!(value.get("jsonObject").is_none());
    }
}
