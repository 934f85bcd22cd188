//! Providers for OpenAI-compatible HTTP APIs.
//!
//! This module is only available when the `openai` feature is enabled.
//!
//! [`OpenAIEmbeddingProvider`] calls `/v1/embeddings`; [`OpenAIChatProvider`]
//! calls `/chat/completions` with or without server-sent-event streaming.
//! Both accept a base URL so any compatible endpoint (DeepSeek, a local
//! gateway) can be used. Failures are classified by HTTP status: 429 is
//! [`RateLimited`](crate::ErrorKind::RateLimited), 408 and 5xx plus
//! connection failures are transient, everything else is fatal.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, GenerationRequest};
use crate::http::{decode_error, request_error, status_error};
use crate::retry::FragmentStream;

/// The default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The DeepSeek API base URL.
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default DeepSeek chat model.
const DEEPSEEK_CHAT_MODEL: &str = "deepseek-chat";

const EMBEDDING_PROVIDER: &str = "OpenAI";

fn require_key(provider: &str, api_key: String) -> Result<String> {
    if api_key.trim().is_empty() {
        return Err(RagError::Config(format!("{provider} API key must not be empty")));
    }
    Ok(api_key)
}

fn key_from_env(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| RagError::Config(format!("{var} environment variable not set")))
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Uses `reqwest` to call the `/v1/embeddings` endpoint directly.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `base_url` – defaults to `https://api.openai.com/v1`.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use analyst_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: require_key(EMBEDDING_PROVIDER, api_key.into())?,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(key_from_env("OPENAI_API_KEY")?)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the provider at another OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChunkChoice>,
}

#[derive(Deserialize)]
struct ChatChunkChoice {
    #[serde(default)]
    delta: ChatContent,
}

#[derive(Deserialize, Default)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = EMBEDDING_PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| decode_error(EMBEDDING_PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = EMBEDDING_PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| request_error(EMBEDDING_PROVIDER, &e))?;

        if !response.status().is_success() {
            return Err(status_error(EMBEDDING_PROVIDER, response).await);
        }

        let mut embedding_response: EmbeddingResponse =
            response.json().await.map_err(|e| decode_error(EMBEDDING_PROVIDER, e))?;

        embedding_response.data.sort_by_key(|d| d.index);
        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        EMBEDDING_PROVIDER
    }
}

/// A [`GenerationProvider`] for OpenAI-compatible chat completion APIs.
///
/// # Example
///
/// ```rust,ignore
/// use analyst_rag::openai::OpenAIChatProvider;
///
/// let provider = OpenAIChatProvider::deepseek_from_env()?;
/// let answer = provider.generate(&GenerationRequest::new("Summarize...")).await?;
/// ```
pub struct OpenAIChatProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    name: String,
}

impl OpenAIChatProvider {
    /// Create a provider for `model` at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the key is empty.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let model = model.into();
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: require_key(&model, api_key.into())?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            name: model.clone(),
            model,
        })
    }

    /// The DeepSeek chat model.
    pub fn deepseek(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::new(api_key, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT_MODEL)?.with_name("DeepSeek"))
    }

    /// The DeepSeek chat model keyed by `DEEPSEEK_API_KEY`.
    pub fn deepseek_from_env() -> Result<Self> {
        Self::deepseek(key_from_env("DEEPSEEK_API_KEY")?)
    }

    /// Set the name reported in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    async fn send(&self, request: &GenerationRequest, stream: bool) -> Result<reqwest::Response> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: &request.system_prompt },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            stream,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(&self.name, &e))?;

        if !response.status().is_success() {
            return Err(status_error(&self.name, response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationProvider for OpenAIChatProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        debug!(provider = %self.name, prompt_len = request.prompt.len(), "chat completion");
        let response = self.send(request, false).await?;
        let chat: ChatResponse = response.json().await.map_err(|e| decode_error(&self.name, e))?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| decode_error(&self.name, "response has no message content"))
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<FragmentStream<String>> {
        debug!(
            provider = %self.name,
            prompt_len = request.prompt.len(),
            "streaming chat completion"
        );
        let response = self.send(request, true).await?;
        Ok(sse_fragments(self.name.clone(), response))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// One parsed server-sent-event line.
#[derive(Debug, PartialEq)]
enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> std::result::Result<SseLine, serde_json::Error> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    let chunk: ChatChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map_or(SseLine::Skip, SseLine::Fragment))
}

fn sse_fragments(provider: String, response: reqwest::Response) -> FragmentStream<String> {
    Box::pin(async_stream::stream! {
        let mut bytes = Box::pin(response.bytes_stream());
        let mut buffer: Vec<u8> = Vec::new();
        'read: while let Some(next) = bytes.next().await {
            let next = match next {
                Ok(next) => next,
                Err(e) => {
                    yield Err(request_error(&provider, &e));
                    break 'read;
                }
            };
            buffer.extend_from_slice(&next);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    Ok(SseLine::Fragment(text)) => yield Ok(text),
                    Ok(SseLine::Skip) => {}
                    Ok(SseLine::Done) => break 'read,
                    Err(e) => {
                        yield Err(decode_error(&provider, e));
                        break 'read;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sse_lines() {
        let line = r#"data: {"choices":[{"delta":{"content":"市场"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseLine::Fragment("市场".into()));
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseLine::Skip
        );
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[test]
    fn rejects_empty_key() {
        assert!(matches!(OpenAIEmbeddingProvider::new(""), Err(RagError::Config(_))));
        assert!(matches!(OpenAIChatProvider::deepseek(" "), Err(RagError::Config(_))));
    }

    #[test]
    fn base_url_is_normalized() {
        let provider = OpenAIEmbeddingProvider::new("sk-test")
            .unwrap()
            .with_base_url("http://localhost:8080/v1/")
            .with_dimensions(256);
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
        assert_eq!(provider.dimensions(), 256);
    }
}
