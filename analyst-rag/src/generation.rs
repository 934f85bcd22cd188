//! Text generation provider interface and its resilient front.
//!
//! The retrieval core hands ranked passages to a generation step it does not
//! own. [`Generator`] is the one way to reach a [`GenerationProvider`]: plain
//! calls use [`RetryPolicy::call`], streaming calls use
//! [`RetryPolicy::call_stream`], so a stream is only retried before its first
//! fragment.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::retry::{FragmentStream, RetryPolicy};

/// System prompt used when the caller supplies none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional industry analyst.";

/// A single-turn generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// Role and behavior instructions for the model.
    pub system_prompt: String,
    /// The user prompt.
    pub prompt: String,
    /// Sampling temperature; provider default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    /// A request with the default system prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt: prompt.into(),
            temperature: None,
        }
    }

    /// Replace the system prompt.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A text generation backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate the complete response text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Open a stream of response fragments.
    ///
    /// Fragments are produced on demand as the consumer polls.
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<FragmentStream<String>>;

    /// A short name used in logs and errors.
    fn name(&self) -> &str;
}

/// A [`GenerationProvider`] behind a [`RetryPolicy`].
///
/// # Example
///
/// ```rust,ignore
/// use futures::StreamExt;
/// use analyst_rag::{GenerationRequest, Generator, RetryPolicy};
///
/// let generator = Generator::new(provider, RetryPolicy::default());
/// let mut fragments = generator.generate_stream(GenerationRequest::new(prompt));
/// while let Some(fragment) = fragments.next().await {
///     print!("{}", fragment?);
/// }
/// ```
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn GenerationProvider>,
    retry: RetryPolicy,
}

impl Generator {
    /// Create a generator for `provider` using `retry` for every call.
    pub fn new(provider: Arc<dyn GenerationProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    /// Generate a complete response, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Attempts`](crate::RagError::Attempts) wrapping the
    /// last provider failure.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let text = self.retry.call("generate", || self.provider.generate(request)).await?;
        info!(provider = self.provider.name(), response_len = text.len(), "generation completed");
        Ok(text)
    }

    /// Stream a response, retrying only until the first fragment arrives.
    pub fn generate_stream(&self, request: GenerationRequest) -> FragmentStream<String> {
        let provider = Arc::clone(&self.provider);
        let request = Arc::new(request);
        self.retry.call_stream("generate_stream", move || {
            let provider = Arc::clone(&provider);
            let request = Arc::clone(&request);
            async move { provider.generate_stream(&request).await }
        })
    }
}
