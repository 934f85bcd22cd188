//! The `Generator` front over a scripted generation provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use analyst_rag::error::{ErrorKind, RagError, Result};
use analyst_rag::generation::{
    DEFAULT_SYSTEM_PROMPT, GenerationProvider, GenerationRequest, Generator,
};
use analyst_rag::retry::{FragmentStream, RetryPolicy};
use async_trait::async_trait;
use futures::StreamExt;

/// Fails transiently `failures` times per operation, then answers.
struct FlakyProvider {
    failures: usize,
    generate_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl FlakyProvider {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            generate_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        })
    }
}

fn unavailable() -> RagError {
    RagError::from_http_status("flaky", 503, "overloaded")
}

#[async_trait]
impl GenerationProvider for FlakyProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        if self.generate_calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(unavailable());
        }
        Ok(format!("report on: {}", request.prompt))
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<FragmentStream<String>> {
        if self.stream_calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(unavailable());
        }
        let words: Vec<Result<String>> =
            request.prompt.split(' ').map(|w| Ok(w.to_string())).collect();
        Ok(Box::pin(futures::stream::iter(words)))
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[test]
fn request_defaults() {
    let request = GenerationRequest::new("robots").with_temperature(0.3);
    assert_eq!(request.system_prompt, DEFAULT_SYSTEM_PROMPT);
    assert_eq!(request.temperature, Some(0.3));
}

#[tokio::test(start_paused = true)]
async fn generate_retries_transient_failures() {
    let provider = FlakyProvider::new(2);
    let generator = Generator::new(provider.clone(), RetryPolicy::new(3, Duration::from_secs(1)));

    let text = generator.generate(&GenerationRequest::new("robots")).await.unwrap();

    assert_eq!(text, "report on: robots");
    assert_eq!(provider.generate_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn generate_gives_up_after_max_attempts() {
    let provider = FlakyProvider::new(10);
    let generator = Generator::new(provider.clone(), RetryPolicy::new(2, Duration::from_secs(1)));

    let err = generator.generate(&GenerationRequest::new("robots")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransientNetwork);
    assert_eq!(provider.generate_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn stream_is_reopened_until_it_starts() {
    let provider = FlakyProvider::new(1);
    let generator = Generator::new(provider.clone(), RetryPolicy::new(3, Duration::from_secs(1)));

    let fragments: Vec<String> = generator
        .generate_stream(GenerationRequest::new("market size outlook"))
        .map(|fragment| fragment.unwrap())
        .collect()
        .await;

    assert_eq!(fragments, ["market", "size", "outlook"]);
    assert_eq!(provider.stream_calls.load(Ordering::SeqCst), 2);
}
