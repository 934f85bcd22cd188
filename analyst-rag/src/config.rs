//! Configuration for the retrieval core.
//!
//! The core never reads configuration from the environment; the
//! orchestration layer builds a [`RetrieverConfig`] and hands it over at
//! construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunking::ParagraphChunker;
use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// Configuration parameters for the two-stage retriever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Name of the vector store collection.
    pub collection_name: String,
    /// Number of candidates requested from vector search.
    pub recall_n: usize,
    /// Number of results kept after reranking.
    pub rerank_k: usize,
    /// Paragraphs shorter than this many characters are discarded.
    pub min_chunk_length: usize,
    /// Optional cap on chunk length in characters.
    pub max_chunk_length: Option<usize>,
    /// Total attempts for each provider call.
    pub max_attempts: u32,
    /// Wait after the first failed attempt, in milliseconds; doubles per retry.
    pub base_delay_ms: u64,
    /// Optional cap on a single backoff wait, in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// Optional deadline for a single attempt, in milliseconds.
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            collection_name: "industry_reports".to_string(),
            recall_n: 10,
            rerank_k: 3,
            min_chunk_length: 20,
            max_chunk_length: None,
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: None,
            attempt_timeout_ms: None,
        }
    }
}

impl RetrieverConfig {
    /// Create a new builder for constructing a [`RetrieverConfig`].
    pub fn builder() -> RetrieverConfigBuilder {
        RetrieverConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `collection_name` is empty
    /// - `recall_n == 0` or `rerank_k == 0`
    /// - `rerank_k > recall_n`
    /// - `max_attempts == 0`
    /// - `max_chunk_length <= min_chunk_length`
    pub fn validate(&self) -> Result<()> {
        if self.collection_name.trim().is_empty() {
            return Err(RagError::Config("collection_name must not be empty".to_string()));
        }
        if self.recall_n == 0 {
            return Err(RagError::Config("recall_n must be greater than zero".to_string()));
        }
        if self.rerank_k == 0 {
            return Err(RagError::Config("rerank_k must be greater than zero".to_string()));
        }
        if self.rerank_k > self.recall_n {
            return Err(RagError::Config(format!(
                "rerank_k ({}) must not exceed recall_n ({})",
                self.rerank_k, self.recall_n
            )));
        }
        if self.max_attempts == 0 {
            return Err(RagError::Config("max_attempts must be greater than zero".to_string()));
        }
        if let Some(max) = self.max_chunk_length {
            if max <= self.min_chunk_length {
                return Err(RagError::Config(format!(
                    "max_chunk_length ({max}) must be greater than min_chunk_length ({})",
                    self.min_chunk_length
                )));
            }
        }
        Ok(())
    }

    /// The retry policy described by this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy =
            RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms));
        if let Some(ms) = self.max_delay_ms {
            policy = policy.with_max_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = self.attempt_timeout_ms {
            policy = policy.with_attempt_timeout(Duration::from_millis(ms));
        }
        policy
    }

    /// The chunker described by this configuration.
    pub fn chunker(&self) -> ParagraphChunker {
        let chunker = ParagraphChunker::new(self.min_chunk_length);
        match self.max_chunk_length {
            Some(max) => chunker.with_max_length(max),
            None => chunker,
        }
    }
}

/// Builder for constructing a validated [`RetrieverConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrieverConfigBuilder {
    config: RetrieverConfig,
}

impl RetrieverConfigBuilder {
    /// Set the collection name.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Set the number of candidates requested from vector search.
    pub fn recall_n(mut self, n: usize) -> Self {
        self.config.recall_n = n;
        self
    }

    /// Set the number of results kept after reranking.
    pub fn rerank_k(mut self, k: usize) -> Self {
        self.config.rerank_k = k;
        self
    }

    /// Set the minimum chunk length in characters.
    pub fn min_chunk_length(mut self, length: usize) -> Self {
        self.config.min_chunk_length = length;
        self
    }

    /// Set the maximum chunk length in characters.
    pub fn max_chunk_length(mut self, length: usize) -> Self {
        self.config.max_chunk_length = Some(length);
        self
    }

    /// Set the total number of attempts per provider call.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set the base backoff delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Cap each backoff wait.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay_ms = Some(delay.as_millis() as u64);
        self
    }

    /// Set a deadline for each attempt.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Build the [`RetrieverConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RetrieverConfig::validate`].
    pub fn build(self) -> Result<RetrieverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RetrieverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_policy(), RetryPolicy::new(3, Duration::from_secs(1)));
    }

    #[test]
    fn rejects_rerank_wider_than_recall() {
        let err = RetrieverConfig::builder().recall_n(2).rerank_k(3).build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn rejects_inverted_chunk_bounds() {
        let err = RetrieverConfig::builder()
            .min_chunk_length(50)
            .max_chunk_length(40)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_chunk_length"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: RetrieverConfig = serde_json::from_str(r#"{"recall_n": 20}"#).unwrap();
        assert_eq!(config.recall_n, 20);
        assert_eq!(config.rerank_k, 3);
        assert_eq!(config.collection_name, "industry_reports");
    }
}
