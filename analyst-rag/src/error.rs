//! Error types for the `analyst-rag` crate.
//!
//! Every failure carries an [`ErrorKind`] so callers can decide on retries
//! without string matching. Only [`ErrorKind::TransientNetwork`] and
//! [`ErrorKind::RateLimited`] are retryable.

use std::time::Duration;

use thiserror::Error;

/// The classification of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection or timeout failure talking to a provider.
    TransientNetwork,
    /// The provider signalled overload or an exhausted quota.
    RateLimited,
    /// Authentication or validation failure from a provider.
    FatalProvider,
    /// Vector store read or write failure.
    Storage,
    /// Reranking model failure.
    Rerank,
    /// Invalid configuration supplied at construction.
    Config,
}

impl ErrorKind {
    /// Whether the resilient call wrapper may retry an error of this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientNetwork | ErrorKind::RateLimited)
    }
}

/// Errors that can occur in retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A provider call failed in a way that may succeed on retry.
    #[error("Transient network error ({provider}): {message}")]
    TransientNetwork {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A provider rejected the call because of load or quota.
    #[error("Rate limited ({provider}): {message}")]
    RateLimited {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A provider rejected the call permanently (bad credentials, bad request).
    #[error("Provider error ({provider}): {message}")]
    FatalProvider {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A single attempt exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    Storage {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during result reranking.
    #[error("Reranker error ({reranker}): {message}")]
    Rerank {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The final error of a retried call.
    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    Attempts {
        /// The operation that was retried.
        operation: String,
        /// How many attempts were made in total.
        attempts: u32,
        /// The error returned by the last attempt.
        #[source]
        last: Box<RagError>,
    },

    /// A stream failed after some of its output was already delivered.
    #[error("{operation} stream interrupted after {delivered} fragment(s): {last}")]
    StreamInterrupted {
        /// The streaming operation.
        operation: String,
        /// Number of elements the consumer already received.
        delivered: usize,
        /// The error that interrupted the stream.
        #[source]
        last: Box<RagError>,
    },
}

impl RagError {
    /// Classify this error.
    ///
    /// Wrapping variants report the kind of the error they wrap.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::TransientNetwork { .. } | RagError::Timeout { .. } => {
                ErrorKind::TransientNetwork
            }
            RagError::RateLimited { .. } => ErrorKind::RateLimited,
            RagError::FatalProvider { .. } => ErrorKind::FatalProvider,
            RagError::Storage { .. } => ErrorKind::Storage,
            RagError::Rerank { .. } => ErrorKind::Rerank,
            RagError::Config(_) => ErrorKind::Config,
            RagError::Attempts { last, .. } | RagError::StreamInterrupted { last, .. } => {
                last.kind()
            }
        }
    }

    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// An interrupted stream is never retryable at this level: part of its
    /// output already reached the consumer.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::Attempts { .. } | RagError::StreamInterrupted { .. } => false,
            other => other.kind().is_retryable(),
        }
    }

    /// The innermost concrete error, unwrapping retry and stream wrappers.
    pub fn root_cause(&self) -> &RagError {
        match self {
            RagError::Attempts { last, .. } | RagError::StreamInterrupted { last, .. } => {
                last.root_cause()
            }
            other => other,
        }
    }

    /// Classify a non-success HTTP status returned by a provider.
    ///
    /// 429 is rate limiting, 408 and 5xx are transient, every other status is
    /// a permanent rejection.
    pub fn from_http_status(
        provider: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        let provider = provider.into();
        let message = format!("HTTP {status}: {}", message.into());
        match status {
            429 => RagError::RateLimited { provider, message },
            408 | 500..=599 => RagError::TransientNetwork { provider, message },
            _ => RagError::FatalProvider { provider, message },
        }
    }

    pub(crate) fn storage(backend: &str, message: impl Into<String>) -> Self {
        RagError::Storage { backend: backend.to_string(), message: message.into() }
    }

    pub(crate) fn rerank(reranker: &str, message: impl Into<String>) -> Self {
        RagError::Rerank { reranker: reranker.to_string(), message: message.into() }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
