//! # analyst-rag
//!
//! Two-stage retrieval core for research-report generation: broad vector
//! recall over a persistent collection, followed by precision reranking of
//! the small recalled set.
//!
//! ## Overview
//!
//! - **Chunking**: split raw text into paragraph chunks and drop fragments
//! - **Collection**: idempotent ingest keyed by content hash, similarity search, reset
//! - **Reranking**: rescore recalled candidates against the query
//! - **Resilient calls**: bounded exponential-backoff retry for every provider call,
//!   with a streaming variant that only retries before the first fragment
//!
//! ## Feature Flags
//!
//! | Feature  | Provides |
//! |----------|----------|
//! | `openai` | OpenAI-compatible embedding and chat providers |
//! | `tavily` | Tavily web search provider |
//! | `full`   | All of the above |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use analyst_rag::*;
//!
//! let config = RetrieverConfig::default();
//! let collection = EmbeddingCollection::open(
//!     &config.collection_name,
//!     Arc::new(HashingEmbedder::default()),
//!     Arc::new(FileVectorStore::open("./vector_store").await?),
//!     config.retry_policy(),
//! )
//! .await?;
//!
//! let retriever = TwoStageRetriever::builder()
//!     .config(config)
//!     .collection(Arc::new(collection))
//!     .reranker(Arc::new(ScoringReranker::new(Arc::new(LexicalScorer::default()))))
//!     .build()?;
//!
//! retriever.ingest_raw_text(&text, "report.txt").await?;
//! let passages = retriever.retrieve_default("market size").await?;
//! println!("{}", format_context(&passages));
//! ```

pub mod chunking;
pub mod collection;
pub mod collector;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod inmemory;
pub mod persistent;
pub mod reranker;
pub mod retriever;
pub mod retry;
pub mod search;
pub mod vectorstore;

#[cfg(any(feature = "openai", feature = "tavily"))]
mod http;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "tavily")]
pub mod tavily;

pub use chunking::{Chunker, ParagraphChunker};
pub use collection::{Collection, EmbeddingCollection};
pub use collector::{CollectedContext, ContextCollector};
pub use config::{RetrieverConfig, RetrieverConfigBuilder};
pub use document::{Candidate, Chunk, Document, DocumentOrigin, RankedResult, chunk_id};
pub use embedding::{EmbeddingProvider, HashingEmbedder};
pub use error::{ErrorKind, RagError, Result};
pub use generation::{GenerationProvider, GenerationRequest, Generator};
pub use inmemory::InMemoryVectorStore;
pub use persistent::FileVectorStore;
pub use reranker::{LexicalScorer, NoOpReranker, RelevanceScorer, Reranker, ScoringReranker};
pub use retriever::{TwoStageRetriever, TwoStageRetrieverBuilder, format_context};
pub use retry::{FragmentStream, RetryPolicy};
pub use search::{SearchHit, SearchProvider};
pub use vectorstore::{EmbeddedChunk, VectorMatch, VectorStore};
