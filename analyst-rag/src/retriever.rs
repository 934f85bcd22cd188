//! Two-stage retriever.
//!
//! The [`TwoStageRetriever`] owns no data. It chunks incoming documents into
//! a [`Collection`] and answers queries with broad vector recall followed by
//! precision reranking over the small recalled set.
//!
//! # Example
//!
//! ```rust,ignore
//! use analyst_rag::{RetrieverConfig, TwoStageRetriever};
//!
//! let retriever = TwoStageRetriever::builder()
//!     .config(RetrieverConfig::default())
//!     .collection(collection.clone())
//!     .reranker(reranker.clone())
//!     .build()?;
//!
//! retriever.ingest_raw_text(&uploaded_text, "q3_report.txt").await?;
//! let passages = retriever.retrieve("humanoid robot market size", 10, 3).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::chunking::Chunker;
use crate::collection::Collection;
use crate::config::RetrieverConfig;
use crate::document::{Chunk, Document, RankedResult};
use crate::error::{RagError, Result};
use crate::reranker::Reranker;

/// Separator placed between passages by [`format_context`].
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Broad recall from a [`Collection`], then precision from a [`Reranker`].
///
/// Construct one via [`TwoStageRetriever::builder()`]. The collection and
/// reranker are shared handles created once by the caller.
pub struct TwoStageRetriever {
    config: RetrieverConfig,
    collection: Arc<dyn Collection>,
    reranker: Arc<dyn Reranker>,
    chunker: Arc<dyn Chunker>,
}

impl TwoStageRetriever {
    /// Create a new [`TwoStageRetrieverBuilder`].
    pub fn builder() -> TwoStageRetrieverBuilder {
        TwoStageRetrieverBuilder::default()
    }

    /// Return a reference to the retriever configuration.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Return a reference to the underlying collection.
    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.collection
    }

    /// Chunk and store documents returned by a web search for `query`.
    ///
    /// Each chunk records the query, the document's source URL and title.
    /// Returns the number of chunks inserted or updated.
    ///
    /// # Errors
    ///
    /// Propagates collection errors unchanged.
    pub async fn ingest_search_results(
        &self,
        query: &str,
        documents: &[Document],
    ) -> Result<usize> {
        let count = self.ingest_documents(documents, Some(query)).await?;
        info!(
            query,
            document_count = documents.len(),
            chunk_count = count,
            "ingested search results"
        );
        Ok(count)
    }

    /// Chunk and store a single already-fetched text, such as an uploaded file.
    ///
    /// # Errors
    ///
    /// Propagates collection errors unchanged.
    pub async fn ingest_raw_text(&self, text: &str, source: &str) -> Result<usize> {
        let document = Document::uploaded(source, text);
        let count = self.ingest_documents(std::slice::from_ref(&document), None).await?;
        info!(source, chunk_count = count, "ingested raw text");
        Ok(count)
    }

    async fn ingest_documents(&self, documents: &[Document], query: Option<&str>) -> Result<usize> {
        let ingested_at = Utc::now().to_rfc3339();
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|document| self.chunk_document(document, query, &ingested_at))
            .collect();

        if chunks.is_empty() {
            debug!(document_count = documents.len(), "no chunks survived filtering");
            return Ok(0);
        }

        self.collection.ingest(&chunks).await.map_err(|e| {
            error!(chunk_count = chunks.len(), error = %e, "ingestion failed");
            e
        })
    }

    fn chunk_document(
        &self,
        document: &Document,
        query: Option<&str>,
        ingested_at: &str,
    ) -> Vec<Chunk> {
        self.chunker
            .chunk(&document.text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let mut metadata: HashMap<String, String> = document.metadata.clone();
                metadata.insert("origin".to_string(), document.origin.to_string());
                metadata.insert("ingested_at".to_string(), ingested_at.to_string());
                metadata.insert("chunk_index".to_string(), index.to_string());
                if let Some(title) = &document.title {
                    metadata.insert("title".to_string(), title.clone());
                }
                if let Some(query) = query {
                    metadata.insert("query".to_string(), query.to_string());
                }
                Chunk::new(text, &document.source, metadata)
            })
            .collect()
    }

    /// Recall `recall_n` candidates, rerank them, and keep the best `rerank_k`.
    ///
    /// Returns an empty `Vec` without invoking the reranker when recall
    /// finds nothing.
    ///
    /// # Errors
    ///
    /// Propagates collection and reranker errors unchanged; a failure is
    /// never reported as an empty result.
    pub async fn retrieve(
        &self,
        query: &str,
        recall_n: usize,
        rerank_k: usize,
    ) -> Result<Vec<RankedResult>> {
        let candidates = self.collection.search(query, recall_n).await.map_err(|e| {
            error!(error = %e, "recall stage failed");
            e
        })?;

        if candidates.is_empty() {
            info!(query, "recall returned no candidates");
            return Ok(Vec::new());
        }

        let candidate_count = candidates.len();
        let results = self.reranker.rerank(query, candidates, rerank_k).await.map_err(|e| {
            error!(error = %e, "rerank stage failed");
            e
        })?;

        info!(query, candidate_count, result_count = results.len(), "retrieval completed");
        Ok(results)
    }

    /// [`retrieve`](Self::retrieve) with the configured `recall_n` and `rerank_k`.
    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<RankedResult>> {
        self.retrieve(query, self.config.recall_n, self.config.rerank_k).await
    }

    /// Empty the collection.
    pub async fn reset(&self) -> Result<()> {
        self.collection.reset().await
    }

    /// Number of stored chunks.
    pub async fn count(&self) -> Result<usize> {
        self.collection.count().await
    }
}

/// Join ranked passages into one context block for a generation prompt.
///
/// Returns an empty string for no results.
pub fn format_context(results: &[RankedResult]) -> String {
    results.iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

/// Builder for constructing a [`TwoStageRetriever`].
///
/// `collection` and `reranker` are required. The configuration defaults to
/// [`RetrieverConfig::default()`], and the chunker to the one the
/// configuration describes.
#[derive(Default)]
pub struct TwoStageRetrieverBuilder {
    config: Option<RetrieverConfig>,
    collection: Option<Arc<dyn Collection>>,
    reranker: Option<Arc<dyn Reranker>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl TwoStageRetrieverBuilder {
    /// Set the retriever configuration.
    pub fn config(mut self, config: RetrieverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the collection used for ingestion and recall.
    pub fn collection(mut self, collection: Arc<dyn Collection>) -> Self {
        self.collection = Some(collection);
        self
    }

    /// Set the reranker used for precision.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Override the chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`TwoStageRetriever`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<TwoStageRetriever> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let collection = self
            .collection
            .ok_or_else(|| RagError::Config("collection is required".to_string()))?;
        let reranker =
            self.reranker.ok_or_else(|| RagError::Config("reranker is required".to_string()))?;
        let chunker = self
            .chunker
            .unwrap_or_else(|| Arc::new(config.chunker()) as Arc<dyn Chunker>);

        Ok(TwoStageRetriever { config, collection, reranker, chunker })
    }
}
