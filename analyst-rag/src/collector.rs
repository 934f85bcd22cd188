//! Search-backed context collection.
//!
//! [`ContextCollector`] performs the retrieval half of a research step: run
//! a web search, ingest what it returns, and pull the most relevant
//! passages back out of the collection, which may also hold earlier
//! searches and uploads.

use std::sync::Arc;

use tracing::{info, warn};

use crate::document::{Document, RankedResult};
use crate::error::Result;
use crate::retriever::{TwoStageRetriever, format_context};
use crate::retry::RetryPolicy;
use crate::search::SearchProvider;

/// What one collection round produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedContext {
    /// Number of web documents the search returned.
    pub hit_count: usize,
    /// Number of chunks inserted or updated.
    pub ingested: usize,
    /// The reranked passages.
    pub passages: Vec<RankedResult>,
}

impl CollectedContext {
    /// The passages joined into one prompt-ready block.
    pub fn context(&self) -> String {
        format_context(&self.passages)
    }

    /// Whether no passage was found.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Runs search → ingest → retrieve for a query.
pub struct ContextCollector {
    search: Arc<dyn SearchProvider>,
    retriever: Arc<TwoStageRetriever>,
    retry: RetryPolicy,
}

impl ContextCollector {
    /// Create a collector. `retry` guards the search call.
    pub fn new(
        search: Arc<dyn SearchProvider>,
        retriever: Arc<TwoStageRetriever>,
        retry: RetryPolicy,
    ) -> Self {
        Self { search, retriever, retry }
    }

    /// Search for `query`, store the results, and return the best passages
    /// using the retriever's configured recall and rerank widths.
    ///
    /// # Errors
    ///
    /// Propagates search, storage and rerank errors; nothing is downgraded to
    /// an empty result.
    pub async fn collect(&self, query: &str) -> Result<CollectedContext> {
        let hits = self.retry.call("web_search", || self.search.search(query)).await?;
        let hit_count = hits.len();

        let ingested = if hits.is_empty() {
            warn!(provider = self.search.name(), query, "search returned no documents");
            0
        } else {
            let documents: Vec<Document> =
                hits.into_iter().map(|hit| hit.into_document()).collect();
            self.retriever.ingest_search_results(query, &documents).await?
        };

        let passages = self.retriever.retrieve_default(query).await?;
        info!(query, hit_count, ingested, passage_count = passages.len(), "context collected");

        Ok(CollectedContext { hit_count, ingested, passages })
    }
}
