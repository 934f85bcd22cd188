//! Text-level vector store adapter.
//!
//! A [`Collection`] accepts [`Chunk`]s and text queries; [`EmbeddingCollection`]
//! implements it by pairing an [`EmbeddingProvider`] with a [`VectorStore`]
//! backend under one collection name.
//!
//! Writes (`ingest`, `reset`) are serialized and exclude readers for their
//! duration, so a search observes a collection either before or after a
//! write, never in between. Searches run concurrently with each other.
//! Embedding calls go through the configured [`RetryPolicy`]; storage calls
//! are never retried here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::document::{Candidate, Chunk};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;
use crate::vectorstore::{EmbeddedChunk, VectorStore};

/// A persistent, named set of chunks queryable by semantic similarity.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Embed and store `chunks`, overwriting any entry with the same id.
    ///
    /// Returns the number of chunks inserted or updated.
    async fn ingest(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Return up to `n` stored chunks most similar to `query`, ordered by
    /// descending similarity with ties in insertion order.
    async fn search(&self, query: &str, n: usize) -> Result<Vec<Candidate>>;

    /// Irreversibly remove every chunk.
    async fn reset(&self) -> Result<()>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize>;
}

/// A [`Collection`] that embeds text with an [`EmbeddingProvider`] and keeps
/// vectors in a [`VectorStore`].
///
/// Construct it once per process and share it; opening creates the backing
/// collection if it does not exist yet.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use analyst_rag::{EmbeddingCollection, FileVectorStore, HashingEmbedder, RetryPolicy};
///
/// let store = Arc::new(FileVectorStore::open("./chroma_db").await?);
/// let collection = EmbeddingCollection::open(
///     "industry_reports",
///     Arc::new(HashingEmbedder::default()),
///     store,
///     RetryPolicy::default(),
/// )
/// .await?;
/// ```
pub struct EmbeddingCollection {
    name: String,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    retry: RetryPolicy,
    gate: RwLock<()>,
}

impl EmbeddingCollection {
    /// Open the collection `name`, creating it in `store` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Storage`] if the backend cannot create or load
    /// the collection.
    pub async fn open(
        name: impl Into<String>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let name = name.into();
        store.create_collection(&name, embedder.dimensions()).await.map_err(|e| {
            error!(
                collection = %name,
                backend = store.backend(),
                error = %e,
                "failed to open collection"
            );
            e
        })?;
        info!(
            collection = %name,
            backend = store.backend(),
            embedder = embedder.name(),
            "collection ready"
        );
        Ok(Self { name, embedder, store, retry, gate: RwLock::new(()) })
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn embed_all(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let embeddings =
            self.retry.call("embed_batch", || self.embedder.embed_batch(texts)).await?;
        if embeddings.len() != texts.len() {
            return Err(RagError::FatalProvider {
                provider: self.embedder.name().to_string(),
                message: format!("expected {} embeddings, got {}", texts.len(), embeddings.len()),
            });
        }
        Ok(embeddings)
    }
}

/// Collapse duplicate ids to their last occurrence, keeping first-seen order.
fn dedup_last_wins(chunks: &[Chunk]) -> Vec<&Chunk> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<&Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match position.get(chunk.id.as_str()) {
            Some(&index) => unique[index] = chunk,
            None => {
                position.insert(chunk.id.as_str(), unique.len());
                unique.push(chunk);
            }
        }
    }
    unique
}

#[async_trait]
impl Collection for EmbeddingCollection {
    async fn ingest(&self, chunks: &[Chunk]) -> Result<usize> {
        let unique = dedup_last_wins(chunks);
        if unique.is_empty() {
            debug!(collection = %self.name, "nothing to ingest");
            return Ok(0);
        }

        let texts: Vec<&str> = unique.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embed_all(&texts).await?;

        let embedded: Vec<EmbeddedChunk> = unique
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| EmbeddedChunk {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                embedding,
                metadata: chunk.metadata.clone(),
            })
            .collect();

        let _write = self.gate.write().await;
        self.store.upsert(&self.name, &embedded).await.map_err(|e| {
            error!(collection = %self.name, error = %e, "upsert failed during ingestion");
            e
        })?;

        info!(collection = %self.name, chunk_count = embedded.len(), "ingested chunks");
        Ok(embedded.len())
    }

    async fn search(&self, query: &str, n: usize) -> Result<Vec<Candidate>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.retry.call("embed_query", || self.embedder.embed(query)).await?;

        let _read = self.gate.read().await;
        let matches = self.store.search(&self.name, &query_embedding, n).await.map_err(|e| {
            error!(collection = %self.name, error = %e, "vector store search failed");
            e
        })?;

        debug!(
            collection = %self.name,
            requested = n,
            result_count = matches.len(),
            "vector search"
        );
        Ok(matches
            .into_iter()
            .map(|m| Candidate { id: m.chunk.id, text: m.chunk.text, similarity_score: m.score })
            .collect())
    }

    async fn reset(&self) -> Result<()> {
        let _write = self.gate.write().await;
        let dimensions = self.embedder.dimensions();
        self.store.clear_collection(&self.name, dimensions).await.map_err(|e| {
            error!(collection = %self.name, error = %e, "reset failed, previous contents kept");
            e
        })?;
        info!(collection = %self.name, "collection reset");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let _read = self.gate.read().await;
        self.store.count(&self.name).await
    }
}
