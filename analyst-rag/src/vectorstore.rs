//! Vector store trait for storing and searching vector embeddings.
//!
//! This is the vector-level backend interface. Text-level ingestion and
//! search, including embedding computation, live in
//! [`collection`](crate::collection).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A chunk together with its embedding, as held by a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    /// Unique identifier within the collection.
    pub id: String,
    /// The chunk text.
    pub text: String,
    /// The vector embedding for this chunk's text.
    pub embedding: Vec<f32>,
    /// Provenance metadata.
    pub metadata: HashMap<String, String>,
}

/// A stored chunk paired with its similarity to a query vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    /// The matched chunk.
    pub chunk: EmbeddedChunk,
    /// The similarity score (higher is more similar).
    pub score: f32,
}

/// A storage backend for vector embeddings with similarity search.
///
/// Implementations manage named collections of [`EmbeddedChunk`]s. Within a
/// collection ids are unique: upserting an existing id replaces the stored
/// entry in place.
///
/// # Example
///
/// ```rust,ignore
/// use analyst_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// store.upsert("docs", &chunks).await?;
/// let matches = store.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Replace a collection with an empty one of `dimensions`, creating it if
    /// absent. The swap is atomic: on failure the previous contents remain
    /// and the collection stays usable.
    async fn clear_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Upsert chunks into a collection. Chunks must have embeddings set.
    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Delete chunks by their IDs from a collection.
    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()>;

    /// Number of chunks stored in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Search for the `top_k` most similar chunks to the given embedding.
    ///
    /// Returns results ordered by descending similarity score; equal scores
    /// keep insertion order.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>>;

    /// A short backend name used in logs and errors.
    fn backend(&self) -> &str;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
