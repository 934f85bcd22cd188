//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and small-scale use cases. The durable
//! [`FileVectorStore`](crate::FileVectorStore) shares its collection layout.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{RagError, Result};
use crate::vectorstore::{EmbeddedChunk, VectorMatch, VectorStore, cosine_similarity};

const BACKEND: &str = "InMemory";

/// One named collection: chunks keyed by id, each tagged with the sequence
/// number of its first insertion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CollectionData {
    pub(crate) dimensions: usize,
    next_seq: u64,
    entries: HashMap<String, Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    seq: u64,
    chunk: EmbeddedChunk,
}

impl CollectionData {
    pub(crate) fn new(dimensions: usize) -> Self {
        Self { dimensions, next_seq: 0, entries: HashMap::new() }
    }

    /// Insert or replace chunks. The whole batch is rejected if any embedding
    /// has the wrong dimensionality.
    pub(crate) fn upsert(&mut self, backend: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        if self.dimensions > 0 {
            if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != self.dimensions) {
                return Err(RagError::storage(
                    backend,
                    format!(
                        "chunk '{}' has {} dimensions, collection expects {}",
                        bad.id,
                        bad.embedding.len(),
                        self.dimensions
                    ),
                ));
            }
        }

        for chunk in chunks {
            match self.entries.get_mut(&chunk.id) {
                Some(entry) => entry.chunk = chunk.clone(),
                None => {
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    self.entries.insert(chunk.id.clone(), Entry { seq, chunk: chunk.clone() });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn delete(&mut self, ids: &[&str]) {
        for id in ids {
            self.entries.remove(*id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Rank every entry against `embedding`: descending score, ties by
    /// insertion order.
    pub(crate) fn search(&self, embedding: &[f32], top_k: usize) -> Vec<VectorMatch> {
        let mut scored: Vec<(u64, VectorMatch)> = self
            .entries
            .values()
            .map(|entry| {
                let score = cosine_similarity(&entry.chunk.embedding, embedding);
                (entry.seq, VectorMatch { chunk: entry.chunk.clone(), score })
            })
            .collect();

        scored.sort_by(|(seq_a, a), (seq_b, b)| b.score.total_cmp(&a.score).then(seq_a.cmp(seq_b)));
        scored.truncate(top_k);
        scored.into_iter().map(|(_, m)| m).collect()
    }
}

pub(crate) fn missing_collection(backend: &str, name: &str) -> RagError {
    RagError::storage(backend, format!("collection '{name}' does not exist"))
}

/// An in-memory vector store using cosine similarity for search.
///
/// Collections are stored as nested maps: collection name → chunk ID → chunk.
/// All operations are async-safe via `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use analyst_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_insert_with(|| CollectionData::new(dimensions));
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn clear_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.insert(name.to_string(), CollectionData::new(dimensions));
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store =
            collections.get_mut(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;
        store.upsert(BACKEND, chunks)
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store =
            collections.get_mut(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;
        store.delete(ids);
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(CollectionData::len)
            .ok_or_else(|| missing_collection(BACKEND, collection))
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let collections = self.collections.read().await;
        let store =
            collections.get(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;
        Ok(store.search(embedding, top_k))
    }

    fn backend(&self) -> &str {
        BACKEND
    }
}
