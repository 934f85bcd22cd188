//! Durable vector store persisted as JSON snapshots on local disk.
//!
//! Each collection lives in `<root>/<name>.json`. Every mutation is applied
//! to a copy of the collection, written to a temporary file and renamed over
//! the previous snapshot; only then does the in-memory view change. A crash
//! therefore leaves either the old or the new snapshot, never a torn one.

use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::error::{RagError, Result};
use crate::inmemory::{CollectionData, missing_collection};
use crate::vectorstore::{EmbeddedChunk, VectorMatch, VectorStore};

const BACKEND: &str = "File";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    name: &'a str,
    data: &'a CollectionData,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    data: CollectionData,
}

/// A vector store that survives process restarts.
///
/// Collections are loaded lazily by [`create_collection`](VectorStore::create_collection)
/// and then served from memory; searches never touch the disk.
///
/// # Example
///
/// ```rust,ignore
/// use analyst_rag::{FileVectorStore, VectorStore};
///
/// let store = FileVectorStore::open("./chroma_db").await?;
/// store.create_collection("industry_reports", 384).await?;
/// ```
#[derive(Debug)]
pub struct FileVectorStore {
    root: PathBuf,
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl FileVectorStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            error!(path = %root.display(), error = %e, "failed to create store directory");
            RagError::storage(BACKEND, format!("cannot create '{}': {e}", root.display()))
        })?;
        info!(path = %root.display(), "opened file vector store");
        Ok(Self { root, collections: RwLock::new(HashMap::new()) })
    }

    /// The directory holding the collection snapshots.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(RagError::storage(
                BACKEND,
                format!("invalid collection name '{name}': use ASCII letters, digits, '-' or '_'"),
            ));
        }
        Ok(self.root.join(format!("{name}.json")))
    }

    async fn load(&self, name: &str) -> Result<Option<CollectionData>> {
        let path = self.snapshot_path(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RagError::storage(
                    BACKEND,
                    format!("cannot read '{}': {e}", path.display()),
                ));
            }
        };

        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
            RagError::storage(BACKEND, format!("corrupt snapshot '{}': {e}", path.display()))
        })?;
        if snapshot.version != FORMAT_VERSION {
            return Err(RagError::storage(
                BACKEND,
                format!(
                    "snapshot '{}' has format version {}, expected {FORMAT_VERSION}",
                    path.display(),
                    snapshot.version
                ),
            ));
        }
        Ok(Some(snapshot.data))
    }

    async fn persist(&self, name: &str, data: &CollectionData) -> Result<()> {
        let path = self.snapshot_path(name)?;
        let tmp = path.with_extension("json.tmp");
        let bytes =
            serde_json::to_vec(&SnapshotRef { version: FORMAT_VERSION, name, data }).map_err(|e| {
                RagError::storage(BACKEND, format!("cannot serialize collection '{name}': {e}"))
            })?;

        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            error!(path = %tmp.display(), error = %e, "snapshot write failed");
            RagError::storage(BACKEND, format!("cannot write '{}': {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "snapshot rename failed");
            RagError::storage(BACKEND, format!("cannot replace '{}': {e}", path.display()))
        })?;

        debug!(
            collection = name,
            bytes = bytes.len(),
            chunk_count = data.len(),
            "persisted snapshot"
        );
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Ok(());
        }

        let data = match self.load(name).await? {
            Some(existing) => {
                if existing.dimensions != 0 && dimensions != 0 && existing.dimensions != dimensions
                {
                    return Err(RagError::storage(
                        BACKEND,
                        format!(
                            "collection '{name}' has {} dimensions, requested {dimensions}",
                            existing.dimensions
                        ),
                    ));
                }
                info!(collection = name, chunk_count = existing.len(), "loaded collection");
                existing
            }
            None => {
                let fresh = CollectionData::new(dimensions);
                self.persist(name, &fresh).await?;
                info!(collection = name, dimensions, "created collection");
                fresh
            }
        };

        collections.insert(name.to_string(), data);
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let path = self.snapshot_path(name)?;
        let mut collections = self.collections.write().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => {
                return Err(RagError::storage(
                    BACKEND,
                    format!("cannot remove '{}': {e}", path.display()),
                ));
            }
        }
        collections.remove(name);
        Ok(())
    }

    async fn clear_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        let empty = CollectionData::new(dimensions);
        self.persist(name, &empty).await?;
        collections.insert(name.to_string(), empty);
        info!(collection = name, dimensions, "cleared collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let current =
            collections.get_mut(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;

        let mut updated = current.clone();
        updated.upsert(BACKEND, chunks)?;
        self.persist(collection, &updated).await?;
        *current = updated;
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let current =
            collections.get_mut(collection).ok_or_else(|| missing_collection(BACKEND, collection))?;

        let mut updated = current.clone();
        updated.delete(ids);
        self.persist(collection, &updated).await?;
        *current = updated;
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
