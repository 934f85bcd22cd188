//! Vector store backends and the embedding collection adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use analyst_rag::collection::{Collection, EmbeddingCollection};
use analyst_rag::document::Chunk;
use analyst_rag::embedding::{EmbeddingProvider, HashingEmbedder};
use analyst_rag::error::{ErrorKind, RagError, Result};
use analyst_rag::inmemory::InMemoryVectorStore;
use analyst_rag::persistent::FileVectorStore;
use analyst_rag::retry::RetryPolicy;
use analyst_rag::vectorstore::{EmbeddedChunk, VectorMatch, VectorStore};
use async_trait::async_trait;
use proptest::prelude::*;
use tokio::sync::Notify;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate a chunk with a normalized embedding.
fn arb_chunk(dim: usize) -> impl Strategy<Value = EmbeddedChunk> {
    ("[a-z]{3,8}", "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(id, text, embedding)| EmbeddedChunk { id, text, embedding, metadata: HashMap::new() },
    )
}

fn embedded(id: &str, embedding: Vec<f32>) -> EmbeddedChunk {
    EmbeddedChunk {
        id: id.to_string(),
        text: format!("text {id}"),
        embedding,
        metadata: HashMap::new(),
    }
}

fn chunk(text: &str, source: &str) -> Chunk {
    Chunk::new(text, source, HashMap::new())
}

async fn hashing_collection(store: Arc<dyn VectorStore>) -> EmbeddingCollection {
    EmbeddingCollection::open(
        "industry_reports",
        Arc::new(HashingEmbedder::new(64)),
        store,
        RetryPolicy::no_retry(),
    )
    .await
    .unwrap()
}

/// Wraps an in-memory store with scripted faults. Upserts land one chunk at
/// a time with a yield in between, and `first_write` fires after the first.
#[derive(Default)]
struct ScriptedStore {
    inner: InMemoryVectorStore,
    creates: AtomicUsize,
    fail_later_creates: bool,
    fail_clear: AtomicBool,
    first_write: Notify,
}

impl ScriptedStore {
    fn fault(message: &str) -> RagError {
        RagError::Storage { backend: "scripted".into(), message: message.into() }
    }
}

#[async_trait]
impl VectorStore for ScriptedStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.creates.fetch_add(1, Ordering::SeqCst) > 0 && self.fail_later_creates {
            return Err(Self::fault("EIO"));
        }
        self.inner.create_collection(name, dimensions).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner.delete_collection(name).await
    }

    async fn clear_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(Self::fault("snapshot write failed"));
        }
        self.inner.clear_collection(name, dimensions).await
    }

    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        for (i, chunk) in chunks.iter().enumerate() {
            self.inner.upsert(collection, std::slice::from_ref(chunk)).await?;
            if i == 0 {
                self.first_write.notify_one();
            }
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        self.inner.delete(collection, ids).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        self.inner.search(collection, embedding, top_k).await
    }

    fn backend(&self) -> &str {
        "scripted"
    }
}

/// Searching returns results ordered by descending cosine similarity, and
/// at most `top_k` of them.
mod prop_inmemory_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, unique_count) = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.create_collection("test", DIM).await.unwrap();
                store.upsert("test", &chunks).await.unwrap();
                let count = store.count("test").await.unwrap();
                let results = store.search("test", &query, top_k).await.unwrap();
                (results, count)
            });

            prop_assert!(results.len() <= top_k);
            prop_assert_eq!(results.len(), top_k.min(unique_count));
            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score
                );
            }
        }
    }
}

#[tokio::test]
async fn equal_scores_keep_insertion_order() {
    let store = InMemoryVectorStore::new();
    store.create_collection("ties", 2).await.unwrap();
    store
        .upsert("ties", &[embedded("c", vec![1.0, 0.0]), embedded("a", vec![1.0, 0.0])])
        .await
        .unwrap();
    store.upsert("ties", &[embedded("b", vec![1.0, 0.0])]).await.unwrap();
    // Overwriting keeps the original position.
    store.upsert("ties", &[embedded("c", vec![1.0, 0.0])]).await.unwrap();

    let matches = store.search("ties", &[1.0, 0.0], 3).await.unwrap();
    let ids: Vec<String> = matches.into_iter().map(|m| m.chunk.id).collect();
    assert_eq!(ids, ["c", "a", "b"]);
}

#[tokio::test]
async fn dimension_mismatch_rejects_whole_batch() {
    let store = InMemoryVectorStore::new();
    store.create_collection("dims", 3).await.unwrap();

    let err = store
        .upsert("dims", &[embedded("ok", vec![1.0, 0.0, 0.0]), embedded("bad", vec![1.0, 0.0])])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(store.count("dims").await.unwrap(), 0);
}

#[tokio::test]
async fn missing_collection_is_a_storage_error() {
    let store = InMemoryVectorStore::new();
    let err = store.search("nope", &[1.0], 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

#[tokio::test]
async fn ingest_is_idempotent() {
    let collection = hashing_collection(Arc::new(InMemoryVectorStore::new())).await;
    let chunks = [
        chunk("Humanoid robot shipments doubled in 2024.", "https://a.example"),
        chunk("Battery prices fell for the third straight year.", "https://a.example"),
    ];

    assert_eq!(collection.ingest(&chunks).await.unwrap(), 2);
    assert_eq!(collection.ingest(&chunks).await.unwrap(), 2);
    assert_eq!(collection.count().await.unwrap(), 2);
}

#[tokio::test]
async fn repeated_ingest_keeps_latest_text_and_metadata() {
    let store = Arc::new(InMemoryVectorStore::new());
    let collection = hashing_collection(store.clone()).await;

    let mut first = chunk("Battery prices fell for the third straight year.", "a");
    first.metadata.insert("rev".into(), "1".into());
    let mut second = chunk("Battery prices  fell for the third\nstraight year.", "a");
    second.metadata.insert("rev".into(), "2".into());
    assert_eq!(first.id, second.id);

    collection.ingest(&[first]).await.unwrap();
    collection.ingest(&[second.clone()]).await.unwrap();

    let query = HashingEmbedder::new(64).embed(&second.text).await.unwrap();
    let matches = store.search("industry_reports", &query, 10).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].chunk.id, second.id);
    assert_eq!(matches[0].chunk.text, second.text);
    assert_eq!(matches[0].chunk.metadata["rev"], "2");
}

#[tokio::test]
async fn same_text_from_different_sources_is_kept_twice() {
    let collection = hashing_collection(Arc::new(InMemoryVectorStore::new())).await;
    let text = "Humanoid robot shipments doubled in 2024.";

    collection
        .ingest(&[chunk(text, "https://a.example"), chunk(text, "report.txt")])
        .await
        .unwrap();

    assert_eq!(collection.count().await.unwrap(), 2);
}

#[tokio::test]
async fn duplicate_ids_in_one_batch_collapse() {
    let collection = hashing_collection(Arc::new(InMemoryVectorStore::new())).await;
    let repeated = chunk("Component costs kept falling.", "https://a.example");

    let ingested = collection.ingest(&[repeated.clone(), repeated]).await.unwrap();

    assert_eq!(ingested, 1);
    assert_eq!(collection.count().await.unwrap(), 1);
}

#[tokio::test]
async fn search_finds_closest_chunk_and_respects_n() {
    let collection = hashing_collection(Arc::new(InMemoryVectorStore::new())).await;
    collection
        .ingest(&[
            chunk("Humanoid robot shipments doubled in 2024.", "a"),
            chunk("Battery prices fell for the third straight year.", "a"),
            chunk("Regional airlines added routes this summer.", "a"),
        ])
        .await
        .unwrap();

    let candidates = collection.search("battery prices", 2).await.unwrap();

    assert_eq!(candidates.len(), 2);
    assert!(candidates[0].text.starts_with("Battery prices"));
    assert!(candidates[0].similarity_score >= candidates[1].similarity_score);
    assert!(collection.search("battery prices", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_collection_search_is_empty() {
    let collection = hashing_collection(Arc::new(InMemoryVectorStore::new())).await;
    assert!(collection.search("anything", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn reset_empties_and_collection_stays_usable() {
    let collection = hashing_collection(Arc::new(InMemoryVectorStore::new())).await;
    collection.ingest(&[chunk("Humanoid robot shipments doubled.", "a")]).await.unwrap();

    collection.reset().await.unwrap();
    assert_eq!(collection.count().await.unwrap(), 0);
    assert!(collection.search("robot", 5).await.unwrap().is_empty());

    collection.ingest(&[chunk("Battery prices fell again.", "b")]).await.unwrap();
    assert_eq!(collection.count().await.unwrap(), 1);
}

#[tokio::test]
async fn reset_never_drops_the_backing_collection() {
    let store = Arc::new(ScriptedStore { fail_later_creates: true, ..Default::default() });
    let collection = hashing_collection(store.clone()).await;
    collection.ingest(&[chunk("Humanoid robot shipments doubled.", "a")]).await.unwrap();

    collection.reset().await.unwrap();

    assert_eq!(collection.count().await.unwrap(), 0);
    assert!(collection.search("robot", 5).await.unwrap().is_empty());
    collection.ingest(&[chunk("Battery prices fell again.", "b")]).await.unwrap();
    assert_eq!(collection.count().await.unwrap(), 1);
}

#[tokio::test]
async fn failed_reset_keeps_previous_contents_usable() {
    let store = Arc::new(ScriptedStore::default());
    let collection = hashing_collection(store.clone()).await;
    collection.ingest(&[chunk("Humanoid robot shipments doubled.", "a")]).await.unwrap();
    store.fail_clear.store(true, Ordering::SeqCst);

    let err = collection.reset().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(collection.count().await.unwrap(), 1);
    assert_eq!(collection.search("robot", 5).await.unwrap().len(), 1);
    collection.ingest(&[chunk("Battery prices fell again.", "b")]).await.unwrap();
    assert_eq!(collection.count().await.unwrap(), 2);
}

#[tokio::test]
async fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let chunks = [
        chunk("Humanoid robot shipments doubled in 2024.", "a"),
        chunk("Battery prices fell for the third straight year.", "a"),
    ];

    {
        let store = Arc::new(FileVectorStore::open(dir.path()).await.unwrap());
        let collection = hashing_collection(store).await;
        collection.ingest(&chunks).await.unwrap();
    }

    let store = Arc::new(FileVectorStore::open(dir.path()).await.unwrap());
    let collection = hashing_collection(store).await;
    assert_eq!(collection.count().await.unwrap(), 2);

    collection.ingest(&chunks).await.unwrap();
    assert_eq!(collection.count().await.unwrap(), 2);

    let candidates = collection.search("humanoid robot", 1).await.unwrap();
    assert!(candidates[0].text.starts_with("Humanoid"));
}

#[tokio::test]
async fn file_store_reset_persists() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Arc::new(FileVectorStore::open(dir.path()).await.unwrap());
        let collection = hashing_collection(store).await;
        collection.ingest(&[chunk("Humanoid robot shipments doubled.", "a")]).await.unwrap();
        collection.reset().await.unwrap();
    }

    let store = Arc::new(FileVectorStore::open(dir.path()).await.unwrap());
    let collection = hashing_collection(store).await;
    assert_eq!(collection.count().await.unwrap(), 0);
}

#[tokio::test]
async fn file_store_rejects_reopen_with_other_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileVectorStore::open(dir.path()).await.unwrap();
    store.create_collection("reports", 8).await.unwrap();
    drop(store);

    let store = FileVectorStore::open(dir.path()).await.unwrap();
    let err = store.create_collection("reports", 16).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

#[tokio::test]
async fn file_store_rejects_path_like_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileVectorStore::open(dir.path()).await.unwrap();
    assert!(store.create_collection("../escape", 8).await.is_err());
}

#[tokio::test]
async fn search_during_ingest_sees_whole_batch() {
    let store = Arc::new(ScriptedStore::default());
    let collection = Arc::new(hashing_collection(store.clone()).await);
    let batch: Vec<Chunk> = (0..20)
        .map(|i| chunk(&format!("Robot market note number {i} with details."), "a"))
        .collect();

    let writer = {
        let collection = Arc::clone(&collection);
        tokio::spawn(async move { collection.ingest(&batch).await.unwrap() })
    };

    // The backend now holds one chunk of twenty; the search must wait.
    store.first_write.notified().await;
    let seen = collection.search("robot market", 50).await.unwrap().len();

    assert_eq!(seen, 20, "search observed a partial batch of {seen}");
    assert_eq!(writer.await.unwrap(), 20);
}

#[tokio::test]
async fn file_store_delete_by_id_persists() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileVectorStore::open(dir.path()).await.unwrap();
    store.create_collection("reports", 2).await.unwrap();
    store
        .upsert("reports", &[embedded("a", vec![1.0, 0.0]), embedded("b", vec![0.0, 1.0])])
        .await
        .unwrap();
    store.delete("reports", &["a", "missing"]).await.unwrap();
    drop(store);

    let store = FileVectorStore::open(dir.path()).await.unwrap();
    store.create_collection("reports", 2).await.unwrap();
    let matches = store.search("reports", &[1.0, 0.0], 5).await.unwrap();
    let ids: Vec<String> = matches.into_iter().map(|m| m.chunk.id).collect();
    assert_eq!(ids, ["b"]);
}

#[tokio::test]
async fn file_store_clear_and_delete_collection() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileVectorStore::open(dir.path()).await.unwrap();
    store.create_collection("reports", 2).await.unwrap();
    store.upsert("reports", &[embedded("a", vec![1.0, 0.0])]).await.unwrap();

    store.clear_collection("reports", 2).await.unwrap();
    assert_eq!(store.count("reports").await.unwrap(), 0);
    assert!(dir.path().join("reports.json").exists());

    store.delete_collection("reports").await.unwrap();
    assert!(!dir.path().join("reports.json").exists());
    let err = store.count("reports").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
}
