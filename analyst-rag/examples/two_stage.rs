//! # Two-Stage Retrieval Example
//!
//! Ingests a handful of market-research snippets (as if returned by a web
//! search) plus an uploaded report, then answers queries with vector recall
//! followed by reranking.
//!
//! Runs fully offline: `HashingEmbedder` for embeddings, `LexicalScorer` for
//! reranking, and a `FileVectorStore` in a temporary directory. The second
//! pass reopens the store to show that chunks survive a restart.
//!
//! Run: `RUST_LOG=analyst_rag=debug cargo run --example two_stage`

use std::sync::Arc;

use analyst_rag::{
    Document, EmbeddingCollection, FileVectorStore, HashingEmbedder, LexicalScorer,
    RetrieverConfig, ScoringReranker, TwoStageRetriever, format_context,
};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Sample corpus
// ---------------------------------------------------------------------------

fn search_results() -> Vec<Document> {
    vec![
        Document::search_result(
            "https://robotics.example/outlook-2025",
            "# Humanoid Robots Outlook\n\n\
             The global humanoid robot market size reached an estimated 2.1 billion \
             dollars in 2024, driven by pilot deployments in automotive plants.\n\n\
             Analysts expect unit costs to fall below 50,000 dollars as actuator \
             supply chains mature and production volumes scale.",
        )
        .with_title("Humanoid Robots Outlook"),
        Document::search_result(
            "https://energy.example/battery-prices",
            "Battery pack prices fell for the third consecutive year, averaging \
             115 dollars per kilowatt-hour.\n\n\
             Cell manufacturers added capacity in Europe and North America, \
             easing the supply constraints seen in 2022.",
        )
        .with_title("Battery Price Survey"),
    ]
}

const UPLOADED_REPORT: &str = "Q3 Internal Notes\n\n\
    Our humanoid robot pilot with two automotive customers completed its first \
    phase; both customers asked for expanded deployments next year.\n\n\
    ok\n\n\
    Component sourcing remains the main risk: harmonic reducers have a \
    twenty-week lead time.";

async fn build_retriever(store_dir: &std::path::Path) -> analyst_rag::Result<TwoStageRetriever> {
    let config = RetrieverConfig::builder().recall_n(6).rerank_k(3).build()?;

    let collection = EmbeddingCollection::open(
        config.collection_name.clone(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(FileVectorStore::open(store_dir).await?),
        config.retry_policy(),
    )
    .await?;

    TwoStageRetriever::builder()
        .config(config)
        .collection(Arc::new(collection))
        .reranker(Arc::new(ScoringReranker::new(Arc::new(LexicalScorer::default()))))
        .build()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("analyst_rag=info")),
        )
        .init();

    let store_dir = tempfile::tempdir()?;

    // -- First run: ingest ---------------------------------------------------

    let retriever = build_retriever(store_dir.path()).await?;
    let query = "humanoid robot market size";

    let from_search = retriever.ingest_search_results(query, &search_results()).await?;
    let from_upload = retriever.ingest_raw_text(UPLOADED_REPORT, "q3_internal_notes.txt").await?;
    println!("Ingested {from_search} chunks from search and {from_upload} from the upload");
    println!("Collection holds {} chunks\n", retriever.count().await?);

    for query in [query, "battery prices per kilowatt-hour", "supply risk for components"] {
        let results = retriever.retrieve_default(query).await?;
        println!("Query: {query}");
        for (rank, result) in results.iter().enumerate() {
            println!("  {}. [{:.3}] {}", rank + 1, result.relevance_score, result.text);
        }
        println!();
    }

    drop(retriever);

    // -- Second run: reopen the same store ---------------------------------

    let retriever = build_retriever(store_dir.path()).await?;
    println!("After reopening, collection holds {} chunks", retriever.count().await?);

    let passages = retriever.retrieve_default("automotive pilot deployments").await?;
    println!("\nContext block for generation:\n{}", format_context(&passages));

    retriever.reset().await?;
    println!("\nAfter reset, collection holds {} chunks", retriever.count().await?);

    Ok(())
}
