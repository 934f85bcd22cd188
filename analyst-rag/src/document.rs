//! Data types for documents, chunks, candidates and ranked results.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a [`Document`] came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentOrigin {
    /// Text returned by a web search provider.
    SearchResult,
    /// Text uploaded by a user.
    UploadedFile,
}

impl DocumentOrigin {
    /// The metadata value recorded for this origin.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentOrigin::SearchResult => "search-result",
            DocumentOrigin::UploadedFile => "uploaded-file",
        }
    }
}

impl fmt::Display for DocumentOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of externally sourced text awaiting ingestion.
///
/// Documents are never persisted; after ingestion they exist only as
/// [`Chunk`]s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The raw text content.
    pub text: String,
    /// Where the text came from.
    pub origin: DocumentOrigin,
    /// Source identifier: a URL for search results, a filename for uploads.
    pub source: String,
    /// Optional title reported by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Extra key-value metadata copied onto every chunk.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// A document returned by a web search.
    pub fn search_result(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: DocumentOrigin::SearchResult,
            source: source.into(),
            title: None,
            metadata: HashMap::new(),
        }
    }

    /// A document uploaded by a user.
    pub fn uploaded(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: DocumentOrigin::UploadedFile,
            source: source.into(),
            title: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach a title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A passage prepared for embedding and storage.
///
/// The `id` is derived from the passage text and its source (see
/// [`chunk_id`]), so re-ingesting identical content overwrites instead of
/// duplicating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Content-derived identifier.
    pub id: String,
    /// The passage text.
    pub text: String,
    /// Provenance metadata. Never used to filter retrieval.
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Create a chunk whose id is derived from `text` and `source`.
    ///
    /// `source` is also recorded under the `source` metadata key.
    pub fn new(
        text: impl Into<String>,
        source: &str,
        mut metadata: HashMap<String, String>,
    ) -> Self {
        let text = text.into();
        metadata.insert("source".to_string(), source.to_string());
        Self { id: chunk_id(&text, source), text, metadata }
    }

    /// The `source` metadata value, if recorded.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }
}

/// Derive a stable chunk id from passage text and its source identifier.
///
/// Whitespace runs are collapsed before hashing so formatting-only
/// differences map to the same id.
pub fn chunk_id(text: &str, source: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update([0x1f]);
    hasher.update(source.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// A chunk returned by broad vector search, before reranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// The chunk id.
    pub id: String,
    /// The chunk text.
    pub text: String,
    /// Embedding-space similarity (higher is more similar). Not calibrated
    /// across queries.
    pub similarity_score: f32,
}

/// A candidate after precision reranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedResult {
    /// The chunk id.
    pub id: String,
    /// The chunk text.
    pub text: String,
    /// Model-specific relevance, comparable only within one rerank call.
    pub relevance_score: f32,
}
