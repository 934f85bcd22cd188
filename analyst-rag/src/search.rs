//! Web search provider interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::Result;

/// Source recorded for hits that carry no URL.
const LOCAL_SOURCE: &str = "local";

/// One web document returned by a search provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// Page title, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Page URL.
    #[serde(default)]
    pub url: String,
    /// Extracted page text.
    #[serde(default)]
    pub content: String,
}

impl SearchHit {
    /// Convert into a search-result [`Document`] sourced from the hit's URL.
    pub fn into_document(self) -> Document {
        let source = if self.url.trim().is_empty() { LOCAL_SOURCE.to_string() } else { self.url };
        let document = Document::search_result(source, self.content);
        match self.title {
            Some(title) => document.with_title(title),
            None => document,
        }
    }
}

/// A provider that answers a query with a list of web documents.
///
/// Callers route every search through a
/// [`RetryPolicy`](crate::RetryPolicy); implementations should classify
/// failures with the matching [`RagError`](crate::RagError) kind.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search the web for `query`.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;

    /// A short name used in logs and errors.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentOrigin;

    #[test]
    fn hit_without_url_is_local() {
        let hit = SearchHit { title: Some("t".into()), url: " ".into(), content: "body".into() };
        let document = hit.into_document();
        assert_eq!(document.source, "local");
        assert_eq!(document.origin, DocumentOrigin::SearchResult);
        assert_eq!(document.title.as_deref(), Some("t"));
    }
}
