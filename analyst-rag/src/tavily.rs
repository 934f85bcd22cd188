//! Tavily web search provider.
//!
//! This module is only available when the `tavily` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RagError, Result};
use crate::http::{decode_error, request_error, status_error};
use crate::search::{SearchHit, SearchProvider};

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const PROVIDER: &str = "Tavily";

/// A [`SearchProvider`] backed by the Tavily search API.
///
/// Defaults to `advanced` search depth and five results per query.
pub struct TavilySearchProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    search_depth: String,
    max_results: usize,
}

impl TavilySearchProvider {
    /// Create a provider with the given API key.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Config("Tavily API key must not be empty".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: TAVILY_SEARCH_URL.to_string(),
            search_depth: "advanced".to_string(),
            max_results: 5,
        })
    }

    /// Create a provider using the `TAVILY_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("TAVILY_API_KEY").map_err(|_| {
            RagError::Config("TAVILY_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key)
    }

    /// Set the number of results requested per query.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Set the search depth (`basic` or `advanced`).
    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    /// Send requests to another endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        debug!(provider = PROVIDER, query, max_results = self.max_results, "web search");

        let body = SearchRequest {
            api_key: &self.api_key,
            query,
            search_depth: &self.search_depth,
            max_results: self.max_results,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, &e))?;

        if !response.status().is_success() {
            return Err(status_error(PROVIDER, response).await);
        }

        let search: SearchResponse = response.json().await.map_err(|e| decode_error(PROVIDER, e))?;
        Ok(search.results)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
