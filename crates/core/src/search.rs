//! Search domain types and the SearchTool trait.
//!
//! The orchestrated search pipeline lives in its own crate; the agent loop
//! only sees this trait, which makes the loop testable with stub searchers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// One organic search result: link metadata only, never page content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// The outcome of one search query: up to three results, in rank order.
/// Zero results is a valid, cacheable success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,

    #[serde(rename = "noResults")]
    pub no_results: bool,
}

impl SearchOutcome {
    /// Build an outcome from a result list, deriving the `no_results` flag.
    pub fn from_results(results: Vec<SearchResult>) -> Self {
        let no_results = results.is_empty();
        Self {
            results,
            no_results,
        }
    }
}

/// The web retrieval trait the agent loop executes tool calls against.
#[async_trait]
pub trait SearchTool: Send + Sync {
    /// Resolve a query to link/snippet metadata.
    async fn search(&self, query: &str) -> std::result::Result<SearchOutcome, SearchError>;

    /// Fetch one page and reduce it to plain text.
    async fn fetch_page(&self, url: &str) -> std::result::Result<String, SearchError>;
}
