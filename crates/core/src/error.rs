//! Error types for the Driftline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all Driftline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Chat endpoint errors ---
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    // --- Search errors ---
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the chat completion endpoint.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// The endpoint answered with a non-success status before any content
    /// was produced.
    #[error("Chat endpoint returned HTTP {status}: {message}")]
    Transport { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    /// The byte stream died after the response headers were accepted.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Malformed chat response: {0}")]
    MalformedResponse(String),
}

/// Failures in the tiered search pipeline and page scraping.
#[derive(Debug, Error)]
pub enum SearchError {
    /// HTTP 429 from the scrape tier — the one failure that opens the
    /// API fallback chain.
    #[error("Search engine rate-limited the request (HTTP 429)")]
    RateLimited,

    #[error("Search tier returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    /// A tier's credential is missing — counts as that tier failing.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// Fetching or scraping a result page failed. Always propagated; the
    /// caller decides whether to try the next candidate URL.
    #[error("Failed to fetch page {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Every tier failed. Wraps the last tier's failure unmodified.
    #[error("All search tiers failed")]
    Exhausted {
        #[source]
        source: Box<SearchError>,
    },
}

/// Conversation/cache persistence failures. Always logged at the owning
/// component's boundary, never fatal, never rolls back in-memory state.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_error_displays_status() {
        let err = Error::Chat(ChatError::Transport {
            status: 503,
            message: "upstream unavailable".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[test]
    fn exhausted_preserves_cause() {
        use std::error::Error as _;

        let err = SearchError::Exhausted {
            source: Box::new(SearchError::Http {
                status: 500,
                message: "boom".into(),
            }),
        };
        let cause = err.source().expect("exhausted must carry its cause");
        assert!(cause.to_string().contains("500"));
    }

    #[test]
    fn not_configured_names_the_credential() {
        let err = SearchError::NotConfigured("Brave API key");
        assert!(err.to_string().contains("Brave API key"));
    }
}
