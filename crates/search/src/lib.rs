//! Tiered web search for Driftline.
//!
//! [`SearchClient`] resolves a query through three providers in strict order
//! (SERP scrape, Brave API, Google Custom Search) with a persistent TTL cache
//! in front, and reduces result pages to plain text for the agent loop.

pub mod cache;
pub mod client;

pub use cache::SearchCache;
pub use client::SearchClient;
