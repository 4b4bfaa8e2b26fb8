//! Chat endpoint transport for Driftline.
//!
//! Implements `driftline_core::ChatBackend` against an Ollama-compatible
//! `/api/chat` endpoint, including the incremental think-tag filter that
//! separates user-visible text from the model's embedded reasoning stream,
//! and the background heartbeat that keeps the endpoint's model loaded.

pub mod heartbeat;
pub mod ollama;
pub mod think;

pub use heartbeat::run_heartbeat;
pub use ollama::OllamaClient;
pub use think::ThinkTagFilter;
