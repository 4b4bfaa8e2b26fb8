//! # Driftline Core
//!
//! Domain types, traits, and error definitions for the Driftline
//! conversational agent. This crate defines the domain model that all other
//! crates implement against.
//!
//! ## Design Philosophy
//!
//! The seams between subsystems are traits defined here. Implementations live
//! in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod chat;
pub mod error;
pub mod message;
pub mod retry;
pub mod search;

// Re-export key types at crate root for ergonomics
pub use chat::{BusyHook, ChatBackend};
pub use error::{ChatError, Error, MemoryError, Result, SearchError};
pub use message::{Message, Role};
pub use retry::run_with_retry;
pub use search::{SearchOutcome, SearchResult, SearchTool};
