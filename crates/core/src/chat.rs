//! ChatBackend trait — the abstraction over the chat completion endpoint.
//!
//! A backend knows how to send a conversation to the model and get a response
//! back, either whole or as a stream of user-visible text pieces. The agent
//! loop calls `complete()` during tool iterations and `stream()` for the
//! final answer without knowing which transport is behind the trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ChatError;
use crate::message::Message;

/// A pre/post "thinking" signal raised around each request so the shell can
/// paint and clear a busy indicator. Invoked with `true` when a request goes
/// out and `false` once a response (or failure) arrives. Presentation is the
/// caller's concern, not the backend's.
pub type BusyHook = Arc<dyn Fn(bool) + Send + Sync>;

/// The chat transport trait.
///
/// Streaming yields only user-visible text: any reasoning sub-stream embedded
/// in the model output has already been filtered out by the implementation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// A human-readable name for this backend (e.g. "ollama").
    fn name(&self) -> &str;

    /// Send the conversation and return the assistant's full content.
    ///
    /// The content is returned raw — reasoning blocks are not stripped here,
    /// because tool-call extraction runs over the unfiltered text.
    async fn complete(&self, messages: &[Message]) -> std::result::Result<String, ChatError>;

    /// Send the conversation and stream back visible text pieces.
    ///
    /// Fails before yielding anything if the connection or response status is
    /// not successful. Errors after the first byte arrive as
    /// `ChatError::StreamInterrupted` items and terminate the stream.
    async fn stream(
        &self,
        messages: &[Message],
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<String, ChatError>>,
        ChatError,
    >;
}
