//! Ollama-compatible chat transport.
//!
//! Talks to `{base}/api/chat`. Streaming responses arrive as newline-delimited
//! JSON objects, each optionally carrying an incremental `message.content`
//! fragment; a spawned reader task line-buffers the byte stream, routes every
//! fragment through a [`ThinkTagFilter`], and forwards only user-visible text
//! over an mpsc channel.

use async_trait::async_trait;
use driftline_core::{BusyHook, ChatBackend, ChatError, Message};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::think::ThinkTagFilter;

/// Chat backend for an Ollama-compatible endpoint.
pub struct OllamaClient {
    base_url: String,
    model: String,
    keep_alive: String,
    client: reqwest::Client,
    busy_hook: Option<BusyHook>,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        keep_alive: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            keep_alive: keep_alive.into(),
            client: reqwest::Client::new(),
            busy_hook: None,
        }
    }

    /// Attach a busy indicator hook, raised on every request and cleared when
    /// a response (or failure) arrives.
    pub fn with_busy_hook(mut self, hook: BusyHook) -> Self {
        self.busy_hook = Some(hook);
        self
    }

    /// Use a specific model for this client (e.g. a vision-capable one).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn busy(&self, on: bool) {
        if let Some(hook) = &self.busy_hook {
            hook(on);
        }
    }

    async fn send_request(
        &self,
        messages: &[Message],
        stream: bool,
    ) -> Result<reqwest::Response, ChatError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream,
            keep_alive: &self.keep_alive,
        };

        debug!(model = %self.model, stream, "Sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %message, "Chat endpoint returned error");
            return Err(ChatError::Transport {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, ChatError> {
        self.busy(true);
        let result = self.send_request(messages, false).await;
        let response = match result {
            Ok(r) => r,
            Err(e) => {
                self.busy(false);
                return Err(e);
            }
        };

        let parsed: Result<ChatResponse, _> = response.json().await;
        self.busy(false);

        let parsed =
            parsed.map_err(|e| ChatError::MalformedResponse(format!("invalid JSON body: {e}")))?;
        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }

    async fn stream(
        &self,
        messages: &[Message],
    ) -> Result<tokio::sync::mpsc::Receiver<Result<String, ChatError>>, ChatError> {
        self.busy(true);
        let result = self.send_request(messages, true).await;
        // The indicator clears as soon as headers arrive; from here on the
        // caller is watching the streamed text itself.
        self.busy(false);
        let response = result?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            use futures::StreamExt;

            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut filter = ThinkTagFilter::new();
            let mut first_visible = true;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ChatError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines; the tail stays buffered until its
                // newline arrives.
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if !line.trim_start().starts_with('{') {
                        continue;
                    }

                    let fragment = match serde_json::from_str::<ChatResponse>(&line) {
                        Ok(resp) => resp.message.map(|m| m.content).unwrap_or_default(),
                        Err(e) => {
                            trace!(error = %e, "Ignoring unparseable stream line");
                            continue;
                        }
                    };

                    let mut visible = filter.push(&fragment);
                    if first_visible && !visible.is_empty() {
                        visible = visible.trim_start().to_string();
                        if visible.is_empty() {
                            continue;
                        }
                        first_visible = false;
                    }

                    if !visible.is_empty() && tx.send(Ok(visible)).await.is_err() {
                        return; // receiver dropped
                    }
                }
            }
        });

        Ok(rx)
    }
}

// --- Wire types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    keep_alive: &'a str,
}

/// One response object — the whole body when non-streaming, one NDJSON line
/// when streaming.
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn collect(
        mut rx: tokio::sync::mpsc::Receiver<Result<String, ChatError>>,
    ) -> Result<String, ChatError> {
        let mut full = String::new();
        while let Some(piece) = rx.recv().await {
            full.push_str(&piece?);
        }
        Ok(full)
    }

    fn ndjson(lines: &[&str]) -> String {
        let mut body = lines.join("\n");
        body.push('\n');
        body
    }

    #[tokio::test]
    async fn streams_visible_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(ndjson(&[
                r#"{"message":{"content":"Hello"},"done":false}"#,
                r#"{"message":{"content":" world"},"done":false}"#,
                r#"{"message":{"content":""},"done":true}"#,
            ]))
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), "test-model", "15m");
        let rx = client.stream(&[Message::user("hi")]).await.unwrap();
        assert_eq!(collect(rx).await.unwrap(), "Hello world");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn suppresses_think_blocks_across_lines() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(ndjson(&[
                r#"{"message":{"content":"<think>step one"},"done":false}"#,
                r#"{"message":{"content":"step two</think>"},"done":false}"#,
                r#"{"message":{"content":"The answer is 4."},"done":true}"#,
            ]))
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), "test-model", "15m");
        let rx = client.stream(&[Message::user("2+2?")]).await.unwrap();
        assert_eq!(collect(rx).await.unwrap(), "The answer is 4.");
    }

    #[tokio::test]
    async fn trims_leading_whitespace_on_first_piece_only() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(ndjson(&[
                r#"{"message":{"content":"\n\n  Hi"},"done":false}"#,
                r#"{"message":{"content":" there,  friend"},"done":true}"#,
            ]))
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), "test-model", "15m");
        let rx = client.stream(&[Message::user("hi")]).await.unwrap();
        // Interior whitespace of later pieces is untouched.
        assert_eq!(collect(rx).await.unwrap(), "Hi there,  friend");
    }

    #[tokio::test]
    async fn whitespace_only_first_fragment_does_not_consume_the_trim() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(ndjson(&[
                r#"{"message":{"content":"\n"},"done":false}"#,
                r#"{"message":{"content":"  Answer"},"done":true}"#,
            ]))
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), "test-model", "15m");
        let rx = client.stream(&[Message::user("hi")]).await.unwrap();
        assert_eq!(collect(rx).await.unwrap(), "Answer");
    }

    #[tokio::test]
    async fn non_success_status_fails_before_any_chunk() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(500)
            .with_body("model not loaded")
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), "test-model", "15m");
        let err = client.stream(&[Message::user("hi")]).await.unwrap_err();
        match err {
            ChatError::Transport { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("model not loaded"));
            }
            other => panic!("expected Transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn skips_non_json_lines() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(ndjson(&[
                "garbage line",
                r#"{"message":{"content":"ok"},"done":true}"#,
            ]))
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), "test-model", "15m");
        let rx = client.stream(&[Message::user("hi")]).await.unwrap();
        assert_eq!(collect(rx).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn complete_returns_full_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"stream":false}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"message":{"role":"assistant","content":"full answer"},"done":true}"#)
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), "test-model", "15m");
        let content = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(content, "full answer");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn complete_does_not_strip_think_blocks() {
        // Tool-call extraction runs over the raw probe text, so the
        // non-streaming path must leave reasoning blocks in place.
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"message":{"content":"<think>hmm</think>answer"},"done":true}"#)
            .create_async()
            .await;

        let client = OllamaClient::new(server.url(), "test-model", "15m");
        let content = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(content, "<think>hmm</think>answer");
    }

    #[tokio::test]
    async fn busy_hook_raised_and_cleared() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"message":{"content":"hi"},"done":true}"#)
            .create_async()
            .await;

        let raised = Arc::new(AtomicU32::new(0));
        let cleared = Arc::new(AtomicU32::new(0));
        let (r, c) = (raised.clone(), cleared.clone());
        let hook: BusyHook = Arc::new(move |on| {
            if on {
                r.fetch_add(1, Ordering::SeqCst);
            } else {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        let client =
            OllamaClient::new(server.url(), "test-model", "15m").with_busy_hook(hook);
        client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(raised.load(Ordering::SeqCst), 1);
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn busy_hook_cleared_on_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(503)
            .create_async()
            .await;

        let cleared = Arc::new(AtomicU32::new(0));
        let c = cleared.clone();
        let hook: BusyHook = Arc::new(move |on| {
            if !on {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        let client =
            OllamaClient::new(server.url(), "test-model", "15m").with_busy_hook(hook);
        assert!(client.complete(&[Message::user("hi")]).await.is_err());
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }
}
