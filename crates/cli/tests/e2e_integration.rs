//! End-to-end tests for the Driftline turn pipeline.
//!
//! These exercise the full path from user input to persisted exchange:
//! probe call, tool-call extraction, search execution, result splicing, the
//! streamed final answer, and conversation memory durability across a
//! restart.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use driftline_agent::AgentLoop;
use driftline_core::{
    ChatBackend, ChatError, Message, Role, SearchError, SearchOutcome, SearchResult, SearchTool,
};
use driftline_memory::ConversationLog;
use tokio::sync::RwLock;
use tokio::sync::mpsc::Receiver;

// ── Scripted collaborators ──────────────────────────────────────────────

/// Chat backend that replays scripted probe responses and stream chunks.
struct ScriptedBackend {
    completions: Mutex<VecDeque<String>>,
    stream_pieces: Vec<String>,
    complete_calls: AtomicU32,
}

impl ScriptedBackend {
    fn new(completions: Vec<&str>, stream_pieces: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            completions: Mutex::new(completions.into_iter().map(String::from).collect()),
            stream_pieces: stream_pieces.into_iter().map(String::from).collect(),
            complete_calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _messages: &[Message]) -> Result<String, ChatError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn stream(
        &self,
        _messages: &[Message],
    ) -> Result<Receiver<Result<String, ChatError>>, ChatError> {
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let pieces = self.stream_pieces.clone();
        tokio::spawn(async move {
            for piece in pieces {
                if tx.send(Ok(piece)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

/// Search tool that serves one fixed result and one fixed page.
struct ScriptedSearch {
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SearchTool for ScriptedSearch {
    async fn search(&self, query: &str) -> Result<SearchOutcome, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(SearchOutcome::from_results(vec![SearchResult {
            title: "Solana price today".into(),
            url: "https://prices.example.com/sol".into(),
            snippet: "SOL/USD live".into(),
        }]))
    }

    async fn fetch_page(&self, _url: &str) -> Result<String, SearchError> {
        Ok("Solana (SOL) is trading at $95.12, up 3% on the day.".into())
    }
}

async fn drain(mut rx: Receiver<Result<String, ChatError>>) -> String {
    let mut full = String::new();
    while let Some(piece) = rx.recv().await {
        full.push_str(&piece.expect("stream should complete cleanly"));
    }
    full
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn tool_call_turn_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let memory_path = dir.path().join("memory.json");
    let memory = Arc::new(RwLock::new(ConversationLog::load(
        memory_path.clone(),
        15,
        "system prompt",
    )));

    let backend = ScriptedBackend::new(
        vec!["<tool_call><tool>search</tool><query>current price of solana</query></tool_call>"],
        vec!["SOL is trading around ", "$95."],
    );
    let search = ScriptedSearch::new();

    let agent = AgentLoop::new(backend.clone(), search.clone(), memory.clone())
        .with_retry(0, Duration::from_millis(1));

    let rx = agent.process_turn("What's the price of SOL?").await.unwrap();
    assert_eq!(drain(rx).await, "SOL is trading around $95.");

    // One probe on the default budget, with the query the model asked for.
    assert_eq!(backend.complete_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        search.queries.lock().unwrap().as_slice(),
        ["current price of solana"]
    );

    // Only the final exchange is persisted — no tool traffic in memory.
    {
        let log = memory.read().await;
        let msgs = log.messages();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1].content, "What's the price of SOL?");
        assert_eq!(msgs[2].content, "SOL is trading around $95.");
        assert!(msgs.iter().all(|m| !m.content.contains("<tool_result>")));
    }

    // The exchange survives a restart.
    let reloaded = ConversationLog::load(memory_path, 15, "system prompt");
    assert_eq!(reloaded.messages().len(), 3);
    assert_eq!(reloaded.messages()[0].role, Role::System);
    assert_eq!(reloaded.messages()[2].content, "SOL is trading around $95.");
}

#[tokio::test]
async fn plain_turn_never_touches_the_search_tool() {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(RwLock::new(ConversationLog::load(
        dir.path().join("memory.json"),
        15,
        "system prompt",
    )));

    let backend = ScriptedBackend::new(vec!["Rust is a systems language."], vec!["Rust."]);
    let search = ScriptedSearch::new();

    let agent = AgentLoop::new(backend, search.clone(), memory)
        .with_retry(0, Duration::from_millis(1));

    let rx = agent.process_turn("What is Rust?").await.unwrap();
    assert_eq!(drain(rx).await, "Rust.");
    assert!(search.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn consecutive_turns_share_bounded_memory() {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(RwLock::new(ConversationLog::load(
        dir.path().join("memory.json"),
        4,
        "system prompt",
    )));

    // Every probe is a direct answer; each turn streams the same reply.
    let backend = ScriptedBackend::new(vec!["a1", "a2", "a3"], vec!["answer"]);
    let search = ScriptedSearch::new();

    let agent = AgentLoop::new(backend, search, memory.clone())
        .with_retry(0, Duration::from_millis(1));

    for i in 0..3 {
        let rx = agent.process_turn(&format!("question {i}")).await.unwrap();
        drain(rx).await;
    }

    // Limit 4 keeps the two newest pairs; the system prompt stays pinned.
    let log = memory.read().await;
    assert_eq!(log.history_len(), 4);
    assert_eq!(log.messages()[0].role, Role::System);
    assert_eq!(log.messages()[1].content, "question 1");
}
