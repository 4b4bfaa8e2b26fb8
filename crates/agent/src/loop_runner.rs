//! The agentic turn loop.
//!
//! Each user turn runs a bounded number of non-streaming probe calls against
//! the model. When a probe emits a well-formed `search` tool call, the loop
//! executes it, splices the result back into the working message list, and
//! probes again if the budget allows. The turn always ends with one streaming
//! call whose visible text goes to the caller; only the final user/assistant
//! pair is persisted to conversation memory — tool traffic stays transient.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use driftline_core::{
    ChatBackend, ChatError, Error, Message, SearchError, SearchTool, run_with_retry,
};
use driftline_memory::ConversationLog;
use tokio::sync::RwLock;
use tokio::sync::mpsc::Receiver;
use tracing::{info, warn};

use crate::tool_call::{ToolDirective, parse_tool_directive};

/// Formats the current moment for tool-result context blocks. Injected so
/// the shell owns presentation concerns like time formatting.
pub type DateTimeFn = Arc<dyn Fn() -> String + Send + Sync>;

fn default_datetime() -> String {
    Local::now().format("%A, %B %-d, %Y, %-I:%M %p").to_string()
}

/// Orchestrates LLM round-trips and tool execution for one turn at a time.
pub struct AgentLoop {
    backend: Arc<dyn ChatBackend>,
    search: Arc<dyn SearchTool>,
    memory: Arc<RwLock<ConversationLog>>,
    max_iterations: u32,
    escalated_iterations: u32,
    complex_keywords: Vec<String>,
    max_content_chars: usize,
    retry_attempts: u32,
    retry_delay: Duration,
    datetime_fn: DateTimeFn,
}

impl AgentLoop {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        search: Arc<dyn SearchTool>,
        memory: Arc<RwLock<ConversationLog>>,
    ) -> Self {
        Self {
            backend,
            search,
            memory,
            max_iterations: 1,
            escalated_iterations: 3,
            complex_keywords: Vec::new(),
            max_content_chars: 11_400,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            datetime_fn: Arc::new(default_datetime),
        }
    }

    /// Set the ordinary and escalated per-turn iteration budgets.
    pub fn with_budgets(mut self, max_iterations: u32, escalated_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self.escalated_iterations = escalated_iterations;
        self
    }

    /// Keywords that escalate the iteration budget for a turn.
    pub fn with_complex_keywords(mut self, keywords: Vec<String>) -> Self {
        self.complex_keywords = keywords;
        self
    }

    /// Hard cap on scraped page content bundled into a tool result.
    pub fn with_max_content_chars(mut self, max: usize) -> Self {
        self.max_content_chars = max;
        self
    }

    /// Retry policy for every LLM call in the loop.
    pub fn with_retry(mut self, attempts: u32, initial_delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = initial_delay;
        self
    }

    pub fn with_datetime_fn(mut self, f: DateTimeFn) -> Self {
        self.datetime_fn = f;
        self
    }

    /// How many tool iterations this input gets.
    fn iteration_budget(&self, input: &str) -> u32 {
        let lower = input.to_lowercase();
        for keyword in &self.complex_keywords {
            if lower.contains(keyword.as_str()) {
                info!(
                    keyword = %keyword,
                    budget = self.escalated_iterations,
                    "Complex prompt detected, escalating iteration budget"
                );
                return self.escalated_iterations;
            }
        }
        self.max_iterations
    }

    /// Process one user turn: tool iterations, then a streamed final answer.
    ///
    /// The returned receiver yields visible text chunks. On clean stream
    /// completion the (input, full response) pair is appended to conversation
    /// memory; an interrupted stream forwards its error and leaves memory
    /// untouched for the turn.
    pub async fn process_turn(
        &self,
        input: &str,
    ) -> Result<Receiver<Result<String, ChatError>>, Error> {
        let mut working = self.memory.read().await.messages().to_vec();
        working.push(Message::user(input));

        let budget = self.iteration_budget(input);
        for _ in 0..budget {
            let probe = run_with_retry(
                || self.backend.complete(&working),
                self.retry_attempts,
                self.retry_delay,
            )
            .await?;

            match parse_tool_directive(&probe) {
                ToolDirective::None => break,
                ToolDirective::Malformed { .. } => {
                    // Discard the bad call rather than retrying it.
                    warn!("Model attempted an unrecognized tool call, answering directly");
                    break;
                }
                ToolDirective::Recognized { block, query } => {
                    info!(query = %query, "Model requested a web search");
                    working.push(Message::assistant(block));
                    let tool_result = self.run_search(&query).await?;
                    working.push(Message::user(format!(
                        "<tool_result>\n{tool_result}\n</tool_result>"
                    )));
                }
            }
        }

        self.finalize(working, input.to_string()).await
    }

    /// Stream an answer to a composed prompt on top of the current memory,
    /// recording `original_input` (not the composed prompt) as the user side
    /// of the persisted exchange. Used for URL/file grounding and forced
    /// searches.
    pub async fn ask_direct(
        &self,
        final_prompt: &str,
        original_input: &str,
    ) -> Result<Receiver<Result<String, ChatError>>, Error> {
        let mut working = self.memory.read().await.messages().to_vec();
        working.push(Message::user(final_prompt));
        self.finalize(working, original_input.to_string()).await
    }

    /// Stream a vision answer for one base64-encoded image. The request
    /// carries only the single image message; memory records a synthetic
    /// user line describing the analysis.
    pub async fn ask_vision(
        &self,
        prompt: &str,
        image_b64: String,
    ) -> Result<Receiver<Result<String, ChatError>>, Error> {
        info!("Engaging vision");
        let working = vec![Message::user_with_images(prompt, vec![image_b64])];
        let memory_line = format!("Image analysis prompt: \"{prompt}\" for the provided image.");
        self.finalize(working, memory_line).await
    }

    /// Execute one search query and reduce it to a tool-result text: the
    /// first scrapeable result's page content (truncated, with the current
    /// date), or a synthetic message when nothing useful came back.
    ///
    /// Individual result pages failing to scrape is expected and non-fatal;
    /// an exhausted search pipeline is not and propagates.
    pub async fn run_search(&self, query: &str) -> Result<String, SearchError> {
        let outcome = self.search.search(query).await?;
        if outcome.no_results {
            warn!(query = %query, "Web search returned no results");
            return Ok("Web search returned no results.".into());
        }

        for result in &outcome.results {
            info!(url = %result.url, "Fetching result page");
            match self.search.fetch_page(&result.url).await {
                Ok(content) => {
                    let truncated = truncate_chars(&content, self.max_content_chars);
                    let date_time = (self.datetime_fn)();
                    return Ok(format!(
                        "Current date is {date_time}.\n\nScraped content from \"{url}\" for the query \"{query}\":\n\n```\n{truncated}\n```",
                        url = result.url,
                    ));
                }
                Err(e) => {
                    warn!(url = %result.url, error = %e, "Result page failed, trying next");
                }
            }
        }

        warn!(query = %query, "Could not scrape any of the top results");
        Ok("Could not find and scrape any relevant web pages from the top results.".into())
    }

    /// Wipe conversation memory back to the system prompt.
    pub async fn reset(&self) {
        self.memory.write().await.reset();
    }

    /// Issue the streaming call and forward its chunks, accumulating the full
    /// response. Memory is appended only when the stream ends cleanly.
    async fn finalize(
        &self,
        working: Vec<Message>,
        memory_user_content: String,
    ) -> Result<Receiver<Result<String, ChatError>>, Error> {
        let mut inner = run_with_retry(
            || self.backend.stream(&working),
            self.retry_attempts,
            self.retry_delay,
        )
        .await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let memory = self.memory.clone();

        tokio::spawn(async move {
            let mut full = String::new();
            while let Some(piece) = inner.recv().await {
                match piece {
                    Ok(text) => {
                        full.push_str(&text);
                        if tx.send(Ok(text)).await.is_err() {
                            return; // caller went away, nothing to persist
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
            memory.write().await.append(&memory_user_content, &full);
        });

        Ok(rx)
    }
}

/// Cut at a character boundary, never mid-codepoint.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
