//! The interactive line loop and component wiring.

use std::sync::Arc;
use std::time::Duration;

use driftline_agent::AgentLoop;
use driftline_config::AppConfig;
use driftline_core::{BusyHook, ChatError, SearchTool};
use driftline_memory::ConversationLog;
use driftline_providers::OllamaClient;
use driftline_search::{SearchCache, SearchClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;
use tokio::sync::mpsc::Receiver;

use crate::commands::{self, Outcome};
use crate::util;

/// One wired-up agent session: the loop plus the routing configuration the
/// shell needs for its own dispatch decisions.
pub struct Session {
    pub agent: AgentLoop,
    pub search: Arc<dyn SearchTool>,
    pub search_triggers: Vec<String>,
    pub time_sensitive_keywords: Vec<String>,
    pub max_content_chars: usize,
}

impl Session {
    /// Wire every component from the loaded configuration.
    pub fn build(config: &AppConfig) -> Self {
        let busy: BusyHook = Arc::new(|on| {
            use std::io::Write;
            if on {
                eprint!("  thinking...");
            } else {
                eprint!("\r              \r");
            }
            let _ = std::io::stderr().flush();
        });

        let backend = Arc::new(
            OllamaClient::new(
                config.chat.base_url.clone(),
                config.chat.model.clone(),
                config.chat.keep_alive.clone(),
            )
            .with_busy_hook(busy),
        );

        let cache = SearchCache::load(
            config.cache_file(),
            Duration::from_secs(config.search.cache_ttl_secs),
        );
        let search: Arc<dyn SearchTool> = Arc::new(
            SearchClient::new(cache)
                .with_endpoints(
                    config.search.scrape_url.clone(),
                    config.search.brave_api_url.clone(),
                    config.search.google_api_url.clone(),
                )
                .with_brave_key(config.search.brave_api_key.clone())
                .with_google_credentials(
                    config.search.google_api_key.clone(),
                    config.search.google_cx_id.clone(),
                ),
        );

        let memory = Arc::new(RwLock::new(ConversationLog::load(
            config.memory_file(),
            config.memory.limit,
            config.system_prompt(),
        )));

        let agent = AgentLoop::new(backend, search.clone(), memory)
            .with_budgets(
                config.agent.max_iterations,
                config.agent.escalated_iterations,
            )
            .with_complex_keywords(config.agent.complex_keywords.clone())
            .with_max_content_chars(config.agent.max_content_chars)
            .with_retry(
                config.agent.retry_attempts,
                Duration::from_millis(config.agent.retry_delay_ms),
            )
            .with_datetime_fn(Arc::new(util::current_date_time));

        Self {
            agent,
            search,
            search_triggers: config.agent.search_triggers.clone(),
            time_sensitive_keywords: config.agent.time_sensitive_keywords.clone(),
            max_content_chars: config.agent.max_content_chars,
        }
    }
}

/// Print streamed answer chunks as they arrive, flushing per piece. A
/// mid-stream error ends the line and surfaces.
pub async fn print_stream(
    mut rx: Receiver<Result<String, ChatError>>,
) -> Result<(), ChatError> {
    use std::io::Write;
    let mut stdout = std::io::stdout();
    while let Some(piece) = rx.recv().await {
        match piece {
            Ok(text) => {
                print!("{text}");
                let _ = stdout.flush();
            }
            Err(e) => {
                println!();
                return Err(e);
            }
        }
    }
    println!();
    Ok(())
}

fn prompt() {
    use std::io::Write;
    print!("driftline> ");
    let _ = std::io::stdout().flush();
}

/// Fold raw lines into inputs, buffering between ``` fences so multi-line
/// pastes go out as one message.
fn handle_multiline(
    line: &str,
    multiline: &mut bool,
    buffer: &mut Vec<String>,
) -> Option<String> {
    if line.trim() == "```" {
        if *multiline {
            *multiline = false;
            return Some(buffer.join("\n"));
        }
        *multiline = true;
        buffer.clear();
        println!("(multiline on — type ``` to send)");
        return None;
    }
    if *multiline {
        buffer.push(line.to_string());
        return None;
    }
    Some(line.trim().to_string())
}

/// The interactive loop: one turn processed start-to-finish per input line.
pub async fn run(session: Session, model: &str, base_url: &str) -> std::io::Result<()> {
    println!();
    println!("  Driftline — terminal agent with live web search");
    println!("  Model: {model} @ {base_url}");
    println!("  Type /help for commands, /quit to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut multiline = false;
    let mut buffer: Vec<String> = Vec::new();

    prompt();
    while let Some(line) = lines.next_line().await? {
        let input = match handle_multiline(&line, &mut multiline, &mut buffer) {
            Some(input) => input,
            None => continue,
        };

        if input.is_empty() {
            prompt();
            continue;
        }

        match commands::process_input(&session, &input).await {
            Outcome::Quit => break,
            Outcome::Continue => {}
        }
        prompt();
    }

    Ok(())
}
