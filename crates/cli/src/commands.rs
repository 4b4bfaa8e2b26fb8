//! Slash-command dispatch and default input routing.
//!
//! Routing order for plain input: explicit search-trigger prefixes, then
//! time-sensitive keywords (both force a web search and ground the answer in
//! its result), then bare image paths, then the ordinary agentic turn.

use std::path::Path;

use base64::Engine as _;
use driftline_core::{ChatError, Error};
use tokio::sync::mpsc::Receiver;
use tracing::info;

use crate::repl::{Session, print_stream};
use crate::util;

/// What the line loop should do after an input.
pub enum Outcome {
    Continue,
    Quit,
}

/// Handle one complete input: a slash command or a conversational turn.
pub async fn process_input(session: &Session, input: &str) -> Outcome {
    if let Some(rest) = input.strip_prefix('/') {
        let command = rest.split_whitespace().next().unwrap_or_default();
        match command {
            "quit" | "exit" | "bye" => {
                println!("Catch you later.");
                return Outcome::Quit;
            }
            "help" => print_help(),
            "reset" => {
                session.agent.reset().await;
                println!("Memory wiped clean.");
            }
            "search" => search_command(session, input).await,
            "web" => web_command(session, input).await,
            "load" => load_command(session, input).await,
            "image" => image_command(session, input).await,
            other => println!("Unknown command: /{other}. Try /help."),
        }
        return Outcome::Continue;
    }

    default_input(session, input).await;
    Outcome::Continue
}

fn print_help() {
    println!("Commands:");
    println!("  /search <query>        run a web search and answer from it");
    println!("  /web <url> [prompt]    scrape a page and answer about it");
    println!("  /load <path> [prompt]  load a file and answer about it");
    println!("  /image <path> [prompt] analyze an image");
    println!("  /reset                 wipe conversation memory");
    println!("  /quit                  leave (also /exit, /bye)");
    println!("A bare image path is analyzed; ``` toggles multiline input.");
}

/// Stream a turn's answer to the terminal, reporting failures in place.
async fn stream_turn(result: Result<Receiver<Result<String, ChatError>>, Error>) {
    match result {
        Ok(rx) => {
            if let Err(e) = print_stream(rx).await {
                eprintln!("Stream error: {e}");
            }
        }
        Err(e) => eprintln!("Error: {e}"),
    }
}

async fn search_command(session: &Session, input: &str) {
    let (query, _) = util::extract_target_and_prompt(input, "search");
    if query.is_empty() {
        println!("Usage: /search <your query>");
        return;
    }
    let explicit =
        format!("The user explicitly asked to search the web. Perform a web search for: \"{query}\"");
    stream_turn(session.agent.process_turn(&explicit).await).await;
}

async fn web_command(session: &Session, input: &str) {
    let (url, prompt) = util::extract_target_and_prompt(input, "web");
    if url.is_empty() {
        println!("Usage: /web <url> [prompt]");
        return;
    }

    println!("Fetching {url}...");
    let content = match session.search.fetch_page(&url).await {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to fetch that URL: {e}");
            return;
        }
    };

    let truncated: String = content.chars().take(session.max_content_chars).collect();
    let date_time = util::current_date_time();
    let final_prompt = if prompt.is_empty() {
        format!(
            "Current date is {date_time}.\n\nSummarize this content from the URL \"{url}\". Here is the scraped content:\n\n```\n{truncated}\n```"
        )
    } else {
        format!(
            "Current date is {date_time}.\n\nAnalyze the content of the URL \"{url}\" to answer this question: \"{prompt}\". Here is the scraped content:\n\n```\n{truncated}\n```"
        )
    };
    stream_turn(session.agent.ask_direct(&final_prompt, input).await).await;
}

async fn load_command(session: &Session, input: &str) {
    let (target, prompt) = util::extract_target_and_prompt(input, "load");
    let Some(content) = util::load_file_content(&target) else {
        println!("Usage: /load <path> [prompt] (file not found or unreadable)");
        return;
    };

    let file_name = Path::new(&target)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| target.clone());
    let final_prompt = if prompt.is_empty() {
        format!(
            "You have loaded the file named \"{file_name}\". Here is its content:\n\n```\n{content}\n```\n\nSummarize this file for me."
        )
    } else {
        format!(
            "Based on the content of the file \"{file_name}\", please answer my question: \"{prompt}\". Here is the file content:\n\n```\n{content}\n```"
        )
    };
    stream_turn(session.agent.ask_direct(&final_prompt, input).await).await;
}

async fn image_command(session: &Session, input: &str) {
    let (target, prompt) = util::extract_target_and_prompt(input, "image");
    let Some(path) = util::resolve_and_validate_image_path(&target) else {
        println!("Usage: /image <path> [prompt] (path not found or not an image)");
        return;
    };

    let prompt = if prompt.is_empty() {
        "Describe this image.".to_string()
    } else {
        prompt
    };
    vision_turn(session, &path, &prompt).await;
}

async fn vision_turn(session: &Session, path: &Path, prompt: &str) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Could not read image: {e}");
            return;
        }
    };
    let image_b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
    stream_turn(session.agent.ask_vision(prompt, image_b64).await).await;
}

/// Ground the answer for `input` in a completed web search.
async fn answer_from_search(session: &Session, input: &str, query: &str) {
    match session.agent.run_search(query).await {
        Ok(search_result) => {
            let final_prompt = format!(
                "Based on this web search result, please answer my original question: \"{input}\".\n\nHere is the scraped content:\n```\n{search_result}\n```"
            );
            stream_turn(session.agent.ask_direct(&final_prompt, input).await).await;
        }
        Err(e) => eprintln!("Search failed: {e}"),
    }
}

async fn default_input(session: &Session, input: &str) {
    let lower = input.to_lowercase();

    for trigger in &session.search_triggers {
        if lower.starts_with(trigger.as_str()) {
            let query = input[trigger.len()..].trim();
            if query.is_empty() {
                println!("What should I search for? Give me a query after \"{trigger}\".");
                return;
            }
            info!(query, "Explicit search trigger");
            answer_from_search(session, input, query).await;
            return;
        }
    }

    for keyword in &session.time_sensitive_keywords {
        if lower.contains(keyword.as_str()) {
            info!(keyword = %keyword, "Time-sensitive keyword detected, forcing web search");
            // The whole prompt is the query.
            answer_from_search(session, input, input).await;
            return;
        }
    }

    if let Some(path) = util::resolve_and_validate_image_path(input) {
        vision_turn(session, &path, "Analyze this image.").await;
        return;
    }

    stream_turn(session.agent.process_turn(input).await).await;
}
