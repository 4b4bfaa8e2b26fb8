//! Parsing of the textual tool-invocation protocol.
//!
//! The model requests a tool by emitting a `<tool_call>` block with nested
//! `<tool>` and `<query>` tags inside its free-form output. Parsing is a pure
//! function from text to a tagged variant, so detection stays decoupled from
//! the loop's control decisions.

use std::sync::LazyLock;

use regex::Regex;

static TOOL_CALL_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tool_call>.*?</tool_call>").unwrap());
static TOOL_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<tool>(.*?)</tool>").unwrap());
static QUERY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<query>(.*?)</query>").unwrap());

/// What the assistant's output asked for, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDirective {
    /// No tool-call block present; the output is a direct answer.
    None,
    /// A well-formed call to the one recognized tool.
    Recognized {
        /// The full `<tool_call>…</tool_call>` block as matched.
        block: String,
        /// The extracted search query.
        query: String,
    },
    /// A block is present but names an unknown tool or lacks a query.
    Malformed { block: String },
}

/// Extract the first tool-call block from assistant output and classify it.
/// Only the `search` tool is recognized.
pub fn parse_tool_directive(text: &str) -> ToolDirective {
    let Some(matched) = TOOL_CALL_BLOCK.find(text) else {
        return ToolDirective::None;
    };
    let block = matched.as_str().to_string();

    let tool = TOOL_TAG.captures(&block).map(|c| c[1].trim().to_string());
    let query = QUERY_TAG.captures(&block).map(|c| c[1].trim().to_string());

    match (tool.as_deref(), query) {
        (Some("search"), Some(query)) if !query.is_empty() => {
            ToolDirective::Recognized { block, query }
        }
        _ => ToolDirective::Malformed { block },
    }
}
