//! Persistent bounded conversation memory.
//!
//! [`ConversationLog`] owns the ordered message sequence for the whole
//! process: the system preamble pinned at index 0, followed by user/assistant
//! pairs. The history file holds only the non-system messages as a pretty
//! JSON array, rewritten after every mutation; write failures are logged and
//! never roll back the in-memory state.

use std::path::PathBuf;

use driftline_core::{Message, Role};
use tracing::{debug, warn};

/// The conversation log with a fixed system prompt and a bounded tail.
pub struct ConversationLog {
    path: PathBuf,
    limit: usize,
    system_prompt: String,
    messages: Vec<Message>,
}

impl ConversationLog {
    /// Load the conversation from `path`, seeding the system prompt at index
    /// 0. A missing history file starts fresh; a corrupt one warns and starts
    /// fresh.
    pub fn load(path: PathBuf, limit: usize, system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        let mut messages = vec![Message::system(system_prompt.clone())];

        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<Message>>(&content) {
                Ok(saved) => {
                    debug!(count = saved.len(), "Loaded conversation history");
                    messages.extend(saved);
                }
                Err(e) => {
                    warn!(error = %e, "Could not parse memory file, starting fresh");
                }
            },
            Err(_) => {} // no history yet
        }

        let mut log = Self {
            path,
            limit,
            system_prompt,
            messages,
        };
        log.trim();
        log
    }

    /// The full ordered message sequence, system prompt first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of non-system messages currently held.
    pub fn history_len(&self) -> usize {
        self.messages.len() - 1
    }

    /// Record one completed exchange and persist. A no-op (including
    /// persistence) when either side is empty.
    pub fn append(&mut self, user_content: &str, assistant_content: &str) {
        if user_content.is_empty() || assistant_content.is_empty() {
            return;
        }
        self.messages.push(Message::user(user_content));
        self.messages.push(Message::assistant(assistant_content));
        self.trim();
        self.persist();
    }

    /// Wipe the history back to the system prompt alone and persist.
    pub fn reset(&mut self) {
        self.messages = vec![Message::system(self.system_prompt.clone())];
        self.persist();
    }

    /// Drop the oldest non-system messages until the tail fits the limit.
    /// The system message never moves from index 0.
    fn trim(&mut self) {
        let excess = self.history_len().saturating_sub(self.limit);
        if excess > 0 {
            self.messages.drain(1..1 + excess);
        }
    }

    /// Rewrite the history file with everything after the system prompt.
    /// Failure is logged only.
    fn persist(&self) {
        let json = match serde_json::to_string_pretty(&self.messages[1..]) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "Failed to serialize conversation history");
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "Failed to create memory directory");
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!(path = %self.path.display(), error = %e, "Failed to save conversation history");
        }
    }
}
