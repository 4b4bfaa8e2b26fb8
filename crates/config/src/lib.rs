//! Configuration loading, validation, and management for Driftline.
//!
//! Loads configuration from `~/.driftline/config.toml` with environment
//! variable overrides. Validates all settings at startup. Every field has a
//! serde default, so a missing or partial file still yields a working config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The root configuration structure.
///
/// Maps directly to `~/.driftline/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Chat endpoint configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Search pipeline configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Conversation memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Heartbeat configuration
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

// --- Chat ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Base URL of the Ollama-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// How long the endpoint should keep the model loaded between requests
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "qwen3:8b".into()
}
fn default_keep_alive() -> String {
    "15m".into()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            keep_alive: default_keep_alive(),
        }
    }
}

// --- Search ---

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search engine results page used by the scrape tier
    #[serde(default = "default_scrape_url")]
    pub scrape_url: String,

    /// Brave Search API endpoint (fallback tier 1)
    #[serde(default = "default_brave_api_url")]
    pub brave_api_url: String,

    /// Google Custom Search endpoint (fallback tier 2)
    #[serde(default = "default_google_api_url")]
    pub google_api_url: String,

    /// Brave Search API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brave_api_key: Option<String>,

    /// Google Custom Search API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_api_key: Option<String>,

    /// Google Custom Search engine ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_cx_id: Option<String>,

    /// How long cached search outcomes stay fresh, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Cache snapshot file (default: `<config dir>/cache.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
}

fn default_scrape_url() -> String {
    "https://search.brave.com".into()
}
fn default_brave_api_url() -> String {
    "https://api.search.brave.com".into()
}
fn default_google_api_url() -> String {
    "https://www.googleapis.com".into()
}
fn default_cache_ttl_secs() -> u64 {
    600
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            scrape_url: default_scrape_url(),
            brave_api_url: default_brave_api_url(),
            google_api_url: default_google_api_url(),
            brave_api_key: None,
            google_api_key: None,
            google_cx_id: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_file: None,
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("scrape_url", &self.scrape_url)
            .field("brave_api_url", &self.brave_api_url)
            .field("google_api_url", &self.google_api_url)
            .field("brave_api_key", &redact(&self.brave_api_key))
            .field("google_api_key", &redact(&self.google_api_key))
            .field("google_cx_id", &redact(&self.google_cx_id))
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache_file", &self.cache_file)
            .finish()
    }
}

// --- Memory ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// History file (default: `<config dir>/memory.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Maximum number of non-system messages kept in the conversation
    #[serde(default = "default_memory_limit")]
    pub limit: usize,

    /// Override the built-in system prompt entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_memory_limit() -> usize {
    15
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            file: None,
            limit: default_memory_limit(),
            system_prompt_override: None,
        }
    }
}

// --- Agent ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Tool iterations per turn for ordinary prompts
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Tool iterations per turn when a complex-task keyword matches
    #[serde(default = "default_escalated_iterations")]
    pub escalated_iterations: u32,

    /// Keywords that escalate the iteration budget
    #[serde(default = "default_complex_keywords")]
    pub complex_keywords: Vec<String>,

    /// Input prefixes that route straight to a web search
    #[serde(default = "default_search_triggers")]
    pub search_triggers: Vec<String>,

    /// Keywords anywhere in the input that force a web search
    #[serde(default = "default_time_sensitive_keywords")]
    pub time_sensitive_keywords: Vec<String>,

    /// Hard cap on scraped page content bundled into a tool result
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Retries per LLM call after the first failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Initial backoff delay between retries, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_iterations() -> u32 {
    1
}
fn default_escalated_iterations() -> u32 {
    3
}
fn default_complex_keywords() -> Vec<String> {
    [
        "summarize",
        "summarise",
        "in-depth",
        "in depth",
        "deep dive",
        "explain in detail",
        "analyze",
        "compare",
        "contrast",
        "research",
        "investigate",
        "think longer",
    ]
    .map(String::from)
    .to_vec()
}
fn default_search_triggers() -> Vec<String> {
    [
        "search online",
        "look online",
        "look up online",
        "google",
        "do websearch",
        "do web search",
    ]
    .map(String::from)
    .to_vec()
}
fn default_time_sensitive_keywords() -> Vec<String> {
    [
        // Explicit recency
        "latest",
        "current",
        "up to date",
        "up-to-date",
        "today",
        "recent",
        "this week",
        "yesterday",
        "breaking news",
        // News & updates
        "news on",
        "update on",
        "what's happening in",
        "any news about",
        "latest developments",
        // Prices & financials
        "price of",
        "cost of",
        "value of",
        "how much is",
        "how much does",
        "stock price for",
        "interest rate",
        "inflation rate",
        "exchange rate",
        "gas prices",
        // Live events & scores
        "score of",
        "who won",
        "who is winning",
        "match result",
        "final score",
        "showtimes for",
        "election results",
        // Real-time status
        "weather in",
        "forecast for",
        "traffic in",
        "is service down",
        "flight status",
        "air quality in",
        "are there delays",
        // Current roles & trends
        "who is the ceo of",
        "who is the president of",
        "ranking of",
        "top 10",
        "trending on",
        "best selling",
        "most popular",
        // Schedules & future events
        "when is the next",
        "release date for",
        "schedule for",
        "who is playing",
    ]
    .map(String::from)
    .to_vec()
}
fn default_max_content_chars() -> usize {
    11_400
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            escalated_iterations: default_escalated_iterations(),
            complex_keywords: default_complex_keywords(),
            search_triggers: default_search_triggers(),
            time_sensitive_keywords: default_time_sensitive_keywords(),
            max_content_chars: default_max_content_chars(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

// --- Heartbeat ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between keep-alive pings
    #[serde(default = "default_heartbeat_interval_secs")]
    pub interval_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_heartbeat_interval_secs() -> u64 {
    240
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

// --- System prompt ---

/// The built-in system preamble: persona plus the textual tool protocol the
/// agent loop parses. Overridable via `[memory] system_prompt_override`.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Driftline, a sharp, friendly terminal assistant. Keep answers concise \
and practical; prefer plain language over filler.

You have access to a tool that retrieves real-time information from the \
internet. You have NO internal knowledge of current events, prices, or recent \
data. When you need such information you MUST use the search tool instead of \
answering from memory, and your response MUST be ONLY the <tool_call> block.

The format is:
<tool_call>
  <tool>search</tool>
  <query>your search query here</query>
</tool_call>

For example, if the user asks \"What's the price of SOL?\", you MUST reply with:
<tool_call>
  <tool>search</tool>
  <query>current price of solana</query>
</tool_call>

After you issue a tool call, the system will provide the results. You will \
then use those results to give the final answer. If the information is already \
in your knowledge base, answer directly without using a tool.";

impl AppConfig {
    /// Load configuration from the default path (`~/.driftline/config.toml`).
    ///
    /// Environment variable overrides, highest priority:
    /// - `DRIFTLINE_BASE_URL`, `DRIFTLINE_MODEL`
    /// - `BRAVE_API_KEY`, `GOOGLE_API_KEY`, `GOOGLE_CX_ID`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(url) = std::env::var("DRIFTLINE_BASE_URL") {
            config.chat.base_url = url;
        }
        if let Ok(model) = std::env::var("DRIFTLINE_MODEL") {
            config.chat.model = model;
        }
        if config.search.brave_api_key.is_none() {
            config.search.brave_api_key = std::env::var("BRAVE_API_KEY").ok();
        }
        if config.search.google_api_key.is_none() {
            config.search.google_api_key = std::env::var("GOOGLE_API_KEY").ok();
        }
        if config.search.google_cx_id.is_none() {
            config.search.google_cx_id = std::env::var("GOOGLE_CX_ID").ok();
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".driftline")
    }

    /// Resolved conversation history file path.
    pub fn memory_file(&self) -> PathBuf {
        self.memory
            .file
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("memory.json"))
    }

    /// Resolved search cache snapshot path.
    pub fn cache_file(&self) -> PathBuf {
        self.search
            .cache_file
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("cache.json"))
    }

    /// The effective system prompt (override or built-in).
    pub fn system_prompt(&self) -> &str {
        self.memory
            .system_prompt_override
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.limit == 0 {
            return Err(ConfigError::ValidationError(
                "memory.limit must be at least 1".into(),
            ));
        }
        if self.agent.max_iterations == 0 || self.agent.escalated_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent iteration budgets must be at least 1".into(),
            ));
        }
        if self.search.cache_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "search.cache_ttl_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chat.base_url, "http://localhost:11434");
        assert_eq!(config.memory.limit, 15);
        assert_eq!(config.agent.max_iterations, 1);
        assert_eq!(config.agent.escalated_iterations, 3);
        assert_eq!(config.agent.max_content_chars, 11_400);
        assert_eq!(config.heartbeat.interval_secs, 240);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.chat.model, config.chat.model);
        assert_eq!(parsed.search.cache_ttl_secs, config.search.cache_ttl_secs);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().chat.base_url, "http://localhost:11434");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[chat]\nmodel = \"llama3:8b\"").unwrap();

        let config = AppConfig::load_from(tmp.path()).unwrap();
        assert_eq!(config.chat.model, "llama3:8b");
        // Untouched sections keep their defaults
        assert_eq!(config.memory.limit, 15);
        assert_eq!(config.search.cache_ttl_secs, 600);
    }

    #[test]
    fn zero_memory_limit_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[memory]\nlimit = 0").unwrap();

        let result = AppConfig::load_from(tmp.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn debug_redacts_api_keys() {
        let config = SearchConfig {
            brave_api_key: Some("super-secret".into()),
            ..SearchConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn system_prompt_override_wins() {
        let mut config = AppConfig::default();
        assert!(config.system_prompt().contains("<tool_call>"));

        config.memory.system_prompt_override = Some("custom".into());
        assert_eq!(config.system_prompt(), "custom");
    }

    #[test]
    fn default_prompt_documents_the_tool_protocol() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("<tool>search</tool>"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("<query>"));
    }
}
