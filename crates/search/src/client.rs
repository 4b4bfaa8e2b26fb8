//! Tiered search orchestration and page scraping.
//!
//! `search()` resolves a query through three providers in strict order:
//! a SERP scrape with a browser User-Agent, then the Brave Search API, then
//! Google Custom Search. Only an HTTP 429 from the scrape tier opens the API
//! fallback chain; any other scrape failure is surfaced immediately as
//! `Exhausted` without consulting the API tiers. Every successful tier
//! (including one with zero results) caches its outcome under the normalized
//! query.

use std::sync::LazyLock;

use async_trait::async_trait;
use driftline_core::{SearchError, SearchOutcome, SearchResult, SearchTool};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::cache::SearchCache;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Results per query, across every tier.
const MAX_RESULTS: usize = 3;

/// The tiered search pipeline with its cache.
pub struct SearchClient {
    client: reqwest::Client,
    scrape_url: String,
    brave_api_url: String,
    google_api_url: String,
    brave_api_key: Option<String>,
    google_api_key: Option<String>,
    google_cx_id: Option<String>,
    cache: RwLock<SearchCache>,
}

impl SearchClient {
    pub fn new(cache: SearchCache) -> Self {
        Self {
            client: reqwest::Client::new(),
            scrape_url: "https://search.brave.com".into(),
            brave_api_url: "https://api.search.brave.com".into(),
            google_api_url: "https://www.googleapis.com".into(),
            brave_api_key: None,
            google_api_key: None,
            google_cx_id: None,
            cache: RwLock::new(cache),
        }
    }

    /// Override the provider base URLs (also the test seam).
    pub fn with_endpoints(
        mut self,
        scrape_url: impl Into<String>,
        brave_api_url: impl Into<String>,
        google_api_url: impl Into<String>,
    ) -> Self {
        self.scrape_url = scrape_url.into().trim_end_matches('/').to_string();
        self.brave_api_url = brave_api_url.into().trim_end_matches('/').to_string();
        self.google_api_url = google_api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_brave_key(mut self, key: Option<String>) -> Self {
        self.brave_api_key = key;
        self
    }

    pub fn with_google_credentials(mut self, key: Option<String>, cx_id: Option<String>) -> Self {
        self.google_api_key = key;
        self.google_cx_id = cx_id;
        self
    }

    async fn store(&self, query: &str, outcome: &SearchOutcome) {
        self.cache.write().await.put(query, outcome.clone());
    }

    /// Tier 1: fetch the search engine results page and parse the markup.
    async fn try_scrape(&self, query: &str) -> Result<SearchOutcome, SearchError> {
        debug!(query, "Scraping search results page");
        let url = format!("{}/search", self.scrape_url);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, BROWSER_UA)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            return Err(SearchError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;
        Ok(SearchOutcome::from_results(parse_serp(&html)))
    }

    /// Tier 2: Brave Search API. Missing credential counts as tier failure.
    async fn try_brave(&self, query: &str) -> Result<SearchOutcome, SearchError> {
        let key = self
            .brave_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(SearchError::NotConfigured("Brave API key"))?;

        debug!(query, "Querying Brave Search API");
        let url = format!("{}/res/v1/web/search", self.brave_api_url);
        let response = self
            .client
            .get(&url)
            .header("X-Subscription-Token", key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: BraveResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Network(format!("invalid Brave response: {e}")))?;

        let results = parsed
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .take(MAX_RESULTS)
            .map(|item| SearchResult {
                title: item.title,
                url: item.url,
                snippet: item.description,
            })
            .collect();
        Ok(SearchOutcome::from_results(results))
    }

    /// Tier 3: Google Custom Search. Same credential precondition.
    async fn try_google(&self, query: &str) -> Result<SearchOutcome, SearchError> {
        let key = self
            .google_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(SearchError::NotConfigured("Google API key"))?;
        let cx = self
            .google_cx_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(SearchError::NotConfigured("Google CX id"))?;

        debug!(query, "Querying Google Custom Search");
        let url = format!("{}/customsearch/v1", self.google_api_url);
        let response = self
            .client
            .get(&url)
            .query(&[("key", key), ("cx", cx), ("q", query)])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: GoogleResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Network(format!("invalid Google response: {e}")))?;

        let results = parsed
            .items
            .unwrap_or_default()
            .into_iter()
            .take(MAX_RESULTS)
            .map(|item| SearchResult {
                title: item.title,
                url: item.link,
                snippet: item.snippet.unwrap_or_default(),
            })
            .collect();
        Ok(SearchOutcome::from_results(results))
    }
}

#[async_trait]
impl SearchTool for SearchClient {
    async fn search(&self, query: &str) -> Result<SearchOutcome, SearchError> {
        if let Some(hit) = self.cache.read().await.get(query) {
            debug!(query, "Serving cached search results");
            return Ok(hit.clone());
        }

        match self.try_scrape(query).await {
            Ok(outcome) => {
                self.store(query, &outcome).await;
                Ok(outcome)
            }
            Err(SearchError::RateLimited) => {
                warn!("Scrape tier rate-limited, activating Brave API fallback");
                match self.try_brave(query).await {
                    Ok(outcome) => {
                        self.store(query, &outcome).await;
                        Ok(outcome)
                    }
                    Err(brave_err) => {
                        warn!(error = %brave_err, "Brave tier failed, activating Google fallback");
                        match self.try_google(query).await {
                            Ok(outcome) => {
                                self.store(query, &outcome).await;
                                Ok(outcome)
                            }
                            Err(google_err) => {
                                error!(error = %google_err, "All search tiers failed");
                                Err(SearchError::Exhausted {
                                    source: Box::new(google_err),
                                })
                            }
                        }
                    }
                }
            }
            // Only rate limiting opens the fallback chain; every other scrape
            // failure surfaces immediately with its cause.
            Err(other) => {
                error!(error = %other, "Scrape tier failed for a non-rate-limit reason");
                Err(SearchError::Exhausted {
                    source: Box::new(other),
                })
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String, SearchError> {
        let fetch_err = |reason: String| SearchError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_UA)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {}", status.as_u16())));
        }

        let html = response.text().await.map_err(|e| fetch_err(e.to_string()))?;
        Ok(extract_text(&html))
    }
}

// --- Markup extraction ---

static RESULT_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<div[^>]*data-type="web""#).unwrap());
static RESULT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a[^>]*heading-serpresult[^>]*>"#).unwrap());
static HREF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"href="([^"]+)""#).unwrap());
static RESULT_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<div[^>]*class="[^"]*\btitle\b[^"]*"[^>]*>(.*?)</div>"#).unwrap());
static RESULT_SNIPPET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="[^"]*snippet-description[^"]*"[^>]*>(.*?)</div>"#).unwrap()
});

/// Extract the top organic results from a SERP. Blocks are delimited by the
/// `data-type="web"` container openers; a result needs at least a title and
/// a link to count.
fn parse_serp(html: &str) -> Vec<SearchResult> {
    let starts: Vec<usize> = RESULT_OPEN.find_iter(html).map(|m| m.start()).collect();
    let mut results = Vec::new();

    for (i, &start) in starts.iter().enumerate() {
        if results.len() >= MAX_RESULTS {
            break;
        }
        let end = starts.get(i + 1).copied().unwrap_or(html.len());
        let block = &html[start..end];

        let url = RESULT_LINK
            .find(block)
            .and_then(|anchor| HREF.captures(anchor.as_str()))
            .map(|c| c[1].to_string());
        let title = RESULT_TITLE
            .captures(block)
            .map(|c| clean_fragment(&c[1]));
        let snippet = RESULT_SNIPPET
            .captures(block)
            .map(|c| clean_fragment(&c[1]))
            .unwrap_or_default();

        if let (Some(title), Some(url)) = (title, url) {
            if !title.is_empty() && !url.is_empty() {
                results.push(SearchResult { title, url, snippet });
            }
        }
    }

    results
}

static DROP_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?si)<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>|<svg\b.*?</svg>|<header\b.*?</header>|<footer\b.*?</footer>|<nav\b.*?</nav>",
    )
    .unwrap()
});
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Reduce a whole HTML document to readable plain text: drop script/style and
/// navigational blocks, strip the remaining tags, decode common entities,
/// collapse whitespace.
fn extract_text(html: &str) -> String {
    let without_blocks = DROP_BLOCKS.replace_all(html, " ");
    let without_tags = ANY_TAG.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Strip tags and normalize whitespace inside one extracted markup fragment.
fn clean_fragment(fragment: &str) -> String {
    let without_tags = ANY_TAG.replace_all(fragment, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// --- API wire types ---

#[derive(serde::Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(serde::Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(serde::Deserialize)]
struct BraveItem {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

#[derive(serde::Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Option<Vec<GoogleItem>>,
}

#[derive(serde::Deserialize)]
struct GoogleItem {
    title: String,
    link: String,
    #[serde(default)]
    snippet: Option<String>,
}
