//! Persistent TTL cache of search outcomes.
//!
//! Keys are normalized queries (trimmed, lowercased). The snapshot file is a
//! JSON array of `[key, entry]` pairs; entries already past their TTL are
//! pruned at load time. The read path only filters — expired entries linger
//! in memory until the next load, which is fine because `get` treats them as
//! absent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use driftline_core::SearchOutcome;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One cached outcome with its creation instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: DateTime<Utc>,
    pub data: SearchOutcome,
}

/// In-memory map of recent search outcomes, snapshotted to disk after every
/// write. Corrupt snapshots reset to an empty cache; write failures are
/// logged and never fatal.
pub struct SearchCache {
    path: PathBuf,
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

/// Normalize a query into its cache key.
fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

impl SearchCache {
    /// Load the snapshot at `path`, dropping entries whose age already
    /// exceeds `ttl`. A missing file starts empty; a corrupt one resets to
    /// empty with a warning.
    pub fn load(path: PathBuf, ttl: Duration) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<(String, CacheEntry)>>(&content) {
                Ok(pairs) => {
                    let now = Utc::now();
                    let fresh: HashMap<String, CacheEntry> = pairs
                        .into_iter()
                        .filter(|(_, entry)| !Self::expired(entry, now, ttl))
                        .collect();
                    debug!(count = fresh.len(), "Loaded fresh search cache entries");
                    fresh
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse search cache, starting fresh");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(), // no snapshot yet
        };

        Self { path, ttl, entries }
    }

    fn expired(entry: &CacheEntry, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(entry.timestamp);
        age >= chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
    }

    /// Look up a fresh outcome. Expired entries read as absent but are not
    /// deleted here; pruning happens at load time.
    pub fn get(&self, query: &str) -> Option<&SearchOutcome> {
        let entry = self.entries.get(&normalize(query))?;
        if Self::expired(entry, Utc::now(), self.ttl) {
            return None;
        }
        Some(&entry.data)
    }

    /// Insert an outcome under the normalized query and snapshot to disk.
    pub fn put(&mut self, query: &str, outcome: SearchOutcome) {
        self.entries.insert(
            normalize(query),
            CacheEntry {
                timestamp: Utc::now(),
                data: outcome,
            },
        );
        self.persist();
    }

    /// Write the full map as a JSON array of `[key, entry]` pairs. Failure is
    /// logged only — the in-memory cache stays authoritative.
    fn persist(&self) {
        let pairs: Vec<(&String, &CacheEntry)> = self.entries.iter().collect();
        let json = match serde_json::to_string(&pairs) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "Failed to serialize search cache");
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "Failed to create cache directory");
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!(path = %self.path.display(), error = %e, "Failed to save search cache");
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
