//! Background keep-alive ping for the chat endpoint.
//!
//! Ollama unloads idle models; a periodic GET against the endpoint root keeps
//! the connection (and the model) warm. The task runs independently of turn
//! processing and never blocks it — it owns its own HTTP client, so a hung
//! chat request cannot starve the ping.

use std::time::Duration;

use tracing::{debug, error, warn};

/// Ping the endpoint root once. Failures are logged, never returned.
async fn ping(client: &reqwest::Client, base_url: &str) {
    let url = format!("{}/", base_url.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            debug!("Heartbeat ping ok");
        }
        Ok(response) => {
            warn!(status = response.status().as_u16(), "Heartbeat ping failed");
        }
        Err(e) => {
            error!(error = %e, "Heartbeat connection seems dead");
        }
    }
}

/// Run the heartbeat loop forever. Spawn this as its own task.
pub async fn run_heartbeat(base_url: String, interval: Duration) {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        ping(&client, &base_url).await;
    }
}
