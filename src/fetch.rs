//! Downloading feeds.

use std::time::Duration;

use anyhow::{Context, Result};
use feedsync_core::constants::FETCH_TIMEOUT_SECS;
use reqwest::{Client, StatusCode};
use tracing::debug;

pub fn client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .user_agent(concat!("feedsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Could not build HTTP client")
}

/// Body of the feed at `url`. Anything but `200 OK` is an error.
pub async fn fetch_feed(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Could not fetch {url}"))?;

    let status = response.status();
    if status != StatusCode::OK {
        anyhow::bail!("Fetching {url} returned {status}");
    }

    let body = response.bytes().await?;
    debug!(url, bytes = body.len(), "fetched feed");

    // Feeds with stray invalid bytes are still usable
    Ok(String::from_utf8_lossy(&body).into_owned())
}
