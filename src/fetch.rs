//! Feed fetching.
//!
//! Thin wrapper around reqwest with an explicit per-fetch timeout so one
//! slow publisher cannot stall the whole sweep.

use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gigcal/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(FeedFetcher { client })
    }

    /// Fetch one feed's raw calendar text.
    pub async fn fetch(&self, feed_url: &str) -> Result<String> {
        let url = normalize_feed_url(feed_url)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch feed: {feed_url}"))?
            .error_for_status()
            .with_context(|| format!("Feed returned an error status: {feed_url}"))?;

        response
            .text()
            .await
            .with_context(|| format!("Failed to read feed body: {feed_url}"))
    }
}

/// Subscription links are often published with the webcal:// scheme,
/// which is plain HTTPS underneath.
fn normalize_feed_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let rewritten = trimmed
        .strip_prefix("webcal://")
        .map(|rest| format!("https://{rest}"))
        .unwrap_or_else(|| trimmed.to_string());

    Url::parse(&rewritten).with_context(|| format!("Invalid feed URL: {raw}"))
}
