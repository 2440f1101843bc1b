//! Pipeline orchestration.
//!
//! One run: fetch and ingest each configured feed sequentially, then
//! sweep elapsed events to `past`. A failing feed is logged and skipped;
//! nothing here aborts the run. Feeds are deliberately processed one at
//! a time so diagnostics stay attributable and two feeds cannot race to
//! insert the same event before either write commits.

use anyhow::Result;
use chrono::{Duration, Utc};
use gigcal_core::{canonicalize, classify, extract_fields, parse_feed, CanonicalCtx};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::fetch::FeedFetcher;
use crate::merge::{merge_event, MergeOutcome};
use crate::store::{EventStore, StoreCapabilities};

/// Counters returned to the caller that triggered the run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub swept: u64,
    pub events_dropped: u64,
    pub event_errors: u64,
    pub feeds_failed: u64,
}

/// Run the full sweep: every configured feed, then the finalizer pass.
///
/// Always returns a summary, even when every feed failed.
pub async fn run(config: &Config, fetcher: &FeedFetcher, store: &dyn EventStore) -> Result<RunSummary> {
    let ctx = CanonicalCtx {
        tz: config.tz()?,
        city: config.city.clone(),
    };
    let caps = store.capabilities().await?;

    let mut summary = RunSummary::default();

    for feed_url in &config.feeds {
        let text = match fetcher.fetch(feed_url).await {
            Ok(text) => text,
            Err(error) => {
                warn!(feed = %feed_url, %error, "Feed fetch failed, skipping");
                summary.feeds_failed += 1;
                continue;
            }
        };

        match ingest_feed(&text, &ctx, store, caps, &mut summary).await {
            Ok(count) => debug!(feed = %feed_url, events = count, "Feed ingested"),
            Err(error) => {
                warn!(feed = %feed_url, %error, "Feed unparseable, skipping");
                summary.feeds_failed += 1;
            }
        }
    }

    summary.swept = sweep(config, store).await?;

    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        unchanged = summary.unchanged,
        swept = summary.swept,
        feeds_failed = summary.feeds_failed,
        "Run complete"
    );

    Ok(summary)
}

/// Ingest one feed document. Errors only when the document itself is
/// unreadable; individual bad events are dropped or counted instead.
pub async fn ingest_feed(
    text: &str,
    ctx: &CanonicalCtx,
    store: &dyn EventStore,
    caps: StoreCapabilities,
    summary: &mut RunSummary,
) -> Result<usize> {
    let parsed = parse_feed(text, ctx.tz)?;
    summary.events_dropped += parsed.dropped as u64;

    let count = parsed.events.len();
    for raw in parsed.events {
        let (fields, cleaned) = extract_fields(raw.description.as_deref().unwrap_or(""));
        let category = classify(&fields.tags, &raw.title, &cleaned);
        let event = canonicalize(&raw, &fields, &cleaned, category, ctx, Utc::now());

        match merge_event(store, caps, event).await {
            Ok(MergeOutcome::Inserted) => summary.inserted += 1,
            Ok(MergeOutcome::Updated) => summary.updated += 1,
            Ok(MergeOutcome::Unchanged) => summary.unchanged += 1,
            Err(error) => {
                warn!(title = %raw.title, %error, "Store write failed for event");
                summary.event_errors += 1;
            }
        }
    }

    Ok(count)
}

/// The finalizer pass: mark elapsed events as past. Safe to run twice.
pub async fn sweep(config: &Config, store: &dyn EventStore) -> Result<u64> {
    let cutoff = Utc::now() - Duration::hours(config.grace_hours);
    store.mark_past(cutoff).await
}
