//! Merge engine: reconcile one canonical event against the store.
//!
//! Decision per incoming event:
//!
//! ```text
//! NoMatch              -> Insert
//! MatchBySourceUid     -> UpdateIfChanged
//! MatchByCanonicalKey  -> UpdateIfChanged
//!   ChangedContent     -> Write
//!   UnchangedContent   -> Skip (true no-op, no write at all)
//! ```
//!
//! The source's own identifier is authoritative: a `source_uid` match is
//! the target row even when its canonical key differs (the feed moved or
//! retitled the event). Identity lookups always run before any write,
//! which is what keeps repeated runs and overlapping feeds from ever
//! creating a duplicate row.

use anyhow::Result;
use chrono::Utc;
use gigcal_core::CanonicalEvent;
use tracing::debug;

use crate::store::{EventStore, StoreCapabilities, StoredEvent};

/// What the merge did with one incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Reconcile `event` against the store and return what happened.
///
/// `caps` is the schema capability snapshot probed once per run. When
/// the identity columns are not available the lookup falls back to the
/// exact (title, start_at, venue) triple, and the writes leave the
/// unsupported columns out.
pub async fn merge_event(
    store: &dyn EventStore,
    caps: StoreCapabilities,
    mut event: CanonicalEvent,
) -> Result<MergeOutcome> {
    let existing = find_target(store, caps, &event).await?;

    match existing {
        None => {
            store.insert(&event, caps).await?;
            Ok(MergeOutcome::Inserted)
        }
        Some(target) => {
            debug!(
                id = target.id,
                source_uid = ?target.source_uid,
                canonical_key = ?target.canonical_key,
                "Matched stored event"
            );
            if target.content_hash.as_deref() == Some(event.content_hash.as_str()) {
                debug!(key = %event.canonical_key, "Content unchanged, skipping");
                return Ok(MergeOutcome::Unchanged);
            }
            event.updated_at = Utc::now();
            store.update(target.id, &event, caps).await?;
            Ok(MergeOutcome::Updated)
        }
    }
}

/// Identity lookup in authority order: source_uid, then canonical_key,
/// then — only when the schema supports neither — the occurrence triple.
async fn find_target(
    store: &dyn EventStore,
    caps: StoreCapabilities,
    event: &CanonicalEvent,
) -> Result<Option<StoredEvent>> {
    if caps.source_uid {
        if let Some(uid) = event.source_uid.as_deref() {
            if let Some(found) = store.find_by_source_uid(uid).await? {
                return Ok(Some(found));
            }
        }
    }

    if caps.canonical_key {
        return store.find_by_canonical_key(&event.canonical_key).await;
    }

    // No canonical_key column yet: the occurrence triple is the only
    // remaining way to find the row.
    store
        .find_by_occurrence(&event.title, event.start_at, event.venue.as_deref())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use chrono::TimeZone;
    use gigcal_core::{CanonicalEvent, Category, EventStatus};
    use std::collections::BTreeSet;

    fn event(uid: Option<&str>, key: &str, hash: &str) -> CanonicalEvent {
        CanonicalEvent {
            source_uid: uid.map(String::from),
            canonical_key: key.to_string(),
            content_hash: hash.to_string(),
            title: "Jazz Night".to_string(),
            description: "Doors at 7.".to_string(),
            category: Category::Concert,
            start_at: Utc.with_ymd_and_hms(2025, 6, 1, 19, 0, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap(),
            timezone: "America/Chicago".to_string(),
            all_day: false,
            venue: Some("First Avenue".to_string()),
            address: Some("First Avenue, Minneapolis".to_string()),
            city: "Minneapolis".to_string(),
            organizer: None,
            tickets_url: None,
            source_url: None,
            image_url: None,
            price_from: None,
            tags: BTreeSet::new(),
            featured: false,
            status: EventStatus::Upcoming,
            created_at: Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_no_match_inserts() {
        let store = MemStore::new();
        let caps = store.capabilities().await.unwrap();

        let outcome = merge_event(&store, caps, event(Some("u1"), "k1", "h1"))
            .await
            .unwrap();

        assert_eq!(outcome, MergeOutcome::Inserted);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_content_is_a_noop() {
        let store = MemStore::new();
        let caps = store.capabilities().await.unwrap();

        merge_event(&store, caps, event(Some("u1"), "k1", "h1"))
            .await
            .unwrap();
        let outcome = merge_event(&store, caps, event(Some("u1"), "k1", "h1"))
            .await
            .unwrap();

        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_source_uid_match_updates_on_changed_content() {
        let store = MemStore::new();
        let caps = store.capabilities().await.unwrap();

        merge_event(&store, caps, event(Some("u1"), "k1", "h1"))
            .await
            .unwrap();
        // Same uid, different key (retitled) and different content
        let outcome = merge_event(&store, caps, event(Some("u1"), "k2", "h2"))
            .await
            .unwrap();

        assert_eq!(outcome, MergeOutcome::Updated);
        assert_eq!(store.len(), 1);
        assert_eq!(store.events()[0].content_hash, "h2");
    }

    #[tokio::test]
    async fn test_canonical_key_match_when_no_uid() {
        let store = MemStore::new();
        let caps = store.capabilities().await.unwrap();

        merge_event(&store, caps, event(None, "k1", "h1")).await.unwrap();
        let outcome = merge_event(&store, caps, event(None, "k1", "h2"))
            .await
            .unwrap();

        assert_eq!(outcome, MergeOutcome::Updated);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_schema_falls_back_to_occurrence_triple() {
        let store = MemStore::legacy();
        let caps = store.capabilities().await.unwrap();

        let first = merge_event(&store, caps, event(Some("u1"), "k1", "h1"))
            .await
            .unwrap();
        assert_eq!(first, MergeOutcome::Inserted);

        // Without a stored content hash every re-sighting counts as
        // changed, but it still lands on the same row.
        let second = merge_event(&store, caps, event(Some("u1"), "k1", "h1"))
            .await
            .unwrap();
        assert_eq!(second, MergeOutcome::Updated);
        assert_eq!(store.len(), 1);

        // Identity columns were skipped on write
        assert_eq!(store.events()[0].source_uid, None);
        assert_eq!(store.events()[0].canonical_key, "");
    }

    #[tokio::test]
    async fn test_update_preserves_created_at_and_status() {
        let store = MemStore::new();
        let caps = store.capabilities().await.unwrap();

        merge_event(&store, caps, event(Some("u1"), "k1", "h1"))
            .await
            .unwrap();
        let created = store.events()[0].created_at;

        merge_event(&store, caps, event(Some("u1"), "k1", "h2"))
            .await
            .unwrap();

        let stored = &store.events()[0];
        assert_eq!(stored.created_at, created);
        assert!(stored.updated_at >= created);
        assert_eq!(stored.status, EventStatus::Upcoming);
    }
}
