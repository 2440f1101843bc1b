//! Store boundary for canonical events.
//!
//! The pipeline needs very little from its store: point lookups by each
//! identity key, insert, update-by-id, and the sweep. Uniqueness is
//! enforced by the merge engine's lookup-before-write protocol, so the
//! store is not required to carry unique constraints itself.

mod memory;
mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gigcal_core::CanonicalEvent;

/// What the store's current schema can do, probed once per run and
/// threaded through the merge engine explicitly. Identity columns may
/// lag behind the code while a rollout is in flight; their absence is a
/// compatibility seam, not an error.
#[derive(Debug, Clone, Copy)]
pub struct StoreCapabilities {
    pub source_uid: bool,
    pub canonical_key: bool,
    pub content_hash: bool,
}

impl StoreCapabilities {
    pub fn full() -> Self {
        StoreCapabilities {
            source_uid: true,
            canonical_key: true,
            content_hash: true,
        }
    }

    pub fn legacy() -> Self {
        StoreCapabilities {
            source_uid: false,
            canonical_key: false,
            content_hash: false,
        }
    }
}

/// The slice of a stored row the merge engine needs for its decision.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: i64,
    pub source_uid: Option<String>,
    pub canonical_key: Option<String>,
    /// None when the schema has no content_hash column yet; the merge
    /// engine then treats every re-sighting as changed.
    pub content_hash: Option<String>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Probe the schema once per run.
    async fn capabilities(&self) -> Result<StoreCapabilities>;

    async fn find_by_source_uid(&self, source_uid: &str) -> Result<Option<StoredEvent>>;

    async fn find_by_canonical_key(&self, canonical_key: &str) -> Result<Option<StoredEvent>>;

    /// Last-resort lookup by the exact occurrence triple, used when the
    /// identity columns are unavailable.
    async fn find_by_occurrence(
        &self,
        title: &str,
        start_at: DateTime<Utc>,
        venue: Option<&str>,
    ) -> Result<Option<StoredEvent>>;

    async fn insert(&self, event: &CanonicalEvent, caps: StoreCapabilities) -> Result<()>;

    async fn update(&self, id: i64, event: &CanonicalEvent, caps: StoreCapabilities)
        -> Result<()>;

    /// Mark every event started before `cutoff` and not already past as
    /// past. Idempotent; returns the number of rows transitioned.
    async fn mark_past(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
