//! In-memory store.
//!
//! Backs `--dry-run` and the merge/pipeline tests. A `legacy()`-capability
//! instance drops the identity columns on write, the same way a Postgres
//! schema without those columns would.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gigcal_core::{CanonicalEvent, EventStatus};

use super::{EventStore, StoreCapabilities, StoredEvent};

struct Row {
    id: i64,
    event: CanonicalEvent,
}

pub struct MemStore {
    caps: StoreCapabilities,
    rows: Mutex<Vec<Row>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::with_capabilities(StoreCapabilities::full())
    }

    /// A store whose schema predates the identity columns.
    pub fn legacy() -> Self {
        Self::with_capabilities(StoreCapabilities::legacy())
    }

    fn with_capabilities(caps: StoreCapabilities) -> Self {
        MemStore {
            caps,
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().expect("store lock").len()
    }

    /// Snapshot of all stored events, in insertion order.
    pub fn events(&self) -> Vec<CanonicalEvent> {
        self.rows
            .lock()
            .expect("store lock")
            .iter()
            .map(|r| r.event.clone())
            .collect()
    }

    fn to_stored(row: &Row) -> StoredEvent {
        StoredEvent {
            id: row.id,
            source_uid: row.event.source_uid.clone(),
            canonical_key: Some(row.event.canonical_key.clone()).filter(|k| !k.is_empty()),
            content_hash: Some(row.event.content_hash.clone()).filter(|h| !h.is_empty()),
        }
    }

    /// Mimic a schema missing the identity columns by blanking the
    /// fields the capabilities say cannot be written.
    fn mask(event: &CanonicalEvent, caps: StoreCapabilities) -> CanonicalEvent {
        let mut event = event.clone();
        if !caps.source_uid {
            event.source_uid = None;
        }
        if !caps.canonical_key {
            event.canonical_key = String::new();
        }
        if !caps.content_hash {
            event.content_hash = String::new();
        }
        event
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemStore {
    async fn capabilities(&self) -> Result<StoreCapabilities> {
        Ok(self.caps)
    }

    async fn find_by_source_uid(&self, source_uid: &str) -> Result<Option<StoredEvent>> {
        let rows = self.rows.lock().expect("store lock");
        Ok(rows
            .iter()
            .find(|r| r.event.source_uid.as_deref() == Some(source_uid))
            .map(Self::to_stored))
    }

    async fn find_by_canonical_key(&self, canonical_key: &str) -> Result<Option<StoredEvent>> {
        let rows = self.rows.lock().expect("store lock");
        Ok(rows
            .iter()
            .find(|r| r.event.canonical_key == canonical_key)
            .map(Self::to_stored))
    }

    async fn find_by_occurrence(
        &self,
        title: &str,
        start_at: DateTime<Utc>,
        venue: Option<&str>,
    ) -> Result<Option<StoredEvent>> {
        let rows = self.rows.lock().expect("store lock");
        Ok(rows
            .iter()
            .find(|r| {
                r.event.title == title
                    && r.event.start_at == start_at
                    && r.event.venue.as_deref() == venue
            })
            .map(Self::to_stored))
    }

    async fn insert(&self, event: &CanonicalEvent, caps: StoreCapabilities) -> Result<()> {
        let mut rows = self.rows.lock().expect("store lock");
        let id = rows.last().map_or(1, |r| r.id + 1);
        rows.push(Row {
            id,
            event: Self::mask(event, caps),
        });
        Ok(())
    }

    async fn update(
        &self,
        id: i64,
        event: &CanonicalEvent,
        caps: StoreCapabilities,
    ) -> Result<()> {
        let mut rows = self.rows.lock().expect("store lock");
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("no stored event with id {id}"))?;

        let created_at = row.event.created_at;
        let status = row.event.status;
        row.event = Self::mask(event, caps);
        // Creation time and swept status survive updates.
        row.event.created_at = created_at;
        row.event.status = status;
        Ok(())
    }

    async fn mark_past(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.lock().expect("store lock");
        let mut swept = 0;
        for row in rows.iter_mut() {
            if row.event.start_at < cutoff && row.event.status != EventStatus::Past {
                row.event.status = EventStatus::Past;
                swept += 1;
            }
        }
        Ok(swept)
    }
}
