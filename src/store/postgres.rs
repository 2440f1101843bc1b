//! Postgres-backed store.
//!
//! Schema management lives outside this pipeline; this module only reads
//! and writes an `events` table shaped like:
//!
//! ```sql
//! CREATE TABLE events (
//!     id            BIGSERIAL PRIMARY KEY,
//!     source_uid    TEXT,            -- may lag behind the code
//!     canonical_key TEXT,            -- may lag behind the code
//!     content_hash  TEXT,            -- may lag behind the code
//!     title         TEXT NOT NULL,
//!     description   TEXT NOT NULL,
//!     category      TEXT NOT NULL,
//!     start_at      TIMESTAMPTZ NOT NULL,
//!     end_at        TIMESTAMPTZ NOT NULL,
//!     timezone      TEXT NOT NULL,
//!     all_day       BOOLEAN NOT NULL,
//!     venue         TEXT,
//!     address       TEXT,
//!     city          TEXT NOT NULL,
//!     organizer     TEXT,
//!     tickets_url   TEXT,
//!     source_url    TEXT,
//!     image_url     TEXT,
//!     price_from    DOUBLE PRECISION,
//!     tags          TEXT NOT NULL,   -- comma-joined, lowercase
//!     featured      BOOLEAN NOT NULL,
//!     status        TEXT NOT NULL,
//!     created_at    TIMESTAMPTZ NOT NULL,
//!     updated_at    TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! The three identity columns are probed once at connect time; when a
//! deployment's schema does not have them yet, reads and writes simply
//! leave them out and the merge engine falls back to occurrence matching.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gigcal_core::CanonicalEvent;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use super::{EventStore, StoreCapabilities, StoredEvent};

pub struct PgStore {
    pool: PgPool,
    caps: StoreCapabilities,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .context("Failed to connect to the event store")?;

        let caps = probe_capabilities(&pool).await?;
        info!(
            source_uid = caps.source_uid,
            canonical_key = caps.canonical_key,
            content_hash = caps.content_hash,
            "Probed event store schema"
        );

        Ok(PgStore { pool, caps })
    }

    /// SELECT list that reads identity columns only where they exist,
    /// so one row mapping covers every schema generation.
    fn select_list(&self) -> String {
        let col = |name: &str, present: bool| {
            if present {
                name.to_string()
            } else {
                format!("NULL::text AS {name}")
            }
        };
        format!(
            "id, {}, {}, {}",
            col("source_uid", self.caps.source_uid),
            col("canonical_key", self.caps.canonical_key),
            col("content_hash", self.caps.content_hash),
        )
    }

    fn writable_columns(&self, caps: StoreCapabilities) -> Vec<&'static str> {
        let mut cols = vec![
            "title",
            "description",
            "category",
            "start_at",
            "end_at",
            "timezone",
            "all_day",
            "venue",
            "address",
            "city",
            "organizer",
            "tickets_url",
            "source_url",
            "image_url",
            "price_from",
            "tags",
            "featured",
            "status",
            "created_at",
            "updated_at",
        ];
        if caps.source_uid {
            cols.push("source_uid");
        }
        if caps.canonical_key {
            cols.push("canonical_key");
        }
        if caps.content_hash {
            cols.push("content_hash");
        }
        cols
    }
}

fn to_stored(row: PgRow) -> Result<StoredEvent> {
    Ok(StoredEvent {
        id: row.try_get("id")?,
        source_uid: row.try_get("source_uid")?,
        canonical_key: row.try_get("canonical_key")?,
        content_hash: row.try_get("content_hash")?,
    })
}

/// Bind one event field by column name, in the order the query named it.
fn bind_column<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    column: &str,
    event: &'q CanonicalEvent,
    tags: &'q str,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match column {
        "title" => query.bind(&event.title),
        "description" => query.bind(&event.description),
        "category" => query.bind(event.category.as_str()),
        "start_at" => query.bind(event.start_at),
        "end_at" => query.bind(event.end_at),
        "timezone" => query.bind(&event.timezone),
        "all_day" => query.bind(event.all_day),
        "venue" => query.bind(&event.venue),
        "address" => query.bind(&event.address),
        "city" => query.bind(&event.city),
        "organizer" => query.bind(&event.organizer),
        "tickets_url" => query.bind(&event.tickets_url),
        "source_url" => query.bind(&event.source_url),
        "image_url" => query.bind(&event.image_url),
        "price_from" => query.bind(event.price_from),
        "tags" => query.bind(tags),
        "featured" => query.bind(event.featured),
        "status" => query.bind(event.status.as_str()),
        "created_at" => query.bind(event.created_at),
        "updated_at" => query.bind(event.updated_at),
        "source_uid" => query.bind(&event.source_uid),
        "canonical_key" => query.bind(&event.canonical_key),
        "content_hash" => query.bind(&event.content_hash),
        other => unreachable!("unknown event column {other}"),
    }
}

async fn probe_capabilities(pool: &PgPool) -> Result<StoreCapabilities> {
    let rows = sqlx::query(
        "SELECT column_name FROM information_schema.columns WHERE table_name = 'events'",
    )
    .fetch_all(pool)
    .await
    .context("Failed to probe event store schema")?;

    let columns: HashSet<String> = rows
        .into_iter()
        .map(|row| row.try_get::<String, _>("column_name"))
        .collect::<Result<_, _>>()?;

    Ok(StoreCapabilities {
        source_uid: columns.contains("source_uid"),
        canonical_key: columns.contains("canonical_key"),
        content_hash: columns.contains("content_hash"),
    })
}

#[async_trait]
impl EventStore for PgStore {
    async fn capabilities(&self) -> Result<StoreCapabilities> {
        Ok(self.caps)
    }

    async fn find_by_source_uid(&self, source_uid: &str) -> Result<Option<StoredEvent>> {
        let sql = format!(
            "SELECT {} FROM events WHERE source_uid = $1 LIMIT 1",
            self.select_list()
        );
        let row = sqlx::query(&sql)
            .bind(source_uid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(to_stored).transpose()
    }

    async fn find_by_canonical_key(&self, canonical_key: &str) -> Result<Option<StoredEvent>> {
        let sql = format!(
            "SELECT {} FROM events WHERE canonical_key = $1 LIMIT 1",
            self.select_list()
        );
        let row = sqlx::query(&sql)
            .bind(canonical_key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(to_stored).transpose()
    }

    async fn find_by_occurrence(
        &self,
        title: &str,
        start_at: DateTime<Utc>,
        venue: Option<&str>,
    ) -> Result<Option<StoredEvent>> {
        let sql = format!(
            "SELECT {} FROM events \
             WHERE title = $1 AND start_at = $2 AND venue IS NOT DISTINCT FROM $3 LIMIT 1",
            self.select_list()
        );
        let row = sqlx::query(&sql)
            .bind(title)
            .bind(start_at)
            .bind(venue)
            .fetch_optional(&self.pool)
            .await?;
        row.map(to_stored).transpose()
    }

    async fn insert(&self, event: &CanonicalEvent, caps: StoreCapabilities) -> Result<()> {
        let columns = self.writable_columns(caps);
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "INSERT INTO events ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        let tags = join_tags(event);
        let mut query = sqlx::query(&sql);
        for &column in &columns {
            query = bind_column(query, column, event, &tags);
        }
        query
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert event: {}", event.title))?;
        Ok(())
    }

    async fn update(
        &self,
        id: i64,
        event: &CanonicalEvent,
        caps: StoreCapabilities,
    ) -> Result<()> {
        // The sweep owns status, and created_at is immutable.
        let columns: Vec<&str> = self
            .writable_columns(caps)
            .into_iter()
            .filter(|c| *c != "status" && *c != "created_at")
            .collect();
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ${}", i + 2))
            .collect();
        let sql = format!(
            "UPDATE events SET {} WHERE id = $1",
            assignments.join(", ")
        );

        let tags = join_tags(event);
        let mut query = sqlx::query(&sql).bind(id);
        for &column in &columns {
            query = bind_column(query, column, event, &tags);
        }
        query
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update event: {}", event.title))?;
        Ok(())
    }

    async fn mark_past(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE events SET status = 'past', updated_at = NOW() \
             WHERE start_at < $1 AND status <> 'past'",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("Failed to sweep past events")?;
        Ok(result.rows_affected())
    }
}

fn join_tags(event: &CanonicalEvent) -> String {
    event
        .tags
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
