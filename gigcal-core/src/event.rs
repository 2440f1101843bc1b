//! Pipeline data model.
//!
//! `RawEvent` is what the feed parser yields, `ParsedFields` is what the
//! description extractor recovers, and `CanonicalEvent` is the unit that
//! gets persisted. Raw and parsed values are ephemeral: each flows
//! through the pipeline exactly once.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event as it appears in a feed, before any enrichment.
///
/// Fields that a feed may simply not publish are explicit options;
/// absence is data here, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// Explicit all-day marker (bare DTSTART date) or the midnight
    /// heuristic, see `feed::parse_feed`.
    pub all_day: bool,
    pub location: Option<String>,
    pub description: Option<String>,
    pub organizer: Option<String>,
    /// Stable identifier from the feed (UID property), when present.
    pub source_uid: Option<String>,
    /// TZID the feed declared for the start time, if any.
    pub tz_hint: Option<String>,
}

/// Structured data recovered from an event's free-text description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub tickets_url: Option<String>,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    pub tags: BTreeSet<String>,
    pub organizer_override: Option<String>,
    pub price_from: Option<f64>,
    pub featured: bool,
    /// Every absolute URL seen anywhere in the text. Only consulted for
    /// fallback inference inside the extractor; downstream stages ignore it.
    pub urls: Vec<String>,
}

/// The closed set of event categories, in tag-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Concert,
    Nightlife,
    Comedy,
    Festival,
    Other,
}

impl Category {
    /// Priority order used when matching tags against category names.
    pub const ALL: [Category; 5] = [
        Category::Concert,
        Category::Nightlife,
        Category::Comedy,
        Category::Festival,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Concert => "concert",
            Category::Nightlife => "nightlife",
            Category::Comedy => "comedy",
            Category::Festival => "festival",
            Category::Other => "other",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// Lifecycle status of a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Past,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Upcoming => "upcoming",
            EventStatus::Past => "past",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<EventStatus> {
        match s {
            "upcoming" => Some(EventStatus::Upcoming),
            "past" => Some(EventStatus::Past),
            _ => None,
        }
    }
}

/// The persisted unit: one deduplicated event listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    // Identity
    pub source_uid: Option<String>,
    pub canonical_key: String,
    pub content_hash: String,

    // Descriptive
    pub title: String,
    pub description: String,
    pub category: Category,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// IANA identifier of the deployment's display timezone.
    pub timezone: String,
    pub all_day: bool,
    pub venue: Option<String>,
    pub address: Option<String>,
    pub city: String,
    pub organizer: Option<String>,

    // Commercial
    pub tickets_url: Option<String>,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
    pub price_from: Option<f64>,
    pub tags: BTreeSet<String>,
    pub featured: bool,

    // Lifecycle
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
