//! Core types and pure pipeline stages for gigcal.
//!
//! This crate holds everything in the ingestion pipeline that needs no
//! I/O: feed parsing, description field extraction, classification, and
//! canonicalization. The binary crate layers fetching, the store, and
//! the merge engine on top.

pub mod canonical;
pub mod classify;
pub mod error;
pub mod event;
pub mod extract;
pub mod feed;

// Re-export the main types at crate root for convenience
pub use canonical::{canonicalize, CanonicalCtx};
pub use classify::classify;
pub use error::{IngestError, IngestResult};
pub use event::{CanonicalEvent, Category, EventStatus, ParsedFields, RawEvent};
pub use extract::extract_fields;
pub use feed::{parse_feed, ParsedFeed};
