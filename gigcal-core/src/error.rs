//! Error types for the gigcal ingestion pipeline.

use thiserror::Error;

/// Errors that can occur in the pure pipeline stages.
///
/// Most stages are designed not to fail at all: the extractor and
/// classifier swallow malformed input, and the parser drops individual
/// bad VEVENT blocks instead of erroring. Only a document that cannot
/// be read as a calendar at all surfaces here.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Feed parse error: {0}")]
    FeedParse(String),
}

/// Result type alias for pipeline operations.
pub type IngestResult<T> = Result<T, IngestError>;
