//! Error types for feedsync.

use thiserror::Error;

/// Errors that can occur while filtering, merging or persisting events.
#[derive(Error, Debug)]
pub enum FeedSyncError {
    #[error("Malformed filter rule: {0}")]
    MalformedFilterRule(String),

    #[error("Invalid filter operand: {0}")]
    InvalidFilterOperand(String),

    #[error("Unsupported filter action '{0}'")]
    UnsupportedFilterAction(String),

    #[error("No such merge strategy '{0}'")]
    UnknownStrategy(String),

    #[error("Conflict on property {property} while merging event {uid}")]
    UnresolvedConflict { property: String, uid: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("ICS generation error: {0}")]
    IcsGenerate(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for feedsync operations.
pub type FeedSyncResult<T> = Result<T, FeedSyncError>;
