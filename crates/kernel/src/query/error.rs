//! Query engine error types.
//!
//! Configuration errors (unknown entity/relation/column referenced by a
//! listing policy) fail loudly; malformed client input is clamped or skipped
//! upstream and never reaches this enum.

use thiserror::Error;

/// Errors surfaced by query compilation and execution.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("unknown relation '{relation}' on entity '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    #[error("unknown column '{column}' on entity '{entity}'")]
    UnknownColumn { entity: String, column: String },

    #[error("invalid pagination: page={page} per_page={per_page}")]
    InvalidPagination { page: u32, per_page: u32 },

    #[error("store error")]
    Store(#[from] sqlx::Error),
}

/// Result type alias using QueryError.
pub type QueryResult<T> = Result<T, QueryError>;
