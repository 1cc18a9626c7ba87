use std::time::Duration;

use thiserror::Error;

use sitegrid_core::InvalidSlug;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("refusing to drop database {name:?}: {reason}")]
    ValidationRejected { name: String, reason: String },

    #[error("invalid SQL identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("{operation} failed: {message}")]
    Engine {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} timed out after {after:?}")]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },

    #[error(transparent)]
    InvalidSlug(#[from] InvalidSlug),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
