use std::time::Duration;

use thiserror::Error;

use sitegrid_core::InvalidSlug;

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("DNS API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("DNS request timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("DNS request failed: {0}")]
    Request(String),

    #[error("unexpected DNS API response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    InvalidSlug(#[from] InvalidSlug),
}

pub type DnsResult<T> = Result<T, DnsError>;
