use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use sitegrid_core::{CommandError, InvalidSlug};

#[derive(Debug, Error)]
pub enum RouteError {
    /// The aggregate proxy configuration failed its syntax test.
    #[error("proxy configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("proxy reload failed: {0}")]
    ReloadFailed(String),

    #[error("`{command}` timed out after {after:?}")]
    TimedOut { command: String, after: Duration },

    #[error("cannot run proxy control: {0}")]
    Unavailable(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    InvalidSlug(#[from] InvalidSlug),
}

impl From<CommandError> for RouteError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::TimedOut { program, after } => RouteError::TimedOut {
                command: program,
                after,
            },
            other => RouteError::Unavailable(other.to_string()),
        }
    }
}

pub type RouteResult<T> = Result<T, RouteError>;
