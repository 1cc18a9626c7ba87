use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use sitegrid_core::CommandError;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("service {0:?} is not registered")]
    NotRegistered(String),

    #[error("`{command}` failed (exit {code:?}): {message}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        message: String,
    },

    #[error("`{command}` timed out after {after:?}")]
    TimedOut { command: String, after: Duration },

    #[error("cannot run supervisor: {0}")]
    Unavailable(String),

    #[error("descriptor {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("descriptor serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<CommandError> for SupervisorError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::TimedOut { program, after } => SupervisorError::TimedOut {
                command: program,
                after,
            },
            other => SupervisorError::Unavailable(other.to_string()),
        }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
