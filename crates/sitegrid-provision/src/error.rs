use std::path::PathBuf;

use thiserror::Error;

use sitegrid_core::InvalidSlug;
use sitegrid_database::DatabaseError;
use sitegrid_dns::DnsError;
use sitegrid_ports::PortError;
use sitegrid_proxy::RouteError;
use sitegrid_state::StateError;
use sitegrid_supervisor::SupervisorError;

/// Failure of a provisioning phase, a compensation, or a precondition.
///
/// Leaf errors that carry one of the cross-cutting kinds (exhaustion,
/// validation, invalid configuration, timeout) are lifted into that kind;
/// everything else keeps its subsystem wrapper.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("validation rejected: {0}")]
    ValidationRejected(String),

    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timed out: {0}")]
    TimedOut(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("provisioning aborted")]
    Aborted,

    #[error("project {0:?} not found")]
    ProjectNotFound(String),

    #[error(transparent)]
    InvalidSlug(#[from] InvalidSlug),

    #[error("database: {0}")]
    Database(DatabaseError),

    #[error("supervisor: {0}")]
    Supervisor(SupervisorError),

    #[error("route: {0}")]
    Route(RouteError),

    #[error("dns: {0}")]
    Dns(DnsError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state: {0}")]
    State(#[from] StateError),
}

impl From<PortError> for ProvisionError {
    fn from(err: PortError) -> Self {
        ProvisionError::ResourceExhausted(err.to_string())
    }
}

impl From<DatabaseError> for ProvisionError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ValidationRejected { .. } => {
                ProvisionError::ValidationRejected(err.to_string())
            }
            DatabaseError::TimedOut { .. } => ProvisionError::TimedOut(err.to_string()),
            DatabaseError::InvalidSlug(e) => ProvisionError::InvalidSlug(e),
            other => ProvisionError::Database(other),
        }
    }
}

impl From<SupervisorError> for ProvisionError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::TimedOut { .. } => ProvisionError::TimedOut(err.to_string()),
            other => ProvisionError::Supervisor(other),
        }
    }
}

impl From<RouteError> for ProvisionError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::ConfigInvalid(msg) => ProvisionError::ConfigInvalid(msg),
            RouteError::TimedOut { .. } => ProvisionError::TimedOut(err.to_string()),
            RouteError::InvalidSlug(e) => ProvisionError::InvalidSlug(e),
            other => ProvisionError::Route(other),
        }
    }
}

impl From<DnsError> for ProvisionError {
    fn from(err: DnsError) -> Self {
        match err {
            DnsError::TimedOut { .. } => ProvisionError::TimedOut(err.to_string()),
            DnsError::InvalidSlug(e) => ProvisionError::InvalidSlug(e),
            other => ProvisionError::Dns(other),
        }
    }
}

impl ProvisionError {
    /// Stable snake_case name of the error kind, for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::ValidationRejected(_) => "validation_rejected",
            Self::ConfigInvalid(_) => "config_invalid",
            Self::Conflict(_) => "conflict",
            Self::TimedOut(_) => "timed_out",
            Self::VerificationFailed(_) => "verification_failed",
            Self::Aborted => "aborted",
            Self::ProjectNotFound(_) => "project_not_found",
            Self::InvalidSlug(_) => "invalid_slug",
            Self::Database(_) => "database",
            Self::Supervisor(_) => "supervisor",
            Self::Route(_) => "route",
            Self::Dns(_) => "dns",
            Self::Io { .. } => "io",
            Self::State(_) => "state",
        }
    }
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;
