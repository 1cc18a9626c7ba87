//! sitegrid-supervisor — long-running project processes.
//!
//! Each project runs a backend and a static frontend under a PM2-style
//! supervisor. A [`ServiceSpec`] is written out as a declarative
//! descriptor, then started, stopped and deregistered by name through the
//! [`ServiceSupervisor`] trait. [`Pm2Supervisor`] drives the `pm2` CLI.

pub mod error;
pub mod pm2;
pub mod spec;

use std::path::PathBuf;

use async_trait::async_trait;

pub use error::{SupervisorError, SupervisorResult};
pub use pm2::Pm2Supervisor;
pub use spec::ServiceSpec;

/// Process supervisor seam.
///
/// `stop` and `deregister` are best-effort: a name the supervisor does not
/// know is not an error.
#[async_trait]
pub trait ServiceSupervisor: Send + Sync {
    /// Write the descriptor for `spec`. Returns its path.
    async fn register(&self, spec: &ServiceSpec) -> SupervisorResult<PathBuf>;

    async fn start(&self, name: &str) -> SupervisorResult<()>;

    async fn stop(&self, name: &str) -> SupervisorResult<()>;

    /// Remove the process from the supervisor and delete its descriptor.
    async fn deregister(&self, name: &str) -> SupervisorResult<()>;

    async fn register_and_start(&self, spec: &ServiceSpec) -> SupervisorResult<PathBuf> {
        let descriptor = self.register(spec).await?;
        self.start(&spec.name).await?;
        Ok(descriptor)
    }
}
