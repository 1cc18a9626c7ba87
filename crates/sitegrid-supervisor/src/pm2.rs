//! PM2 CLI adapter.
//!
//! Descriptors live in one directory as `{name}.config.json`. `start`
//! hands the descriptor to `pm2 start`; `stop` and `deregister` address
//! the process by name.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use sitegrid_core::run_command;

use crate::error::{SupervisorError, SupervisorResult};
use crate::spec::ServiceSpec;
use crate::ServiceSupervisor;

pub struct Pm2Supervisor {
    pm2_bin: String,
    descriptor_dir: PathBuf,
    timeout: Duration,
}

impl Pm2Supervisor {
    pub fn new(pm2_bin: &str, descriptor_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            pm2_bin: pm2_bin.to_string(),
            descriptor_dir: descriptor_dir.into(),
            timeout,
        }
    }

    pub fn descriptor_path(&self, name: &str) -> PathBuf {
        self.descriptor_dir.join(ServiceSpec::descriptor_file(name))
    }

    /// Run `pm2 args…`. With `allow_missing`, a "not found" failure for an
    /// unknown process name counts as success.
    async fn pm2(&self, args: &[&str], allow_missing: bool) -> SupervisorResult<()> {
        let output = run_command(&self.pm2_bin, args, self.timeout).await?;
        if output.success() {
            return Ok(());
        }
        let message = output.diagnostic().to_string();
        if allow_missing && is_not_found(&message) {
            debug!(args = ?args, "pm2 process already absent");
            return Ok(());
        }
        Err(SupervisorError::CommandFailed {
            command: format!("{} {}", self.pm2_bin, args.join(" ")),
            code: output.code,
            message,
        })
    }
}

fn is_not_found(message: &str) -> bool {
    message.to_lowercase().contains("not found")
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SupervisorError + '_ {
    move |source| SupervisorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl ServiceSupervisor for Pm2Supervisor {
    async fn register(&self, spec: &ServiceSpec) -> SupervisorResult<PathBuf> {
        tokio::fs::create_dir_all(&self.descriptor_dir)
            .await
            .map_err(io_err(&self.descriptor_dir))?;
        tokio::fs::create_dir_all(&spec.log_dir)
            .await
            .map_err(io_err(&spec.log_dir))?;

        let path = self.descriptor_path(&spec.name);
        let body = serde_json::to_vec_pretty(&spec.descriptor())?;
        tokio::fs::write(&path, body).await.map_err(io_err(&path))?;
        info!(service = %spec.name, port = spec.port, descriptor = %path.display(), "service registered");
        Ok(path)
    }

    async fn start(&self, name: &str) -> SupervisorResult<()> {
        let path = self.descriptor_path(name);
        if !tokio::fs::try_exists(&path).await.map_err(io_err(&path))? {
            return Err(SupervisorError::NotRegistered(name.to_string()));
        }
        let path_str = path.to_string_lossy();
        self.pm2(&["start", path_str.as_ref()], false).await?;
        info!(service = %name, "service started");
        Ok(())
    }

    async fn stop(&self, name: &str) -> SupervisorResult<()> {
        self.pm2(&["stop", name], true).await?;
        info!(service = %name, "service stopped");
        Ok(())
    }

    async fn deregister(&self, name: &str) -> SupervisorResult<()> {
        self.pm2(&["delete", name], true).await?;

        let path = self.descriptor_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(service = %name, "descriptor already removed");
            }
            Err(e) => return Err(io_err(&path)(e)),
        }
        info!(service = %name, "service deregistered");
        Ok(())
    }
}
