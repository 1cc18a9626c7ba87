//! The set of subsystems provisioning and teardown operate on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sitegrid_core::ProjectNames;
use sitegrid_core::config::SupervisorConfig;
use sitegrid_database::DatabaseProvisioner;
use sitegrid_dns::DnsProvisioner;
use sitegrid_health::DeploymentCheck;
use sitegrid_ports::PortAllocator;
use sitegrid_proxy::RouteConfigurator;
use sitegrid_state::StateStore;
use sitegrid_supervisor::{ServiceSpec, ServiceSupervisor};

/// Shared handles to every subsystem. Cheap to clone.
#[derive(Clone)]
pub struct Infrastructure {
    pub store: StateStore,
    pub ports: Arc<PortAllocator>,
    pub database: Arc<DatabaseProvisioner>,
    pub supervisor: Arc<dyn ServiceSupervisor>,
    pub routes: Arc<RouteConfigurator>,
    /// `None` when DNS provisioning is disabled.
    pub dns: Option<Arc<DnsProvisioner>>,
    pub verifier: Arc<dyn DeploymentCheck>,
}

/// Where a project's processes live inside its working directory and how
/// they are launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLayout {
    pub backend_dir: String,
    pub backend_interpreter: String,
    pub backend_script: String,
    pub frontend_dir: String,
    pub frontend_interpreter: String,
    pub frontend_script: String,
}

impl ServiceLayout {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            backend_dir: config.backend_dir.clone(),
            backend_interpreter: config.backend_interpreter.clone(),
            backend_script: config.backend_script.clone(),
            frontend_dir: config.frontend_dir.clone(),
            frontend_interpreter: config.frontend_interpreter.clone(),
            frontend_script: config.frontend_script.clone(),
        }
    }

    pub fn backend_path(&self, workdir: &Path) -> PathBuf {
        workdir.join(&self.backend_dir)
    }

    pub fn env_file(&self, workdir: &Path) -> PathBuf {
        self.backend_path(workdir).join(".env")
    }

    pub fn backend_spec(
        &self,
        names: &ProjectNames,
        workdir: &Path,
        port: u16,
        database_url: &str,
    ) -> ServiceSpec {
        ServiceSpec::new(&names.backend_service, self.backend_path(workdir), port)
            .with_command(&self.backend_interpreter, &self.backend_script)
            .with_env("PORT", port.to_string())
            .with_env("BACKEND_PORT", port.to_string())
            .with_env("DATABASE_URL", database_url)
            .with_env("PROJECT_NAME", names.slug.as_str())
            .with_log_dir(workdir.join("logs"))
    }

    pub fn frontend_spec(&self, names: &ProjectNames, workdir: &Path, port: u16) -> ServiceSpec {
        ServiceSpec::new(&names.frontend_service, workdir.join(&self.frontend_dir), port)
            .with_command(&self.frontend_interpreter, &self.frontend_script)
            .with_env("PORT", port.to_string())
            .with_env("PROJECT_NAME", names.slug.as_str())
            .with_log_dir(workdir.join("logs"))
    }
}

impl Default for ServiceLayout {
    fn default() -> Self {
        Self::from_config(&SupervisorConfig::default())
    }
}
