//! Deployment verification.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::probe::{check_health, check_port};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VerificationResult {
    pub frontend_port_open: bool,
    pub backend_port_open: bool,
    /// Only probed when the backend port is open.
    pub backend_health_ok: bool,
    pub overall: bool,
}

impl VerificationResult {
    pub fn new(frontend_port_open: bool, backend_port_open: bool, backend_health_ok: bool) -> Self {
        Self {
            frontend_port_open,
            backend_port_open,
            backend_health_ok,
            overall: frontend_port_open && backend_port_open && backend_health_ok,
        }
    }

    /// Names of the checks that failed, for error messages.
    pub fn failures(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.frontend_port_open {
            failed.push("frontend port closed");
        }
        if !self.backend_port_open {
            failed.push("backend port closed");
        }
        if !self.backend_health_ok {
            failed.push("backend health check failed");
        }
        failed
    }
}

/// Verification seam.
#[async_trait]
pub trait DeploymentCheck: Send + Sync {
    async fn verify(&self, frontend_port: u16, backend_port: u16) -> VerificationResult;
}

pub struct DeploymentVerifier {
    health_path: String,
    port_timeout: Duration,
    health_timeout: Duration,
}

impl DeploymentVerifier {
    pub fn new(health_path: &str, port_timeout: Duration, health_timeout: Duration) -> Self {
        Self {
            health_path: health_path.to_string(),
            port_timeout,
            health_timeout,
        }
    }
}

#[async_trait]
impl DeploymentCheck for DeploymentVerifier {
    async fn verify(&self, frontend_port: u16, backend_port: u16) -> VerificationResult {
        let (frontend_open, backend_open) = tokio::join!(
            check_port(frontend_port, self.port_timeout),
            check_port(backend_port, self.port_timeout),
        );
        let health_ok = backend_open
            && check_health(backend_port, &self.health_path, self.health_timeout)
                .await
                .is_healthy();

        let result = VerificationResult::new(frontend_open, backend_open, health_ok);
        if result.overall {
            info!(frontend_port, backend_port, "deployment verified");
        } else {
            warn!(frontend_port, backend_port, failures = ?result.failures(), "deployment verification failed");
        }
        result
    }
}
