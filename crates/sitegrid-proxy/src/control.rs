//! Proxy process control seam.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use sitegrid_core::run_command;

use crate::error::{RouteError, RouteResult};

/// Test and reload the running proxy.
#[async_trait]
pub trait ProxyControl: Send + Sync {
    /// Validate the aggregate configuration. `ConfigInvalid` on failure.
    async fn test_config(&self) -> RouteResult<()>;

    /// Signal the proxy to load its configuration.
    async fn reload(&self) -> RouteResult<()>;
}

/// `nginx -t` / `nginx -s reload`.
pub struct NginxControl {
    nginx_bin: String,
    timeout: Duration,
}

impl NginxControl {
    pub fn new(nginx_bin: &str, timeout: Duration) -> Self {
        Self {
            nginx_bin: nginx_bin.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ProxyControl for NginxControl {
    async fn test_config(&self) -> RouteResult<()> {
        let output = run_command(&self.nginx_bin, &["-t"], self.timeout).await?;
        if !output.success() {
            return Err(RouteError::ConfigInvalid(output.diagnostic().to_string()));
        }
        debug!("nginx configuration test passed");
        Ok(())
    }

    async fn reload(&self) -> RouteResult<()> {
        let output = run_command(&self.nginx_bin, &["-s", "reload"], self.timeout).await?;
        if !output.success() {
            return Err(RouteError::ReloadFailed(output.diagnostic().to_string()));
        }
        info!("nginx reloaded");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_test_is_config_invalid() {
        // `false` ignores its arguments and exits 1.
        let control = NginxControl::new("false", Duration::from_secs(5));
        let err = control.test_config().await.unwrap_err();
        assert!(matches!(err, RouteError::ConfigInvalid(_)));

        let err = control.reload().await.unwrap_err();
        assert!(matches!(err, RouteError::ReloadFailed(_)));
    }

    #[tokio::test]
    async fn passing_test_and_reload() {
        let control = NginxControl::new("true", Duration::from_secs(5));
        control.test_config().await.unwrap();
        control.reload().await.unwrap();
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let control = NginxControl::new("/nonexistent/nginx", Duration::from_secs(1));
        let err = control.test_config().await.unwrap_err();
        assert!(matches!(err, RouteError::Unavailable(_)));
    }
}
