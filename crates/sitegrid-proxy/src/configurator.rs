//! Route installation against the shared nginx configuration.
//!
//! Artifacts are written to `sites-available/{slug}.conf` and enabled
//! with a symlink in `sites-enabled/`. Every mutation of the aggregate
//! configuration (install + test + reload, remove + test + reload) runs
//! under one lock so two projects never interleave their test and reload.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use sitegrid_core::{ProjectNames, validate_slug};

use crate::config::{RouteConfig, generate};
use crate::control::ProxyControl;
use crate::error::{RouteError, RouteResult};

pub struct RouteConfigurator {
    available: PathBuf,
    enabled: PathBuf,
    base_domain: String,
    control: Arc<dyn ProxyControl>,
    lock: Mutex<()>,
}

/// Artifact and link state before an install, for restoring on failure.
struct Snapshot {
    artifact: Option<String>,
    linked: bool,
}

impl RouteConfigurator {
    pub fn new(
        available: impl Into<PathBuf>,
        enabled: impl Into<PathBuf>,
        base_domain: &str,
        control: Arc<dyn ProxyControl>,
    ) -> Self {
        Self {
            available: available.into(),
            enabled: enabled.into(),
            base_domain: base_domain.to_string(),
            control,
            lock: Mutex::new(()),
        }
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Render the route for a project under the configured base domain.
    pub fn generate(&self, slug: &str, frontend_port: u16, backend_port: u16) -> RouteConfig {
        generate(slug, &self.base_domain, frontend_port, backend_port)
    }

    pub fn artifact_path(&self, slug: &str) -> PathBuf {
        self.available.join(ProjectNames::for_slug(slug).route_file)
    }

    pub fn link_path(&self, slug: &str) -> PathBuf {
        self.enabled.join(ProjectNames::for_slug(slug).route_file)
    }

    /// Write the artifact and (re)create its enabling symlink. Does not
    /// reload; see [`apply`](Self::apply).
    pub async fn install(&self, slug: &str, artifact: &str) -> RouteResult<PathBuf> {
        validate_slug(slug)?;
        let path = self.artifact_path(slug);
        let link = self.link_path(slug);

        for dir in [&self.available, &self.enabled] {
            tokio::fs::create_dir_all(dir).await.map_err(io_err(dir))?;
        }
        tokio::fs::write(&path, artifact).await.map_err(io_err(&path))?;
        remove_if_present(&link).await?;
        tokio::fs::symlink(&path, &link).await.map_err(io_err(&link))?;
        Ok(path)
    }

    /// Test the aggregate configuration and reload only if it passes.
    pub async fn reload(&self) -> RouteResult<()> {
        self.control.test_config().await?;
        self.control.reload().await
    }

    /// Install and reload under the configuration lock.
    ///
    /// When the aggregate test fails the previous artifact (or its
    /// absence) is put back and nothing is reloaded, so the live
    /// configuration is untouched.
    pub async fn apply(&self, route: &RouteConfig) -> RouteResult<PathBuf> {
        let _guard = self.lock.lock().await;
        let snapshot = self.snapshot(&route.slug).await?;
        let path = self.install(&route.slug, &route.artifact).await?;

        if let Err(e) = self.control.test_config().await {
            warn!(project = %route.slug, error = %e, "route rejected, restoring previous configuration");
            if let Err(restore) = self.restore(&route.slug, snapshot).await {
                warn!(project = %route.slug, error = %restore, "failed to restore previous route");
            }
            return Err(e);
        }
        self.control.reload().await?;

        info!(
            project = %route.slug,
            frontend = %route.frontend_domain,
            backend = %route.backend_domain,
            artifact = %path.display(),
            "route applied"
        );
        Ok(path)
    }

    /// Delete the link and artifact, then test and reload. Returns whether
    /// anything was removed; nothing to remove means no reload.
    pub async fn remove(&self, slug: &str) -> RouteResult<bool> {
        validate_slug(slug)?;
        let _guard = self.lock.lock().await;

        let unlinked = remove_if_present(&self.link_path(slug)).await?;
        let deleted = remove_if_present(&self.artifact_path(slug)).await?;
        if !unlinked && !deleted {
            info!(project = %slug, "no route to remove");
            return Ok(false);
        }

        self.reload().await?;
        info!(project = %slug, "route removed");
        Ok(true)
    }

    /// Whether an artifact is installed for `slug`.
    pub async fn is_installed(&self, slug: &str) -> bool {
        tokio::fs::try_exists(self.artifact_path(slug))
            .await
            .unwrap_or(false)
    }

    async fn snapshot(&self, slug: &str) -> RouteResult<Snapshot> {
        let path = self.artifact_path(slug);
        let artifact = match tokio::fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(io_err(&path)(e)),
        };
        let linked = tokio::fs::symlink_metadata(self.link_path(slug)).await.is_ok();
        Ok(Snapshot { artifact, linked })
    }

    async fn restore(&self, slug: &str, snapshot: Snapshot) -> RouteResult<()> {
        match snapshot.artifact {
            Some(previous) => {
                self.install(slug, &previous).await?;
                if !snapshot.linked {
                    remove_if_present(&self.link_path(slug)).await?;
                }
            }
            None => {
                remove_if_present(&self.link_path(slug)).await?;
                remove_if_present(&self.artifact_path(slug)).await?;
            }
        }
        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RouteError + '_ {
    move |source| RouteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Remove a file or symlink. Returns false if it did not exist.
async fn remove_if_present(path: &Path) -> RouteResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(path)(e)),
    }
}
