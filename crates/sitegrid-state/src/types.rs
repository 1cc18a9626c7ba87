//! Domain types for the SiteGrid state store.
//!
//! `ProjectRecord` is owned by the surrounding application; SiteGrid only
//! reads its identity and writes status and ports. `ProvisioningMetadata`
//! is SiteGrid's own ledger of every resource a provisioning run touched.

use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Unique identifier for a project.
pub type ProjectId = String;

// ── Project ───────────────────────────────────────────────────────

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Creating,
    Ready,
    Failed,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Failed => "failed",
        })
    }
}

/// The unit of provisioning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    /// URL-safe root for every generated resource name.
    pub slug: String,
    pub status: ProjectStatus,
    /// Directory holding the generated application sources.
    pub workdir: PathBuf,
    /// Set once the project is ready; used to rebuild the port allocator.
    pub frontend_port: Option<u16>,
    pub backend_port: Option<u16>,
    /// Unix timestamp (seconds) when this record was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last status change.
    pub updated_at: u64,
}

impl ProjectRecord {
    /// A fresh record in `creating` status.
    pub fn new(id: &str, name: &str, slug: &str, workdir: impl Into<PathBuf>) -> Self {
        let now = epoch_secs();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            status: ProjectStatus::Creating,
            workdir: workdir.into(),
            frontend_port: None,
            backend_port: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build the key for the projects table.
    pub fn table_key(&self) -> &str {
        &self.id
    }

    /// Both ports, if the project holds any.
    pub fn ports(&self) -> impl Iterator<Item = u16> {
        self.frontend_port.into_iter().chain(self.backend_port)
    }
}

// ── Provisioning ──────────────────────────────────────────────────

/// Ordered phases of a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionPhase {
    AllocatePorts,
    ProvisionDatabase,
    ConfigureBackendEnv,
    RegisterServices,
    ConfigureRoute,
    ProvisionDns,
    StartServices,
    Verify,
}

impl ProvisionPhase {
    /// Every phase, in execution order.
    pub const ALL: [ProvisionPhase; 8] = [
        Self::AllocatePorts,
        Self::ProvisionDatabase,
        Self::ConfigureBackendEnv,
        Self::RegisterServices,
        Self::ConfigureRoute,
        Self::ProvisionDns,
        Self::StartServices,
        Self::Verify,
    ];

    /// 1-based position, for "phase 3/8" log lines.
    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllocatePorts => "allocate_ports",
            Self::ProvisionDatabase => "provision_database",
            Self::ConfigureBackendEnv => "configure_backend_env",
            Self::RegisterServices => "register_services",
            Self::ConfigureRoute => "configure_route",
            Self::ProvisionDns => "provision_dns",
            Self::StartServices => "start_services",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database and role created for a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseRef {
    pub name: String,
    pub user: String,
}

/// A process registered with the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRef {
    pub name: String,
    pub port: u16,
    /// Whether `start` was issued for it.
    pub started: bool,
}

/// An installed proxy route artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteRef {
    pub artifact: PathBuf,
    pub frontend_domain: String,
    pub backend_domain: String,
}

/// Outcome of ensuring one DNS record. Informational only: DNS is
/// never torn down automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DnsEntry {
    pub fqdn: String,
    pub outcome: String,
}

/// Durable ledger of every resource identifier a provisioning run produced.
///
/// Written incrementally: each resource is recorded before the call that
/// creates it, so a record always covers at least what exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisioningMetadata {
    pub project_id: ProjectId,
    pub slug: String,
    pub status: ProjectStatus,
    /// Last phase entered.
    pub phase: Option<ProvisionPhase>,
    pub frontend_port: Option<u16>,
    pub backend_port: Option<u16>,
    pub database: Option<DatabaseRef>,
    pub services: Vec<ServiceRef>,
    pub route: Option<RouteRef>,
    pub dns: Vec<DnsEntry>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl ProvisioningMetadata {
    pub fn new(project_id: &str, slug: &str) -> Self {
        let now = epoch_secs();
        Self {
            project_id: project_id.to_string(),
            slug: slug.to_string(),
            status: ProjectStatus::Creating,
            phase: None,
            frontend_port: None,
            backend_port: None,
            database: None,
            services: Vec::new(),
            route: None,
            dns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build the key for the provisioning table.
    pub fn table_key(&self) -> &str {
        &self.project_id
    }

    /// Whether no teardown-relevant resource is recorded. DNS entries
    /// don't count.
    pub fn is_empty(&self) -> bool {
        self.frontend_port.is_none()
            && self.backend_port.is_none()
            && self.database.is_none()
            && self.services.is_empty()
            && self.route.is_none()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceRef> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn service_mut(&mut self, name: &str) -> Option<&mut ServiceRef> {
        self.services.iter_mut().find(|s| s.name == name)
    }

    pub fn touch(&mut self) {
        self.updated_at = epoch_secs();
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
