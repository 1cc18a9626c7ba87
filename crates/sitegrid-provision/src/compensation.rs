//! Resource removal shared by rollback, teardown and GC.
//!
//! Removal runs per resource class in a fixed order: services, route,
//! database, ports. Each class reports independently; a failure in one
//! never prevents the next from being attempted. Every removal is
//! idempotent, so running it against a resource that was never created
//! (or is already gone) succeeds.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use sitegrid_core::naming;
use sitegrid_state::ProvisioningMetadata;

use crate::error::ProvisionError;
use crate::infra::Infrastructure;

/// The resource classes provisioning creates and removal undoes. DNS is
/// not one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Services,
    Route,
    Database,
    Ports,
}

impl ResourceClass {
    /// Removal order.
    pub const ORDER: [ResourceClass; 4] = [
        Self::Services,
        Self::Route,
        Self::Database,
        Self::Ports,
    ];
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Services => "services",
            Self::Route => "route",
            Self::Database => "database",
            Self::Ports => "ports",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Removed,
    Skipped,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Removed => "removed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        })
    }
}

/// Outcome of removing one resource class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub resource: ResourceClass,
    pub attempted: bool,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl StepReport {
    pub fn skipped(resource: ResourceClass) -> Self {
        Self {
            resource,
            attempted: false,
            succeeded: true,
            error: None,
        }
    }

    fn from_errors(resource: ResourceClass, errors: Vec<String>) -> Self {
        let succeeded = errors.is_empty();
        Self {
            resource,
            attempted: true,
            succeeded,
            error: (!succeeded).then(|| errors.join("; ")),
        }
    }

    pub fn status(&self) -> StepStatus {
        match (self.attempted, self.succeeded) {
            (false, _) => StepStatus::Skipped,
            (true, true) => StepStatus::Removed,
            (true, false) => StepStatus::Failed,
        }
    }
}

/// Whether every step in `steps` succeeded (skips count as success).
pub fn all_succeeded(steps: &[StepReport]) -> bool {
    steps.iter().all(|s| s.succeeded)
}

/// What to remove for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalPlan {
    pub slug: String,
    pub services: Vec<String>,
    pub route: bool,
    pub database: Option<String>,
    pub ports: Vec<u16>,
}

impl RemovalPlan {
    /// Remove every class in order, collecting one report per class.
    pub async fn execute(&self, infra: &Infrastructure) -> Vec<StepReport> {
        let mut steps = Vec::with_capacity(ResourceClass::ORDER.len());
        for class in ResourceClass::ORDER {
            let step = match class {
                ResourceClass::Services => self.remove_services(infra).await,
                ResourceClass::Route => self.remove_route(infra).await,
                ResourceClass::Database => self.drop_database(infra).await,
                ResourceClass::Ports => self.release_ports(infra),
            };
            match step.status() {
                StepStatus::Failed => warn!(
                    project = %self.slug,
                    resource = %step.resource,
                    error = step.error.as_deref().unwrap_or(""),
                    "removal step failed"
                ),
                status => info!(project = %self.slug, resource = %step.resource, %status, "removal step"),
            }
            steps.push(step);
        }
        steps
    }

    async fn remove_services(&self, infra: &Infrastructure) -> StepReport {
        if self.services.is_empty() {
            return StepReport::skipped(ResourceClass::Services);
        }
        let mut errors = Vec::new();
        for name in &self.services {
            if let Err(e) = infra.supervisor.stop(name).await {
                errors.push(format!("stop {name}: {}", ProvisionError::from(e)));
            }
            if let Err(e) = infra.supervisor.deregister(name).await {
                errors.push(format!("deregister {name}: {}", ProvisionError::from(e)));
            }
        }
        StepReport::from_errors(ResourceClass::Services, errors)
    }

    async fn remove_route(&self, infra: &Infrastructure) -> StepReport {
        if !self.route {
            return StepReport::skipped(ResourceClass::Route);
        }
        let errors = match infra.routes.remove(&self.slug).await {
            Ok(_) => Vec::new(),
            Err(e) => vec![ProvisionError::from(e).to_string()],
        };
        StepReport::from_errors(ResourceClass::Route, errors)
    }

    async fn drop_database(&self, infra: &Infrastructure) -> StepReport {
        let Some(name) = &self.database else {
            return StepReport::skipped(ResourceClass::Database);
        };
        let errors = match (*infra.database).drop(name, false).await {
            Ok(()) => Vec::new(),
            Err(e) => vec![ProvisionError::from(e).to_string()],
        };
        StepReport::from_errors(ResourceClass::Database, errors)
    }

    fn release_ports(&self, infra: &Infrastructure) -> StepReport {
        if self.ports.is_empty() {
            return StepReport::skipped(ResourceClass::Ports);
        }
        for port in &self.ports {
            infra.ports.release(*port);
        }
        StepReport::from_errors(ResourceClass::Ports, Vec::new())
    }

    /// Plan covering exactly what a metadata record says was touched.
    pub fn from_metadata(meta: &ProvisioningMetadata) -> Self {
        Self {
            slug: meta.slug.clone(),
            services: meta.services.iter().map(|s| s.name.clone()).collect(),
            route: meta.route.is_some(),
            database: meta.database.as_ref().map(|d| d.name.clone()),
            ports: meta.frontend_port.into_iter().chain(meta.backend_port).collect(),
        }
    }

    /// Plan derived purely from the slug naming convention plus known
    /// ports, for when no metadata record survives.
    pub fn from_slug(slug: &str, ports: Vec<u16>) -> Self {
        let names = sitegrid_core::ProjectNames::for_slug(slug);
        Self {
            slug: slug.to_string(),
            services: vec![names.backend_service, names.frontend_service],
            route: true,
            database: Some(naming::database_name(slug)),
            ports,
        }
    }
}
