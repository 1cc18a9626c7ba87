//! Teardown coordinator — removes everything a project holds.
//!
//! Works from the provisioning metadata when present and from the slug
//! naming convention otherwise, so a project whose metadata was lost can
//! still be cleaned up. DNS records are never removed.

use serde::Serialize;
use tracing::{info, warn};

use sitegrid_core::validate_slug;
use sitegrid_state::ProjectStatus;

use crate::compensation::{RemovalPlan, StepReport, StepStatus, all_succeeded};
use crate::error::{ProvisionError, ProvisionResult};
use crate::infra::Infrastructure;

#[derive(Debug, Clone, Serialize)]
pub struct TeardownReport {
    pub project_id: String,
    pub slug: String,
    /// Whether a metadata record drove the teardown.
    pub from_metadata: bool,
    pub steps: Vec<StepReport>,
    pub metadata_deleted: bool,
}

impl TeardownReport {
    pub fn succeeded(&self) -> bool {
        all_succeeded(&self.steps)
    }

    pub fn step_status(&self) -> Vec<(String, StepStatus)> {
        self.steps
            .iter()
            .map(|s| (s.resource.to_string(), s.status()))
            .collect()
    }
}

pub struct Teardown {
    infra: Infrastructure,
}

impl Teardown {
    pub fn new(infra: Infrastructure) -> Self {
        Self { infra }
    }

    pub fn infrastructure(&self) -> &Infrastructure {
        &self.infra
    }

    pub async fn teardown(&self, project_id: &str) -> ProvisionResult<TeardownReport> {
        let store = &self.infra.store;
        let project = store.get_project(project_id)?;
        let meta = store.get_metadata(project_id)?;

        let slug = match (&meta, &project) {
            (Some(meta), _) => meta.slug.clone(),
            (None, Some(project)) => project.slug.clone(),
            (None, None) => return Err(ProvisionError::ProjectNotFound(project_id.to_string())),
        };
        validate_slug(&slug)?;

        let project_ports: Vec<u16> = project.iter().flat_map(|p| p.ports()).collect();
        let plan = match &meta {
            Some(meta) => {
                let recorded = RemovalPlan::from_metadata(meta);
                let ports = if recorded.ports.is_empty() {
                    project_ports
                } else {
                    recorded.ports.clone()
                };
                // Everything the convention names is attempted, not only
                // what the ledger recorded. Removal is idempotent.
                let mut plan = RemovalPlan::from_slug(&slug, ports);
                for name in recorded.services {
                    if !plan.services.contains(&name) {
                        plan.services.push(name);
                    }
                }
                if recorded.database.is_some() {
                    plan.database = recorded.database;
                }
                plan
            }
            None => {
                warn!(project = %slug, "no provisioning metadata, falling back to slug names");
                RemovalPlan::from_slug(&slug, project_ports)
            }
        };

        info!(project = %slug, id = %project_id, "teardown started");
        let steps = plan.execute(&self.infra).await;

        let mut report = TeardownReport {
            project_id: project_id.to_string(),
            slug: slug.clone(),
            from_metadata: meta.is_some(),
            steps,
            metadata_deleted: false,
        };

        if report.succeeded() {
            report.metadata_deleted = store.delete_metadata(project_id)?;
            store.clear_project_ports(project_id)?;
            info!(project = %slug, "teardown complete");
        } else {
            if let Some(mut meta) = meta {
                meta.status = ProjectStatus::Failed;
                meta.touch();
                store.put_metadata(&meta)?;
            }
            warn!(project = %slug, "teardown incomplete, metadata kept");
        }
        Ok(report)
    }
}
