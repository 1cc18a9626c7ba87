//! Provisioning orchestrator — drives a project through its phases.
//!
//! ```text
//! AllocatePorts → ProvisionDatabase → ConfigureBackendEnv → RegisterServices
//!   → ConfigureRoute → ProvisionDns → StartServices → Verify → Ready
//!                      any failure ──→ RollingBack → Failed
//! ```
//!
//! Each resource is written to the metadata ledger before the call that
//! creates it, so a run that fails half-way through a phase is still fully
//! compensated. Rollback removes services, route, database and ports in
//! that order; DNS records are left in place.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use sitegrid_core::{ProjectNames, validate_slug};
use sitegrid_database::DatabaseCredential;
use sitegrid_health::VerificationResult;
use sitegrid_ports::Tier;
use sitegrid_state::{
    DatabaseRef, DnsEntry, ProjectRecord, ProjectStatus, ProvisionPhase, ProvisioningMetadata,
    RouteRef, ServiceRef,
};

use crate::compensation::{RemovalPlan, StepReport, all_succeeded};
use crate::env_file::write_env_file;
use crate::error::{ProvisionError, ProvisionResult};
use crate::infra::{Infrastructure, ServiceLayout};

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    /// Complete the DNS phase without touching the provider.
    pub skip_dns: bool,
    /// Override the configured wait between starting services and verifying.
    pub startup_grace: Option<Duration>,
    /// Checked between phases; `true` aborts the run and rolls it back.
    pub abort: Option<watch::Receiver<bool>>,
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionState {
    Ready,
    Failed,
}

/// The phase that failed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseFailure {
    pub phase: ProvisionPhase,
    pub kind: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub project_id: String,
    pub slug: String,
    pub state: ProvisionState,
    /// Final ledger. For a failed run this is what was touched, even if
    /// the persisted record was deleted after a clean rollback.
    pub metadata: ProvisioningMetadata,
    pub verification: Option<VerificationResult>,
    pub failure: Option<PhaseFailure>,
    pub rollback: Vec<StepReport>,
    /// Soft problems that did not stop the run (DNS conflicts).
    pub warnings: Vec<String>,
}

impl ProvisionReport {
    pub fn is_ready(&self) -> bool {
        self.state == ProvisionState::Ready
    }
}

pub struct Orchestrator {
    infra: Infrastructure,
    layout: ServiceLayout,
    startup_grace: Duration,
}

impl Orchestrator {
    pub fn new(infra: Infrastructure, layout: ServiceLayout, startup_grace: Duration) -> Self {
        Self {
            infra,
            layout,
            startup_grace,
        }
    }

    pub fn infrastructure(&self) -> &Infrastructure {
        &self.infra
    }

    /// Provision everything for the project `project_id`.
    ///
    /// Returns `Err` only when nothing was touched (unknown project,
    /// invalid slug, project already provisioned or with leftovers, state
    /// store unavailable). Phase failures come back as a report in state
    /// `Failed` after rollback.
    pub async fn provision(
        &self,
        project_id: &str,
        options: ProvisionOptions,
    ) -> ProvisionResult<ProvisionReport> {
        let store = &self.infra.store;
        let project = store
            .get_project(project_id)?
            .ok_or_else(|| ProvisionError::ProjectNotFound(project_id.to_string()))?;
        validate_slug(&project.slug)?;

        if project.status == ProjectStatus::Ready {
            return Err(ProvisionError::Conflict(format!(
                "project {} is already ready",
                project.slug
            )));
        }
        if store.get_metadata(project_id)?.is_some() {
            return Err(ProvisionError::Conflict(format!(
                "project {} has leftovers from an earlier run; tear it down first",
                project.slug
            )));
        }

        store.set_project_status(project_id, ProjectStatus::Creating, None)?;
        let meta = ProvisioningMetadata::new(&project.id, &project.slug);
        store.put_metadata(&meta)?;
        info!(project = %project.slug, id = %project.id, "provisioning started");

        let mut run = Run {
            infra: &self.infra,
            layout: &self.layout,
            names: ProjectNames::for_slug(&project.slug),
            project,
            meta,
            options,
            startup_grace: self.startup_grace,
            credential: None,
            verification: None,
            warnings: Vec::new(),
        };

        match run.execute().await {
            Ok(()) => Ok(run.into_ready()),
            Err((phase, err)) => Ok(run.roll_back(phase, err).await),
        }
    }
}

/// State of one provisioning run.
struct Run<'a> {
    infra: &'a Infrastructure,
    layout: &'a ServiceLayout,
    project: ProjectRecord,
    names: ProjectNames,
    meta: ProvisioningMetadata,
    options: ProvisionOptions,
    startup_grace: Duration,
    credential: Option<DatabaseCredential>,
    verification: Option<VerificationResult>,
    warnings: Vec<String>,
}

impl Run<'_> {
    fn slug(&self) -> &str {
        &self.project.slug
    }

    fn aborted(&self) -> bool {
        self.options
            .abort
            .as_ref()
            .is_some_and(|rx| *rx.borrow())
    }

    /// Persist the ledger.
    fn save(&mut self) -> ProvisionResult<()> {
        self.meta.touch();
        self.infra.store.put_metadata(&self.meta)?;
        Ok(())
    }

    fn ports(&self) -> ProvisionResult<(u16, u16)> {
        match (self.meta.frontend_port, self.meta.backend_port) {
            (Some(fe), Some(be)) => Ok((fe, be)),
            _ => Err(ProvisionError::ResourceExhausted(
                "ports were not allocated".to_string(),
            )),
        }
    }

    async fn execute(&mut self) -> Result<(), (ProvisionPhase, ProvisionError)> {
        for phase in ProvisionPhase::ALL {
            if self.aborted() {
                warn!(project = %self.slug(), %phase, "abort requested");
                return Err((phase, ProvisionError::Aborted));
            }

            info!(
                project = %self.slug(),
                %phase,
                step = phase.number(),
                of = ProvisionPhase::ALL.len(),
                "phase started"
            );
            self.meta.phase = Some(phase);
            let result = match self.save() {
                Ok(()) => self.run_phase(phase).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                error!(project = %self.slug(), %phase, kind = e.kind(), error = %e, "phase failed");
                return Err((phase, e));
            }
        }

        self.meta.status = ProjectStatus::Ready;
        self.save().map_err(|e| (ProvisionPhase::Verify, e))?;
        let ports = self.ports().map_err(|e| (ProvisionPhase::Verify, e))?;
        self.infra
            .store
            .set_project_status(&self.project.id, ProjectStatus::Ready, Some(ports))
            .map_err(|e| (ProvisionPhase::Verify, e.into()))?;
        Ok(())
    }

    async fn run_phase(&mut self, phase: ProvisionPhase) -> ProvisionResult<()> {
        match phase {
            ProvisionPhase::AllocatePorts => self.allocate_ports(),
            ProvisionPhase::ProvisionDatabase => self.provision_database().await,
            ProvisionPhase::ConfigureBackendEnv => self.configure_backend_env().await,
            ProvisionPhase::RegisterServices => self.register_services().await,
            ProvisionPhase::ConfigureRoute => self.configure_route().await,
            ProvisionPhase::ProvisionDns => self.provision_dns().await,
            ProvisionPhase::StartServices => self.start_services().await,
            ProvisionPhase::Verify => self.verify().await,
        }
    }

    // ── Phases ─────────────────────────────────────────────────────

    fn allocate_ports(&mut self) -> ProvisionResult<()> {
        let frontend = self.infra.ports.allocate(Tier::Frontend)?;
        self.meta.frontend_port = Some(frontend);
        self.save()?;

        let backend = self.infra.ports.allocate(Tier::Backend)?;
        self.meta.backend_port = Some(backend);
        self.save()?;

        info!(project = %self.slug(), frontend, backend, "ports allocated");
        Ok(())
    }

    async fn provision_database(&mut self) -> ProvisionResult<()> {
        self.meta.database = Some(DatabaseRef {
            name: self.names.database.clone(),
            user: self.names.database_user.clone(),
        });
        self.save()?;

        let credential = self.infra.database.create(&self.project.slug).await?;
        self.credential = Some(credential);
        Ok(())
    }

    async fn configure_backend_env(&mut self) -> ProvisionResult<()> {
        let (_, backend) = self.ports()?;
        let url = self.database_url()?;
        let path = self.layout.env_file(&self.project.workdir);
        let vars = [
            ("DATABASE_URL", url),
            ("BACKEND_PORT", backend.to_string()),
            ("PROJECT_NAME", self.project.slug.clone()),
        ];
        write_env_file(&path, &vars).await?;
        info!(project = %self.slug(), path = %path.display(), "backend environment configured");
        Ok(())
    }

    async fn register_services(&mut self) -> ProvisionResult<()> {
        let (frontend, backend) = self.ports()?;
        let workdir = self.project.workdir.clone();
        let specs = [
            self.layout
                .backend_spec(&self.names, &workdir, backend, &self.database_url()?),
            self.layout.frontend_spec(&self.names, &workdir, frontend),
        ];

        for spec in specs {
            self.meta.services.push(ServiceRef {
                name: spec.name.clone(),
                port: spec.port,
                started: false,
            });
            self.save()?;
            self.infra.supervisor.register(&spec).await?;
        }
        Ok(())
    }

    async fn configure_route(&mut self) -> ProvisionResult<()> {
        let (frontend, backend) = self.ports()?;
        let route = self.infra.routes.generate(&self.project.slug, frontend, backend);

        self.meta.route = Some(RouteRef {
            artifact: self.infra.routes.artifact_path(&route.slug),
            frontend_domain: route.frontend_domain.clone(),
            backend_domain: route.backend_domain.clone(),
        });
        self.save()?;

        self.infra.routes.apply(&route).await?;
        Ok(())
    }

    async fn provision_dns(&mut self) -> ProvisionResult<()> {
        let dns = match &self.infra.dns {
            Some(dns) if !self.options.skip_dns => dns.clone(),
            _ => {
                info!(project = %self.slug(), "DNS provisioning skipped");
                return Ok(());
            }
        };

        let result = dns.provision_project_dns(&self.project.slug).await?;
        for record in result.records() {
            if record.outcome.is_conflict() {
                let warning = format!("{}: {}", record.fqdn, record.outcome);
                warn!(project = %self.slug(), %warning, "DNS conflict, continuing");
                self.warnings.push(warning);
            }
            self.meta.dns.push(DnsEntry {
                fqdn: record.fqdn.clone(),
                outcome: record.outcome.to_string(),
            });
        }
        self.save()
    }

    async fn start_services(&mut self) -> ProvisionResult<()> {
        let names = [
            self.names.backend_service.clone(),
            self.names.frontend_service.clone(),
        ];
        for name in &names {
            if let Some(service) = self.meta.service_mut(name) {
                service.started = true;
            }
            self.save()?;
            self.infra.supervisor.start(name).await?;
        }

        let grace = self.options.startup_grace.unwrap_or(self.startup_grace);
        if !grace.is_zero() {
            info!(project = %self.slug(), ?grace, "waiting for services to initialize");
            tokio::time::sleep(grace).await;
        }
        Ok(())
    }

    async fn verify(&mut self) -> ProvisionResult<()> {
        let (frontend, backend) = self.ports()?;
        let result = self.infra.verifier.verify(frontend, backend).await;
        self.verification = Some(result);
        if !result.overall {
            return Err(ProvisionError::VerificationFailed(result.failures().join(", ")));
        }
        Ok(())
    }

    fn database_url(&self) -> ProvisionResult<String> {
        self.credential
            .as_ref()
            .map(|c| c.url.clone())
            .ok_or_else(|| ProvisionError::ValidationRejected("database was not provisioned".to_string()))
    }

    // ── Terminal states ────────────────────────────────────────────

    fn into_ready(self) -> ProvisionReport {
        info!(
            project = %self.project.slug,
            frontend = ?self.meta.frontend_port,
            backend = ?self.meta.backend_port,
            "provisioning complete"
        );
        ProvisionReport {
            project_id: self.project.id,
            slug: self.project.slug,
            state: ProvisionState::Ready,
            metadata: self.meta,
            verification: self.verification,
            failure: None,
            rollback: Vec::new(),
            warnings: self.warnings,
        }
    }

    async fn roll_back(mut self, phase: ProvisionPhase, err: ProvisionError) -> ProvisionReport {
        warn!(project = %self.slug(), %phase, "rolling back");
        let rollback = RemovalPlan::from_metadata(&self.meta).execute(self.infra).await;
        let clean = all_succeeded(&rollback);

        let store = &self.infra.store;
        self.meta.status = ProjectStatus::Failed;
        self.meta.touch();
        let kept = if clean {
            store.delete_metadata(&self.project.id).map(|_| ())
        } else {
            store.put_metadata(&self.meta)
        };
        if let Err(e) = kept {
            error!(project = %self.project.slug, error = %e, "failed to persist rollback outcome");
        }
        if let Err(e) = store.set_project_status(&self.project.id, ProjectStatus::Failed, None) {
            error!(project = %self.project.slug, error = %e, "failed to mark project failed");
        }

        if clean {
            info!(project = %self.project.slug, "rollback complete");
        } else {
            error!(project = %self.project.slug, "rollback incomplete, metadata kept for teardown");
        }

        ProvisionReport {
            project_id: self.project.id,
            slug: self.project.slug,
            state: ProvisionState::Failed,
            metadata: self.meta,
            verification: self.verification,
            failure: Some(PhaseFailure {
                phase,
                kind: err.kind(),
                error: err.to_string(),
            }),
            rollback,
            warnings: self.warnings,
        }
    }
}
