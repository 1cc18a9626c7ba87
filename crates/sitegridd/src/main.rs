//! sitegridd — the SiteGrid provisioning daemon.
//!
//! Single binary that assembles all SiteGrid subsystems from
//! `sitegrid.toml`:
//! - State store (redb)
//! - Port allocator, rebuilt from ready projects
//! - PostgreSQL provisioner
//! - PM2 supervisor
//! - nginx route configurator
//! - DNS provisioner (optional)
//! - Deployment verifier
//!
//! # Usage
//!
//! ```text
//! sitegridd --config /etc/sitegrid/sitegrid.toml register --id p1 --slug demo --workdir /srv/projects/demo
//! sitegridd --config /etc/sitegrid/sitegrid.toml provision p1
//! sitegridd --config /etc/sitegrid/sitegrid.toml teardown p1
//! ```
//!
//! Reports are printed to stdout as JSON; logs go to stderr.

mod assembly;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use sitegrid_core::{SitegridConfig, parse_duration};
use sitegrid_health::DeploymentCheck;
use sitegrid_provision::{ProvisionOptions, stale_candidates, sweep_stale};
use sitegrid_state::{ProjectRecord, ProjectStatus};

const DEFAULT_FILTER: &str = "info,sitegridd=debug,sitegrid=debug";

#[derive(Parser)]
#[command(name = "sitegridd", about = "SiteGrid provisioning daemon", version)]
struct Cli {
    /// Configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a new project so it can be provisioned.
    Register {
        #[arg(long)]
        id: String,
        #[arg(long)]
        slug: String,
        /// Display name (defaults to the slug).
        #[arg(long)]
        name: Option<String>,
        /// Directory holding the generated application sources.
        #[arg(long)]
        workdir: PathBuf,
    },

    /// Provision every resource for a project and mark it ready.
    Provision {
        project_id: String,
        /// Do not create DNS records.
        #[arg(long)]
        skip_dns: bool,
        /// Override the wait between starting services and verifying ("5s").
        #[arg(long)]
        startup_grace: Option<String>,
    },

    /// Remove everything a project holds (DNS records are kept).
    Teardown { project_id: String },

    /// Show a project record and its provisioning metadata.
    Status {
        project_id: String,
        /// Also query the size of the project database.
        #[arg(long)]
        db_size: bool,
    },

    /// List projects, optionally filtered by status.
    List {
        #[arg(long)]
        status: Option<String>,
    },

    /// Tear down leftovers of failed, orphaned or stuck runs.
    Gc {
        /// Override `[state].stale_after` ("30m").
        #[arg(long)]
        stale_after: Option<String>,
        /// Only list what would be swept.
        #[arg(long)]
        dry_run: bool,
    },

    /// Probe a frontend/backend port pair.
    Verify {
        #[arg(long)]
        frontend_port: u16,
        #[arg(long)]
        backend_port: u16,
    },

    /// Print the proxy route a project would get.
    RenderRoute {
        slug: String,
        #[arg(long)]
        frontend_port: u16,
        #[arg(long)]
        backend_port: u16,
    },

    /// Validate the configuration and print it with defaults filled in.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = match &cli.config {
        Some(path) => SitegridConfig::from_file(path)?,
        None => {
            let config = SitegridConfig::default();
            config.validate()?;
            config
        }
    };

    run(cli.command, config).await
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(command: Command, config: SitegridConfig) -> anyhow::Result<()> {
    match command {
        Command::Register {
            id,
            slug,
            name,
            workdir,
        } => {
            sitegrid_core::validate_slug(&slug)?;
            let store = assembly::open_store(&config)?;
            if store.get_project(&id)?.is_some() {
                bail!("project {id} already exists");
            }
            if let Some(existing) = store.find_project_by_slug(&slug)? {
                bail!("slug {slug} is already used by project {}", existing.id);
            }
            let project = ProjectRecord::new(&id, name.as_deref().unwrap_or(&slug), &slug, workdir);
            store.put_project(&project)?;
            info!(id = %project.id, slug = %project.slug, "project registered");
            print_json(&project)
        }

        Command::Provision {
            project_id,
            skip_dns,
            startup_grace,
        } => {
            let startup_grace = startup_grace
                .map(|s| parse_duration(&s).with_context(|| format!("invalid duration {s:?}")))
                .transpose()?;
            let orchestrator = assembly::orchestrator(&config)?;

            // Ctrl-C aborts between phases and rolls back.
            let (abort_tx, abort_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, aborting after the current phase");
                    let _ = abort_tx.send(true);
                }
            });

            let options = ProvisionOptions {
                skip_dns,
                startup_grace,
                abort: Some(abort_rx),
            };
            let report = orchestrator.provision(&project_id, options).await?;
            print_json(&report)?;
            if let Some(failure) = &report.failure {
                bail!(
                    "provisioning {} failed at {}: {}",
                    report.slug,
                    failure.phase,
                    failure.error
                );
            }
            Ok(())
        }

        Command::Teardown { project_id } => {
            let teardown = assembly::teardown(&config)?;
            let report = teardown.teardown(&project_id).await?;
            print_json(&report)?;
            if !report.succeeded() {
                bail!("teardown of {} incomplete; metadata kept for retry", report.slug);
            }
            Ok(())
        }

        Command::Status {
            project_id,
            db_size,
        } => {
            let store = assembly::open_store(&config)?;
            let project = store
                .get_project(&project_id)?
                .with_context(|| format!("project {project_id} not found"))?;
            let metadata = store.get_metadata(&project_id)?;

            let database_bytes = if db_size {
                let database = assembly::database(&config)?;
                database.database_size(&project.slug).await?
            } else {
                None
            };

            #[derive(Serialize)]
            struct Status {
                project: ProjectRecord,
                metadata: Option<sitegrid_state::ProvisioningMetadata>,
                #[serde(skip_serializing_if = "Option::is_none")]
                database_bytes: Option<u64>,
            }
            print_json(&Status {
                project,
                metadata,
                database_bytes,
            })
        }

        Command::List { status } => {
            let store = assembly::open_store(&config)?;
            let projects = match status.as_deref() {
                None => store.list_projects()?,
                Some(s) => store.list_projects_with_status(parse_status(s)?)?,
            };
            print_json(&projects)
        }

        Command::Gc {
            stale_after,
            dry_run,
        } => {
            let stale_after = match stale_after {
                Some(s) => parse_duration(&s).with_context(|| format!("invalid duration {s:?}"))?,
                None => config.state.stale_after(),
            };
            let teardown = assembly::teardown(&config)?;

            if dry_run {
                let candidates = stale_candidates(&teardown, stale_after)?;
                for candidate in &candidates {
                    info!(project = %candidate.project_id, reason = candidate.reason, "would sweep");
                }
                let ids: Vec<_> = candidates.iter().map(|c| c.project_id.as_str()).collect();
                return print_json(&ids);
            }

            let reports = sweep_stale(&teardown, stale_after).await?;
            print_json(&reports)?;
            let incomplete = reports.iter().filter(|r| !r.succeeded()).count();
            if incomplete > 0 {
                bail!("{incomplete} teardown(s) incomplete");
            }
            Ok(())
        }

        Command::Verify {
            frontend_port,
            backend_port,
        } => {
            let verifier = assembly::verifier(&config);
            let result = verifier.verify(frontend_port, backend_port).await;
            print_json(&result)?;
            if !result.overall {
                bail!("verification failed: {}", result.failures().join(", "));
            }
            Ok(())
        }

        Command::RenderRoute {
            slug,
            frontend_port,
            backend_port,
        } => {
            sitegrid_core::validate_slug(&slug)?;
            let route =
                sitegrid_proxy::generate(&slug, &config.host.base_domain, frontend_port, backend_port);
            print!("{}", route.artifact);
            Ok(())
        }

        Command::CheckConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn parse_status(s: &str) -> anyhow::Result<ProjectStatus> {
    match s {
        "creating" => Ok(ProjectStatus::Creating),
        "ready" => Ok(ProjectStatus::Ready),
        "failed" => Ok(ProjectStatus::Failed),
        other => bail!("unknown status {other:?} (expected creating, ready or failed)"),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
