//! Subsystem assembly from `sitegrid.toml`.
//!
//! Each command builds only what it needs: `status` and `list` never
//! touch PostgreSQL, `verify` needs nothing but the verifier.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use sitegrid_core::SitegridConfig;
use sitegrid_database::{DatabaseProvisioner, PostgresEngine};
use sitegrid_dns::{DnsProvisioner, HostingerDns};
use sitegrid_health::DeploymentVerifier;
use sitegrid_ports::PortAllocator;
use sitegrid_provision::{Infrastructure, Orchestrator, ServiceLayout, Teardown};
use sitegrid_proxy::{NginxControl, RouteConfigurator};
use sitegrid_state::StateStore;
use sitegrid_supervisor::Pm2Supervisor;

pub fn open_store(config: &SitegridConfig) -> anyhow::Result<StateStore> {
    let data_dir = &config.state.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let path = config.state.db_path();
    let store = StateStore::open(&path)?;
    info!(path = ?path, "state store opened");
    Ok(store)
}

pub fn database(config: &SitegridConfig) -> anyhow::Result<DatabaseProvisioner> {
    let db = &config.database;
    let engine = PostgresEngine::connect_lazy(&db.admin_url()?, db.max_connections, db.timeout())?;
    Ok(DatabaseProvisioner::new(
        Arc::new(engine),
        db.protected_names(),
        &db.host,
        db.port,
    ))
}

pub fn verifier(config: &SitegridConfig) -> DeploymentVerifier {
    let verify = &config.verify;
    DeploymentVerifier::new(
        &verify.health_path,
        verify.port_timeout(),
        verify.health_timeout(),
    )
}

fn dns(config: &SitegridConfig) -> anyhow::Result<Option<Arc<DnsProvisioner>>> {
    let dns = &config.dns;
    if !dns.enabled {
        info!("DNS provisioning disabled");
        return Ok(None);
    }
    let provider = HostingerDns::new(&dns.api_base, &dns.api_token()?, dns.timeout())?;
    Ok(Some(Arc::new(DnsProvisioner::new(
        Arc::new(provider),
        &config.host.base_domain,
        &config.host.public_ip,
        dns.ttl,
    ))))
}

/// Every subsystem, wired over one state store.
pub fn infrastructure(config: &SitegridConfig, store: StateStore) -> anyhow::Result<Infrastructure> {
    let ports = PortAllocator::from_projects(
        config.ports.frontend,
        config.ports.backend,
        &store.list_projects()?,
    );

    let supervisor = Pm2Supervisor::new(
        &config.supervisor.pm2_bin,
        config.supervisor.descriptor_dir(&config.state.data_dir),
        config.supervisor.timeout(),
    );

    let proxy = &config.proxy;
    let routes = RouteConfigurator::new(
        &proxy.sites_available,
        &proxy.sites_enabled,
        &config.host.base_domain,
        Arc::new(NginxControl::new(&proxy.nginx_bin, proxy.timeout())),
    );

    let infra = Infrastructure {
        store,
        ports: Arc::new(ports),
        database: Arc::new(database(config)?),
        supervisor: Arc::new(supervisor),
        routes: Arc::new(routes),
        dns: dns(config)?,
        verifier: Arc::new(verifier(config)),
    };
    info!(
        base_domain = %config.host.base_domain,
        frontend = %config.ports.frontend,
        backend = %config.ports.backend,
        dns = infra.dns.is_some(),
        "subsystems assembled"
    );
    Ok(infra)
}

pub fn orchestrator(config: &SitegridConfig) -> anyhow::Result<Orchestrator> {
    let infra = infrastructure(config, open_store(config)?)?;
    Ok(Orchestrator::new(
        infra,
        ServiceLayout::from_config(&config.supervisor),
        config.verify.startup_grace(),
    ))
}

pub fn teardown(config: &SitegridConfig) -> anyhow::Result<Teardown> {
    Ok(Teardown::new(infrastructure(config, open_store(config)?)?))
}
