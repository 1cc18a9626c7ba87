//! Shared fakes and harness for the provisioning integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use sitegrid_core::PortRange;
use sitegrid_database::{DatabaseEngine, DatabaseError, DatabaseProvisioner, DatabaseResult};
use sitegrid_dns::{DnsError, DnsProvider, DnsProvisioner, DnsResult, RecordState};
use sitegrid_health::{DeploymentCheck, VerificationResult};
use sitegrid_ports::PortAllocator;
use sitegrid_provision::{Infrastructure, Orchestrator, ServiceLayout, Teardown};
use sitegrid_proxy::{ProxyControl, RouteConfigurator, RouteError, RouteResult};
use sitegrid_state::{ProjectRecord, StateStore};
use sitegrid_supervisor::{ServiceSpec, ServiceSupervisor, SupervisorError, SupervisorResult};

pub const BASE_DOMAIN: &str = "sites.test";
pub const PUBLIC_IP: &str = "203.0.113.10";

// ── Database ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeEngine {
    pub databases: Mutex<BTreeSet<String>>,
    pub users: Mutex<BTreeSet<String>>,
    /// Operation name to fail: "create_database", "create_user", "grant_all", "drop".
    pub fail_on: Mutex<Option<&'static str>>,
}

impl FakeEngine {
    fn check(&self, op: &'static str) -> DatabaseResult<()> {
        if *self.fail_on.lock().unwrap() == Some(op) {
            return Err(DatabaseError::Engine {
                operation: op,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    pub fn fail_on(&self, op: &'static str) {
        *self.fail_on.lock().unwrap() = Some(op);
    }

    pub fn is_empty(&self) -> bool {
        self.databases.lock().unwrap().is_empty() && self.users.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl DatabaseEngine for FakeEngine {
    async fn create_database(&self, name: &str) -> DatabaseResult<()> {
        self.check("create_database")?;
        self.databases.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn create_user(&self, user: &str, _password: &str) -> DatabaseResult<()> {
        self.check("create_user")?;
        self.users.lock().unwrap().insert(user.to_string());
        Ok(())
    }

    async fn grant_all(&self, _database: &str, _user: &str) -> DatabaseResult<()> {
        self.check("grant_all")
    }

    async fn terminate_connections(&self, _database: &str) -> DatabaseResult<()> {
        Ok(())
    }

    async fn drop_database_if_exists(&self, name: &str) -> DatabaseResult<()> {
        self.check("drop")?;
        self.databases.lock().unwrap().remove(name);
        Ok(())
    }

    async fn drop_user_if_exists(&self, user: &str) -> DatabaseResult<()> {
        self.users.lock().unwrap().remove(user);
        Ok(())
    }

    async fn database_size(&self, name: &str) -> DatabaseResult<Option<u64>> {
        Ok(self.databases.lock().unwrap().contains(name).then_some(0))
    }
}

// ── Supervisor ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSupervisor {
    pub registered: Mutex<BTreeSet<String>>,
    pub running: Mutex<BTreeSet<String>>,
    pub specs: Mutex<BTreeMap<String, ServiceSpec>>,
    pub fail_register: Mutex<Option<String>>,
    pub fail_start: Mutex<Option<String>>,
    /// Service whose start never answers before the command deadline.
    pub hang_start: Mutex<Option<String>>,
}

impl FakeSupervisor {
    pub fn registered(&self) -> BTreeSet<String> {
        self.registered.lock().unwrap().clone()
    }

    pub fn running(&self) -> BTreeSet<String> {
        self.running.lock().unwrap().clone()
    }

    fn injected(name: &str) -> SupervisorError {
        SupervisorError::CommandFailed {
            command: format!("pm2 start {name}"),
            code: Some(1),
            message: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl ServiceSupervisor for FakeSupervisor {
    async fn register(&self, spec: &ServiceSpec) -> SupervisorResult<PathBuf> {
        if self.fail_register.lock().unwrap().as_deref() == Some(spec.name.as_str()) {
            return Err(Self::injected(&spec.name));
        }
        self.registered.lock().unwrap().insert(spec.name.clone());
        self.specs
            .lock()
            .unwrap()
            .insert(spec.name.clone(), spec.clone());
        Ok(PathBuf::from(format!("/fake/{}.config.json", spec.name)))
    }

    async fn start(&self, name: &str) -> SupervisorResult<()> {
        if !self.registered.lock().unwrap().contains(name) {
            return Err(SupervisorError::NotRegistered(name.to_string()));
        }
        if self.fail_start.lock().unwrap().as_deref() == Some(name) {
            return Err(Self::injected(name));
        }
        if self.hang_start.lock().unwrap().as_deref() == Some(name) {
            return Err(SupervisorError::TimedOut {
                command: format!("pm2 start {name}"),
                after: Duration::from_secs(30),
            });
        }
        self.running.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn stop(&self, name: &str) -> SupervisorResult<()> {
        self.running.lock().unwrap().remove(name);
        Ok(())
    }

    async fn deregister(&self, name: &str) -> SupervisorResult<()> {
        self.running.lock().unwrap().remove(name);
        self.registered.lock().unwrap().remove(name);
        self.specs.lock().unwrap().remove(name);
        Ok(())
    }
}

// ── Proxy ──────────────────────────────────────────────────────────

pub struct FakeProxy {
    enabled: PathBuf,
    pub reject: AtomicBool,
    pub reloads: AtomicUsize,
    pub live: Mutex<BTreeMap<String, String>>,
}

impl FakeProxy {
    fn enabled_configs(&self) -> BTreeMap<String, String> {
        let mut configs = BTreeMap::new();
        if let Ok(entries) = std::fs::read_dir(&self.enabled) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                configs.insert(name, std::fs::read_to_string(entry.path()).unwrap_or_default());
            }
        }
        configs
    }

    pub fn live(&self) -> BTreeMap<String, String> {
        self.live.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProxyControl for FakeProxy {
    async fn test_config(&self) -> RouteResult<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(RouteError::ConfigInvalid("injected syntax error".to_string()));
        }
        Ok(())
    }

    async fn reload(&self) -> RouteResult<()> {
        *self.live.lock().unwrap() = self.enabled_configs();
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── DNS ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeDns {
    pub records: Mutex<BTreeMap<String, String>>,
    pub creates: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl DnsProvider for FakeDns {
    async fn check(&self, subdomain: &str, domain: &str) -> DnsResult<RecordState> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DnsError::Api {
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        let current_ip = self
            .records
            .lock()
            .unwrap()
            .get(&format!("{subdomain}.{domain}"))
            .cloned();
        Ok(RecordState {
            exists: current_ip.is_some(),
            current_ip,
        })
    }

    async fn create_a_record(
        &self,
        subdomain: &str,
        domain: &str,
        ip: &str,
        _ttl: u32,
    ) -> DnsResult<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .insert(format!("{subdomain}.{domain}"), ip.to_string());
        Ok(())
    }
}

// ── Verifier ───────────────────────────────────────────────────────

pub struct FakeVerifier {
    pub healthy: AtomicBool,
    pub calls: Mutex<Vec<(u16, u16)>>,
}

#[async_trait]
impl DeploymentCheck for FakeVerifier {
    async fn verify(&self, frontend_port: u16, backend_port: u16) -> VerificationResult {
        self.calls.lock().unwrap().push((frontend_port, backend_port));
        let healthy = self.healthy.load(Ordering::SeqCst);
        VerificationResult::new(true, true, healthy)
    }
}

// ── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub dir: TempDir,
    pub engine: Arc<FakeEngine>,
    pub supervisor: Arc<FakeSupervisor>,
    pub proxy: Arc<FakeProxy>,
    pub dns: Arc<FakeDns>,
    pub verifier: Arc<FakeVerifier>,
    pub infra: Infrastructure,
    pub orchestrator: Arc<Orchestrator>,
    pub teardown: Teardown,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_ranges(PortRange::new(3000, 3999), PortRange::new(8010, 8999))
    }

    pub fn with_ranges(frontend: PortRange, backend: PortRange) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open_in_memory().unwrap();

        let engine = Arc::new(FakeEngine::default());
        let supervisor = Arc::new(FakeSupervisor::default());
        let proxy = Arc::new(FakeProxy {
            enabled: dir.path().join("sites-enabled"),
            reject: AtomicBool::new(false),
            reloads: AtomicUsize::new(0),
            live: Mutex::new(BTreeMap::new()),
        });
        let dns = Arc::new(FakeDns::default());
        let verifier = Arc::new(FakeVerifier {
            healthy: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        });

        let protected = ["postgres", "defaultdb", "sitegrid"]
            .into_iter()
            .map(str::to_string)
            .collect();
        let infra = Infrastructure {
            store: store.clone(),
            ports: Arc::new(PortAllocator::from_projects(
                frontend,
                backend,
                &store.list_projects().unwrap(),
            )),
            database: Arc::new(DatabaseProvisioner::new(
                engine.clone(),
                protected,
                "localhost",
                5432,
            )),
            supervisor: supervisor.clone(),
            routes: Arc::new(RouteConfigurator::new(
                dir.path().join("sites-available"),
                dir.path().join("sites-enabled"),
                BASE_DOMAIN,
                proxy.clone(),
            )),
            dns: Some(Arc::new(DnsProvisioner::new(
                dns.clone(),
                BASE_DOMAIN,
                PUBLIC_IP,
                14400,
            ))),
            verifier: verifier.clone(),
        };

        let orchestrator = Arc::new(Orchestrator::new(
            infra.clone(),
            ServiceLayout::default(),
            Duration::ZERO,
        ));
        let teardown = Teardown::new(infra.clone());

        Self {
            dir,
            engine,
            supervisor,
            proxy,
            dns,
            verifier,
            infra,
            orchestrator,
            teardown,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.infra.store
    }

    /// Insert a `creating` project with its working directory.
    pub fn add_project(&self, id: &str, slug: &str) -> ProjectRecord {
        let workdir = self.dir.path().join("projects").join(slug);
        std::fs::create_dir_all(&workdir).unwrap();
        let project = ProjectRecord::new(id, &format!("Project {slug}"), slug, workdir);
        self.store().put_project(&project).unwrap();
        project
    }

    pub fn artifact_path(&self, slug: &str) -> PathBuf {
        self.infra.routes.artifact_path(slug)
    }

    pub fn link_path(&self, slug: &str) -> PathBuf {
        self.infra.routes.link_path(slug)
    }

    /// Nothing provisioned for `slug` is still held (DNS excluded).
    pub fn assert_nothing_held(&self, slug: &str) {
        assert_eq!(self.infra.ports.used_count(), 0, "ports leaked for {slug}");
        assert!(self.engine.is_empty(), "database or user leaked for {slug}");
        assert!(
            self.supervisor.registered().is_empty(),
            "service registrations leaked for {slug}: {:?}",
            self.supervisor.registered()
        );
        assert!(!self.artifact_path(slug).exists(), "route artifact leaked for {slug}");
        assert!(
            std::fs::symlink_metadata(self.link_path(slug)).is_err(),
            "route link leaked for {slug}"
        );
    }
}
