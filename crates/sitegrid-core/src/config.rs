//! sitegrid.toml configuration parser.
//!
//! Every section and field has a default, so an empty file is a valid
//! (if not very useful) configuration. Secrets are never stored here
//! directly: the file names the environment variables that hold them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SitegridConfig {
    pub host: HostConfig,
    pub state: StateConfig,
    pub ports: PortsConfig,
    pub database: DatabaseConfig,
    pub supervisor: SupervisorConfig,
    pub proxy: ProxyConfig,
    pub dns: DnsConfig,
    pub verify: VerifyConfig,
}

/// Identity of the single host all projects are provisioned on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Parent domain for project subdomains.
    pub base_domain: String,
    /// Public IPv4 address DNS records point at.
    pub public_ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub data_dir: PathBuf,
    /// Age after which a project stuck in `creating` is swept by `gc`.
    pub stale_after: String,
}

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    pub frontend: PortRange,
    pub backend: PortRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Environment variable holding the administrative connection URL.
    pub admin_url_env: String,
    /// Fallback admin URL when the environment variable is unset.
    pub admin_url: Option<String>,
    /// Host and port written into per-project connection URLs.
    pub host: String,
    pub port: u16,
    /// The control-plane database. Never droppable.
    pub control_database: String,
    /// Extra database names that must never be dropped.
    pub protected: Vec<String>,
    pub max_connections: u32,
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub pm2_bin: String,
    /// Where process descriptors are written. Defaults to `{data_dir}/services`.
    pub descriptor_dir: Option<PathBuf>,
    /// Backend source directory, relative to the project working directory.
    pub backend_dir: String,
    pub backend_interpreter: String,
    pub backend_script: String,
    /// Built frontend directory, relative to the project working directory.
    pub frontend_dir: String,
    pub frontend_interpreter: String,
    pub frontend_script: String,
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub nginx_bin: String,
    pub sites_available: PathBuf,
    pub sites_enabled: PathBuf,
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub enabled: bool,
    pub api_base: String,
    /// Environment variable holding the DNS provider API token.
    pub api_token_env: String,
    pub ttl: u32,
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub health_path: String,
    pub port_timeout: String,
    pub health_timeout: String,
    /// Wait between starting services and verifying them.
    pub startup_grace: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            base_domain: "sites.localhost".to_string(),
            public_ip: "127.0.0.1".to_string(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/sitegrid"),
            stale_after: "1h".to_string(),
        }
    }
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            frontend: PortRange::new(3000, 3999),
            backend: PortRange::new(8010, 8999),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            admin_url_env: "SITEGRID_ADMIN_DATABASE_URL".to_string(),
            admin_url: None,
            host: "localhost".to_string(),
            port: 5432,
            control_database: "sitegrid".to_string(),
            protected: Vec::new(),
            max_connections: 2,
            timeout: "30s".to_string(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            pm2_bin: "pm2".to_string(),
            descriptor_dir: None,
            backend_dir: "backend".to_string(),
            backend_interpreter: "python3".to_string(),
            backend_script: "main.py".to_string(),
            frontend_dir: "frontend/dist".to_string(),
            frontend_interpreter: "python3".to_string(),
            frontend_script: "serve.py".to_string(),
            timeout: "30s".to_string(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            nginx_bin: "nginx".to_string(),
            sites_available: PathBuf::from("/etc/nginx/sites-available"),
            sites_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
            timeout: "30s".to_string(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://developers.hostinger.com".to_string(),
            api_token_env: "HOSTINGER_API_TOKEN".to_string(),
            ttl: 14400,
            timeout: "30s".to_string(),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            health_path: "/health".to_string(),
            port_timeout: "5s".to_string(),
            health_timeout: "10s".to_string(),
            startup_grace: "3s".to_string(),
        }
    }
}

impl PortRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    /// Number of ports in the range (0 if inverted).
    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            usize::from(self.end - self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &PortRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start <= other.end && other.start <= self.end
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl StateConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sitegrid.redb")
    }

    pub fn stale_after(&self) -> Duration {
        parse_duration(&self.stale_after).unwrap_or(Duration::from_secs(3600))
    }
}

impl DatabaseConfig {
    /// Resolve the administrative connection URL (environment first).
    pub fn admin_url(&self) -> anyhow::Result<String> {
        if let Ok(url) = std::env::var(&self.admin_url_env) {
            if !url.trim().is_empty() {
                return Ok(url);
            }
        }
        match &self.admin_url {
            Some(url) => Ok(url.clone()),
            None => bail!(
                "no admin database URL: set {} or [database].admin_url",
                self.admin_url_env
            ),
        }
    }

    /// Every database name the provisioner must refuse to drop.
    pub fn protected_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = ["postgres", "defaultdb"]
            .into_iter()
            .map(str::to_string)
            .collect();
        names.insert(self.control_database.to_lowercase());
        names.extend(self.protected.iter().map(|n| n.to_lowercase()));
        names
    }

    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(30))
    }
}

impl SupervisorConfig {
    pub fn descriptor_dir(&self, data_dir: &Path) -> PathBuf {
        self.descriptor_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("services"))
    }

    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(30))
    }
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(30))
    }
}

impl DnsConfig {
    pub fn api_token(&self) -> anyhow::Result<String> {
        std::env::var(&self.api_token_env)
            .with_context(|| format!("DNS API token not set in {}", self.api_token_env))
    }

    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(30))
    }
}

impl VerifyConfig {
    pub fn port_timeout(&self) -> Duration {
        parse_duration(&self.port_timeout).unwrap_or(Duration::from_secs(5))
    }

    pub fn health_timeout(&self) -> Duration {
        parse_duration(&self.health_timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn startup_grace(&self) -> Duration {
        parse_duration(&self.startup_grace).unwrap_or(Duration::from_secs(3))
    }
}

impl SitegridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: SitegridConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations that would make allocation or naming unsafe.
    pub fn validate(&self) -> anyhow::Result<()> {
        let (fe, be) = (&self.ports.frontend, &self.ports.backend);
        if fe.is_empty() {
            bail!("frontend port range {fe} is empty");
        }
        if be.is_empty() {
            bail!("backend port range {be} is empty");
        }
        if fe.overlaps(be) {
            bail!("frontend range {fe} overlaps backend range {be}");
        }
        if self.host.base_domain.trim().is_empty() {
            bail!("host.base_domain must not be empty");
        }
        if self.host.public_ip.parse::<std::net::Ipv4Addr>().is_err() {
            bail!("host.public_ip {:?} is not an IPv4 address", self.host.public_ip);
        }

        let durations = [
            ("state.stale_after", &self.state.stale_after),
            ("database.timeout", &self.database.timeout),
            ("supervisor.timeout", &self.supervisor.timeout),
            ("proxy.timeout", &self.proxy.timeout),
            ("dns.timeout", &self.dns.timeout),
            ("verify.port_timeout", &self.verify.port_timeout),
            ("verify.health_timeout", &self.verify.health_timeout),
            ("verify.startup_grace", &self.verify.startup_grace),
        ];
        for (field, value) in durations {
            if parse_duration(value).is_none() {
                bail!("{field}: cannot parse duration {value:?}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: SitegridConfig = toml::from_str("").unwrap();
        assert_eq!(config.ports.frontend, PortRange::new(3000, 3999));
        assert_eq!(config.ports.backend, PortRange::new(8010, 8999));
        assert_eq!(config.dns.ttl, 14400);
        assert_eq!(config.verify.health_path, "/health");
        config.validate().unwrap();
    }

    #[test]
    fn parse_partial_sections() {
        let toml_str = r#"
[host]
base_domain = "example.com"
public_ip = "1.2.3.4"

[ports.frontend]
start = 4000
end = 4009

[dns]
enabled = false
"#;
        let config: SitegridConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host.base_domain, "example.com");
        assert_eq!(config.ports.frontend.len(), 10);
        assert_eq!(config.ports.backend, PortRange::new(8010, 8999));
        assert!(!config.dns.enabled);
    }

    #[test]
    fn overlapping_ranges_are_rejected() {
        let mut config = SitegridConfig::default();
        config.ports.backend = PortRange::new(3500, 4500);
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_duration_is_rejected() {
        let mut config = SitegridConfig::default();
        config.supervisor.timeout = "forever".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("supervisor.timeout"));
    }

    #[test]
    fn protected_names_include_control_database() {
        let mut db = DatabaseConfig::default();
        db.control_database = "Dreampilot".to_string();
        db.protected = vec!["billing_db".to_string()];
        let names = db.protected_names();
        assert!(names.contains("dreampilot"));
        assert!(names.contains("postgres"));
        assert!(names.contains("defaultdb"));
        assert!(names.contains("billing_db"));
    }

    #[test]
    fn port_range_arithmetic() {
        let r = PortRange::new(10, 12);
        assert_eq!(r.len(), 3);
        assert!(r.contains(10) && r.contains(12) && !r.contains(13));
        assert!(PortRange::new(5, 4).is_empty());
        assert!(r.overlaps(&PortRange::new(12, 20)));
        assert!(!r.overlaps(&PortRange::new(13, 20)));
    }

    #[test]
    fn round_trips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitegrid.toml");
        let config = SitegridConfig::default();
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = SitegridConfig::from_file(&path).unwrap();
        assert_eq!(loaded.ports.backend, config.ports.backend);
        assert_eq!(loaded.proxy.sites_enabled, config.proxy.sites_enabled);
    }
}
