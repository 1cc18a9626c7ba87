//! Idempotent record provisioning for a project's two subdomains.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use sitegrid_core::{ProjectNames, validate_slug};

use crate::DnsProvider;
use crate::error::DnsResult;

/// Result of ensuring one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsOutcome {
    Created,
    /// Already pointing at the requested address; nothing written.
    AlreadyPresent,
    /// Points elsewhere. Left untouched.
    Conflict { current_ip: String },
    /// The name is taken by a record with no readable A address (a CNAME,
    /// an AAAA set, or only disabled entries). Left untouched.
    Occupied,
}

impl DnsOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, DnsOutcome::Conflict { .. } | DnsOutcome::Occupied)
    }
}

impl fmt::Display for DnsOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsOutcome::Created => f.write_str("created"),
            DnsOutcome::AlreadyPresent => f.write_str("already_present"),
            DnsOutcome::Conflict { current_ip } => write!(f, "conflict (points at {current_ip})"),
            DnsOutcome::Occupied => f.write_str("conflict (name held by a non-A record)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub fqdn: String,
    pub outcome: DnsOutcome,
}

/// Both records of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDns {
    pub frontend: RecordOutcome,
    pub backend: RecordOutcome,
}

impl ProjectDns {
    pub fn records(&self) -> [&RecordOutcome; 2] {
        [&self.frontend, &self.backend]
    }

    pub fn has_conflict(&self) -> bool {
        self.records().iter().any(|r| r.outcome.is_conflict())
    }
}

pub struct DnsProvisioner {
    provider: Arc<dyn DnsProvider>,
    base_domain: String,
    public_ip: String,
    ttl: u32,
}

impl DnsProvisioner {
    pub fn new(provider: Arc<dyn DnsProvider>, base_domain: &str, public_ip: &str, ttl: u32) -> Self {
        Self {
            provider,
            base_domain: base_domain.to_string(),
            public_ip: public_ip.to_string(),
            ttl,
        }
    }

    /// Make `subdomain.domain` resolve to `ip` unless it already resolves
    /// somewhere else.
    pub async fn ensure_record(&self, subdomain: &str, domain: &str, ip: &str) -> DnsResult<DnsOutcome> {
        let state = self.provider.check(subdomain, domain).await?;
        let fqdn = format!("{subdomain}.{domain}");

        if !state.exists {
            self.provider
                .create_a_record(subdomain, domain, ip, self.ttl)
                .await?;
            return Ok(DnsOutcome::Created);
        }

        match state.current_ip {
            Some(current) if current == ip => {
                info!(%fqdn, %ip, "DNS record already present");
                Ok(DnsOutcome::AlreadyPresent)
            }
            Some(current) => {
                warn!(%fqdn, %current, wanted = %ip, "DNS record points elsewhere, not overwriting");
                Ok(DnsOutcome::Conflict { current_ip: current })
            }
            None => {
                warn!(%fqdn, wanted = %ip, "DNS name held by another record, not overwriting");
                Ok(DnsOutcome::Occupied)
            }
        }
    }

    /// Ensure `{slug}` and `{slug}-api` under the base domain point at the
    /// host. Conflicts are reported, not raised.
    pub async fn provision_project_dns(&self, slug: &str) -> DnsResult<ProjectDns> {
        validate_slug(slug)?;
        let names = ProjectNames::for_slug(slug);

        let frontend = self
            .ensure_record(&names.frontend_subdomain, &self.base_domain, &self.public_ip)
            .await?;
        let backend = self
            .ensure_record(&names.backend_subdomain, &self.base_domain, &self.public_ip)
            .await?;

        let dns = ProjectDns {
            frontend: RecordOutcome {
                fqdn: names.frontend_domain(&self.base_domain),
                outcome: frontend,
            },
            backend: RecordOutcome {
                fqdn: names.backend_domain(&self.base_domain),
                outcome: backend,
            },
        };
        info!(
            project = %slug,
            frontend = %dns.frontend.outcome,
            backend = %dns.backend.outcome,
            "DNS provisioned"
        );
        Ok(dns)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::RecordState;
    use crate::error::DnsError;

    /// In-memory zone keyed by fqdn, counting writes.
    #[derive(Default)]
    struct FakeProvider {
        records: Mutex<BTreeMap<String, String>>,
        /// Names taken by a record without an A address.
        held: Mutex<BTreeSet<String>>,
        creates: Mutex<usize>,
        fail: bool,
    }

    impl FakeProvider {
        fn creates(&self) -> usize {
            *self.creates.lock().unwrap()
        }
    }

    #[async_trait]
    impl DnsProvider for FakeProvider {
        async fn check(&self, subdomain: &str, domain: &str) -> DnsResult<RecordState> {
            if self.fail {
                return Err(DnsError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            let fqdn = format!("{subdomain}.{domain}");
            let current_ip = self.records.lock().unwrap().get(&fqdn).cloned();
            Ok(RecordState {
                exists: current_ip.is_some() || self.held.lock().unwrap().contains(&fqdn),
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
            *self.creates.lock().unwrap() += 1;
            self.records
                .lock()
                .unwrap()
                .insert(format!("{subdomain}.{domain}"), ip.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn ensure_record_is_idempotent() {
        let provider = Arc::new(FakeProvider::default());
        let dns = DnsProvisioner::new(provider.clone(), "example.com", "1.2.3.4", 14400);

        let first = dns.ensure_record("proj", "example.com", "1.2.3.4").await.unwrap();
        let second = dns.ensure_record("proj", "example.com", "1.2.3.4").await.unwrap();

        assert_eq!(first, DnsOutcome::Created);
        assert_eq!(second, DnsOutcome::AlreadyPresent);
        assert_eq!(provider.creates(), 1);
    }

    #[tokio::test]
    async fn conflicting_record_is_never_overwritten() {
        let provider = Arc::new(FakeProvider::default());
        provider
            .records
            .lock()
            .unwrap()
            .insert("proj.example.com".to_string(), "9.9.9.9".to_string());
        let dns = DnsProvisioner::new(provider.clone(), "example.com", "1.2.3.4", 14400);

        let outcome = dns.ensure_record("proj", "example.com", "1.2.3.4").await.unwrap();
        assert_eq!(
            outcome,
            DnsOutcome::Conflict {
                current_ip: "9.9.9.9".to_string()
            }
        );
        assert_eq!(provider.creates(), 0);
        assert_eq!(
            provider.records.lock().unwrap().get("proj.example.com").unwrap(),
            "9.9.9.9"
        );
    }

    #[tokio::test]
    async fn name_without_address_is_left_alone() {
        let provider = Arc::new(FakeProvider::default());
        provider
            .held
            .lock()
            .unwrap()
            .insert("proj.example.com".to_string());
        let dns = DnsProvisioner::new(provider.clone(), "example.com", "1.2.3.4", 14400);

        let outcome = dns.ensure_record("proj", "example.com", "1.2.3.4").await.unwrap();
        assert_eq!(outcome, DnsOutcome::Occupied);
        assert!(outcome.is_conflict());
        assert_eq!(provider.creates(), 0);
        assert!(provider.records.lock().unwrap().is_empty());

        let result = dns.provision_project_dns("proj").await.unwrap();
        assert!(result.has_conflict());
        assert_eq!(result.backend.outcome, DnsOutcome::Created);
        assert_eq!(provider.creates(), 1);
    }

    #[tokio::test]
    async fn project_dns_covers_both_subdomains() {
        let provider = Arc::new(FakeProvider::default());
        provider
            .records
            .lock()
            .unwrap()
            .insert("demo-api.example.com".to_string(), "5.5.5.5".to_string());
        let dns = DnsProvisioner::new(provider.clone(), "example.com", "1.2.3.4", 14400);

        let result = dns.provision_project_dns("demo").await.unwrap();
        assert_eq!(result.frontend.fqdn, "demo.example.com");
        assert_eq!(result.frontend.outcome, DnsOutcome::Created);
        assert_eq!(result.backend.fqdn, "demo-api.example.com");
        assert!(result.backend.outcome.is_conflict());
        assert!(result.has_conflict());
        assert_eq!(provider.creates(), 1);
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let provider = Arc::new(FakeProvider {
            fail: true,
            ..Default::default()
        });
        let dns = DnsProvisioner::new(provider, "example.com", "1.2.3.4", 14400);
        let err = dns.provision_project_dns("demo").await.unwrap_err();
        assert!(matches!(err, DnsError::Api { status: 503, .. }));
    }
}
