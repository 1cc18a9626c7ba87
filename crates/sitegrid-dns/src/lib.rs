//! sitegrid-dns — public A records for provisioned projects.
//!
//! Records are ensured, not owned: an existing record pointing at the
//! host is left alone, one pointing elsewhere is reported as a conflict
//! and never overwritten, and nothing is deleted on rollback or teardown.

pub mod error;
pub mod hostinger;
pub mod provisioner;

use async_trait::async_trait;

pub use error::{DnsError, DnsResult};
pub use hostinger::HostingerDns;
pub use provisioner::{DnsOutcome, DnsProvisioner, ProjectDns, RecordOutcome};

/// What the zone holds under one name. `current_ip` is read from A records only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordState {
    pub exists: bool,
    pub current_ip: Option<String>,
}

/// DNS provider seam.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn check(&self, subdomain: &str, domain: &str) -> DnsResult<RecordState>;

    async fn create_a_record(
        &self,
        subdomain: &str,
        domain: &str,
        ip: &str,
        ttl: u32,
    ) -> DnsResult<()>;
}
