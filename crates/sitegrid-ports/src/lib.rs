//! sitegrid-ports — port allocation for provisioned projects.
//!
//! Every project gets one frontend and one backend port, drawn from two
//! fixed, non-overlapping ranges. The allocator owns the in-use set behind
//! a mutex, so allocation is safe across concurrently provisioning
//! projects. At startup the set is rebuilt from projects that are `ready`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info, warn};

use sitegrid_core::PortRange;
use sitegrid_state::{ProjectRecord, ProjectStatus};

/// Which range a port is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Frontend,
    Backend,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Frontend => "frontend",
            Tier::Backend => "backend",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("no free {tier} port in range {range}")]
    ResourceExhausted { tier: Tier, range: PortRange },
}

pub type PortResult<T> = Result<T, PortError>;

/// Allocates ports from a frontend and a backend range.
#[derive(Debug)]
pub struct PortAllocator {
    frontend: PortRange,
    backend: PortRange,
    used: Mutex<BTreeSet<u16>>,
}

impl PortAllocator {
    pub fn new(frontend: PortRange, backend: PortRange) -> Self {
        Self {
            frontend,
            backend,
            used: Mutex::new(BTreeSet::new()),
        }
    }

    /// Rebuild the allocator from persisted projects.
    ///
    /// Only `ready` projects hold ports. Ports of a crashed, still
    /// `creating` project are left for garbage collection.
    pub fn from_projects(
        frontend: PortRange,
        backend: PortRange,
        projects: &[ProjectRecord],
    ) -> Self {
        let allocator = Self::new(frontend, backend);
        for project in projects.iter().filter(|p| p.status == ProjectStatus::Ready) {
            for port in project.ports() {
                allocator.reserve(port);
            }
        }
        info!(
            used = allocator.used_count(),
            %frontend,
            %backend,
            "port allocator rebuilt from ready projects"
        );
        allocator
    }

    pub fn range(&self, tier: Tier) -> PortRange {
        match tier {
            Tier::Frontend => self.frontend,
            Tier::Backend => self.backend,
        }
    }

    /// Reserve the lowest free port of `tier`.
    pub fn allocate(&self, tier: Tier) -> PortResult<u16> {
        let range = self.range(tier);
        let mut used = self.used.lock().expect("port set lock");
        let port = (range.start..=range.end)
            .find(|p| !used.contains(p))
            .ok_or(PortError::ResourceExhausted { tier, range })?;
        used.insert(port);
        debug!(%tier, port, "port allocated");
        Ok(port)
    }

    /// Return a port to the pool. Releasing a free port is a no-op.
    pub fn release(&self, port: u16) {
        let removed = self.used.lock().expect("port set lock").remove(&port);
        debug!(port, removed, "port released");
    }

    /// Mark a port that is already in use elsewhere.
    pub fn reserve(&self, port: u16) {
        if !self.frontend.contains(port) && !self.backend.contains(port) {
            warn!(port, "reserving port outside configured ranges");
        }
        self.used.lock().expect("port set lock").insert(port);
    }

    pub fn is_used(&self, port: u16) -> bool {
        self.used.lock().expect("port set lock").contains(&port)
    }

    pub fn used_count(&self) -> usize {
        self.used.lock().expect("port set lock").len()
    }
}
