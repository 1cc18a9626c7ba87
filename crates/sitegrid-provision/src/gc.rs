//! Garbage collection of leftover provisioning state.
//!
//! A metadata record that outlives its run means something may still be
//! held: a rollback that did not complete, a process that crashed mid-run,
//! or a project record deleted without teardown. The sweep tears each of
//! those down. Projects still `creating` are only swept once they have
//! been idle longer than the staleness threshold, so an in-flight run is
//! never disturbed.

use std::time::Duration;

use tracing::{info, warn};

use sitegrid_state::{ProjectStatus, epoch_secs};

use crate::error::ProvisionResult;
use crate::teardown::{Teardown, TeardownReport};

/// Why a project was selected by the sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcCandidate {
    pub project_id: String,
    pub reason: &'static str,
}

/// Project ids whose leftovers should be removed.
pub fn stale_candidates(
    teardown: &Teardown,
    stale_after: Duration,
) -> ProvisionResult<Vec<GcCandidate>> {
    let store = &teardown.infrastructure().store;
    let now = epoch_secs();
    let mut candidates = Vec::new();

    for meta in store.list_metadata()? {
        let reason = match store.get_project(&meta.project_id)? {
            None => Some("project record deleted"),
            Some(p) if p.status == ProjectStatus::Failed => Some("failed run left resources"),
            Some(p)
                if p.status == ProjectStatus::Creating
                    && now.saturating_sub(p.updated_at.max(meta.updated_at))
                        >= stale_after.as_secs() =>
            {
                Some("stuck in creating")
            }
            Some(_) => None,
        };
        if let Some(reason) = reason {
            candidates.push(GcCandidate {
                project_id: meta.project_id,
                reason,
            });
        }
    }
    Ok(candidates)
}

/// Tear down every stale candidate. One failing teardown does not stop
/// the sweep; it is logged and the next candidate is tried.
pub async fn sweep_stale(
    teardown: &Teardown,
    stale_after: Duration,
) -> ProvisionResult<Vec<TeardownReport>> {
    let candidates = stale_candidates(teardown, stale_after)?;
    info!(candidates = candidates.len(), "garbage collection sweep");

    let mut reports = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        info!(project = %candidate.project_id, reason = candidate.reason, "sweeping");
        match teardown.teardown(&candidate.project_id).await {
            Ok(report) => reports.push(report),
            Err(e) => warn!(project = %candidate.project_id, error = %e, "sweep teardown failed"),
        }
    }
    Ok(reports)
}
