//! sitegrid-provision — the per-project provisioning saga.
//!
//! [`Orchestrator`] sequences ports, database, backend environment,
//! service registration, route, DNS, service start and verification,
//! recording every touched resource in the metadata ledger and
//! compensating in reverse on failure. [`Teardown`] removes a project's
//! resources later, and [`gc::sweep_stale`] cleans up after runs that
//! never finished.

pub mod compensation;
pub mod env_file;
pub mod error;
pub mod gc;
pub mod infra;
pub mod orchestrator;
pub mod teardown;

pub use compensation::{RemovalPlan, ResourceClass, StepReport, StepStatus};
pub use error::{ProvisionError, ProvisionResult};
pub use gc::{GcCandidate, stale_candidates, sweep_stale};
pub use infra::{Infrastructure, ServiceLayout};
pub use orchestrator::{
    Orchestrator, PhaseFailure, ProvisionOptions, ProvisionReport, ProvisionState,
};
pub use teardown::{Teardown, TeardownReport};
