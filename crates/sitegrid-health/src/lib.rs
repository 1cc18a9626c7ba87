//! sitegrid-health — post-start verification of a deployment.
//!
//! A deployment is verified when both ports accept TCP connections and the
//! backend health endpoint answers 2xx with a JSON body whose `status` is
//! `"ok"`.

pub mod probe;
pub mod verifier;

pub use probe::{ProbeResult, check_health, check_port};
pub use verifier::{DeploymentCheck, DeploymentVerifier, VerificationResult};
