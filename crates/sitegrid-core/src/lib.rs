//! sitegrid-core — shared building blocks for the SiteGrid provisioning stack.
//!
//! - **`config`** — `sitegrid.toml` parsing and per-subsystem settings
//! - **`duration`** — human duration strings (`"30s"`, `"500ms"`, `"2m"`)
//! - **`naming`** — the slug convention every provisioned resource derives from
//! - **`command`** — subprocess execution with a hard timeout

pub mod command;
pub mod config;
pub mod duration;
pub mod naming;

pub use command::{CommandError, CommandOutput, run_command};
pub use config::{PortRange, SitegridConfig};
pub use duration::parse_duration;
pub use naming::{InvalidSlug, ProjectNames, validate_slug};
