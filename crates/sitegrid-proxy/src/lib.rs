//! sitegrid-proxy — public routes for provisioned projects.
//!
//! Each project gets one nginx artifact with two `server` blocks mapping
//! `{slug}.{base}` to the frontend port and `{slug}-api.{base}` to the
//! backend port. Installing a route writes the artifact, tests the
//! aggregate configuration, and reloads only if the test passes.

pub mod config;
pub mod configurator;
pub mod control;
pub mod error;

pub use config::{RouteConfig, generate};
pub use configurator::RouteConfigurator;
pub use control::{NginxControl, ProxyControl};
pub use error::{RouteError, RouteResult};
