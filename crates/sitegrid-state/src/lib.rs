//! sitegrid-state — embedded state store for SiteGrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds the project records the
//! orchestrator reads identity from and writes status to, and the
//! provisioning metadata ledger teardown works from.
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value
//! columns, keyed by project id.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
