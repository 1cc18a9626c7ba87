//! redb table definitions for the SiteGrid state store.
//!
//! Both tables use `&str` keys (the project id) and `&[u8]` values
//! (JSON-serialized domain types).

use redb::TableDefinition;

/// Project records keyed by `{project_id}`.
pub const PROJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("projects");

/// Provisioning metadata keyed by `{project_id}`.
pub const PROVISIONING: TableDefinition<&str, &[u8]> = TableDefinition::new("provisioning");
