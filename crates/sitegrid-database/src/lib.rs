//! sitegrid-database — isolated PostgreSQL database per project.
//!
//! [`DatabaseProvisioner`] derives names from the project slug, creates the
//! database, role and grants, and guards every drop with a validation gate
//! so the control-plane and system databases can never be deleted by
//! accident. SQL goes through the [`DatabaseEngine`] trait; production uses
//! [`PostgresEngine`] over an administrative sqlx pool.

pub mod engine;
pub mod error;
pub mod provisioner;

pub use engine::{DatabaseEngine, PostgresEngine};
pub use error::{DatabaseError, DatabaseResult};
pub use provisioner::{DatabaseCredential, DatabaseProvisioner, SYSTEM_DATABASES};
