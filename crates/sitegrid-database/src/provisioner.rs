//! Per-project database lifecycle.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{info, warn};

use sitegrid_core::naming::{self, ident_from_database_name, is_valid_identifier};
use sitegrid_core::validate_slug;

use crate::engine::DatabaseEngine;
use crate::error::{DatabaseError, DatabaseResult};

/// Engine-internal databases that are never deletion targets.
pub const SYSTEM_DATABASES: [&str; 5] = [
    "information_schema",
    "pg_catalog",
    "pg_toast",
    "template0",
    "template1",
];

const SECRET_LEN: usize = 32;

/// Database, role and secret created for one project.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseCredential {
    pub database: String,
    pub user: String,
    pub secret: String,
    /// Connection URL handed to the backend process.
    pub url: String,
}

impl fmt::Debug for DatabaseCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCredential")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

pub struct DatabaseProvisioner {
    engine: Arc<dyn DatabaseEngine>,
    protected: BTreeSet<String>,
    host: String,
    port: u16,
}

impl DatabaseProvisioner {
    /// `host` and `port` are what the backend process will connect to.
    pub fn new(
        engine: Arc<dyn DatabaseEngine>,
        protected: BTreeSet<String>,
        host: &str,
        port: u16,
    ) -> Self {
        Self {
            engine,
            protected,
            host: host.to_string(),
            port,
        }
    }

    /// Create the database and role for `slug` and grant the role full
    /// privileges on it.
    pub async fn create(&self, slug: &str) -> DatabaseResult<DatabaseCredential> {
        validate_slug(slug)?;
        let database = naming::database_name(slug);
        let user = naming::database_user(slug);
        for ident in [&database, &user] {
            if !is_valid_identifier(ident) {
                return Err(DatabaseError::InvalidIdentifier(ident.clone()));
            }
        }

        let secret = generate_secret();
        self.engine.create_database(&database).await?;
        self.engine.create_user(&user, &secret).await?;
        self.engine.grant_all(&database, &user).await?;

        let url = format!(
            "postgresql://{user}:{secret}@{}:{}/{database}",
            self.host, self.port
        );
        info!(project = %slug, %database, %user, "database provisioned");
        Ok(DatabaseCredential {
            database,
            user,
            secret,
            url,
        })
    }

    /// Check whether `name` may be dropped without `force`.
    ///
    /// The system, protected and naming checks are independent: a name
    /// that follows the convention is still refused if it is protected.
    pub fn validate_drop(&self, name: &str) -> DatabaseResult<()> {
        let reject = |reason: &str| {
            Err(DatabaseError::ValidationRejected {
                name: name.to_string(),
                reason: reason.to_string(),
            })
        };
        let lowered = name.to_lowercase();

        if SYSTEM_DATABASES.contains(&lowered.as_str()) {
            return reject("system database");
        }
        if self.protected.contains(&lowered) {
            return reject("protected database");
        }
        if ident_from_database_name(name).is_none() {
            return reject("not a project database name ({ident}_db)");
        }
        Ok(())
    }

    /// Drop a project database and its role.
    ///
    /// Without `force`, names failing [`validate_drop`](Self::validate_drop)
    /// are rejected before any SQL is issued. A database or role that does
    /// not exist is not an error.
    pub async fn drop(&self, name: &str, force: bool) -> DatabaseResult<()> {
        if let Err(e) = self.validate_drop(name) {
            if !force {
                warn!(database = %name, error = %e, "database drop rejected");
                return Err(e);
            }
            warn!(database = %name, error = %e, "FORCE: dropping database that failed validation");
        }

        self.engine.terminate_connections(name).await?;
        self.engine.drop_database_if_exists(name).await?;

        match ident_from_database_name(name) {
            Some(ident) => {
                let user = format!("{ident}_user");
                self.engine.drop_user_if_exists(&user).await?;
                info!(database = %name, %user, "database dropped");
            }
            None => warn!(database = %name, "no conventional user for database, role left in place"),
        }
        Ok(())
    }

    /// Drop the database derived from `slug`.
    pub async fn drop_project(&self, slug: &str, force: bool) -> DatabaseResult<()> {
        validate_slug(slug)?;
        self.drop(&naming::database_name(slug), force).await
    }

    /// Size of the project's database in bytes, `None` if it does not exist.
    pub async fn database_size(&self, slug: &str) -> DatabaseResult<Option<u64>> {
        validate_slug(slug)?;
        self.engine.database_size(&naming::database_name(slug)).await
    }
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Records every statement; databases and users live in sets.
    #[derive(Default)]
    struct FakeEngine {
        calls: Mutex<Vec<String>>,
        databases: Mutex<BTreeSet<String>>,
        users: Mutex<BTreeSet<String>>,
    }

    impl FakeEngine {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl DatabaseEngine for FakeEngine {
        async fn create_database(&self, name: &str) -> DatabaseResult<()> {
            self.record(format!("create_database {name}"));
            if !self.databases.lock().unwrap().insert(name.to_string()) {
                return Err(DatabaseError::Engine {
                    operation: "create database",
                    message: format!("database \"{name}\" already exists"),
                });
            }
            Ok(())
        }

        async fn create_user(&self, user: &str, _password: &str) -> DatabaseResult<()> {
            self.record(format!("create_user {user}"));
            self.users.lock().unwrap().insert(user.to_string());
            Ok(())
        }

        async fn grant_all(&self, database: &str, user: &str) -> DatabaseResult<()> {
            self.record(format!("grant_all {database} {user}"));
            Ok(())
        }

        async fn terminate_connections(&self, database: &str) -> DatabaseResult<()> {
            self.record(format!("terminate {database}"));
            Ok(())
        }

        async fn drop_database_if_exists(&self, name: &str) -> DatabaseResult<()> {
            self.record(format!("drop_database {name}"));
            self.databases.lock().unwrap().remove(name);
            Ok(())
        }

        async fn drop_user_if_exists(&self, user: &str) -> DatabaseResult<()> {
            self.record(format!("drop_user {user}"));
            self.users.lock().unwrap().remove(user);
            Ok(())
        }

        async fn database_size(&self, name: &str) -> DatabaseResult<Option<u64>> {
            Ok(self.databases.lock().unwrap().contains(name).then_some(8_192))
        }
    }

    fn provisioner(engine: Arc<FakeEngine>) -> DatabaseProvisioner {
        let protected = ["postgres", "defaultdb", "sitegrid", "billing_db"]
            .into_iter()
            .map(str::to_string)
            .collect();
        DatabaseProvisioner::new(engine, protected, "localhost", 5432)
    }

    #[tokio::test]
    async fn create_derives_names_and_url() {
        let engine = Arc::new(FakeEngine::default());
        let db = provisioner(engine.clone());

        let cred = db.create("my-shop").await.unwrap();
        assert_eq!(cred.database, "my_shop_db");
        assert_eq!(cred.user, "my_shop_user");
        assert_eq!(cred.secret.len(), 32);
        assert!(cred.secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(
            cred.url,
            format!("postgresql://my_shop_user:{}@localhost:5432/my_shop_db", cred.secret)
        );
        assert_eq!(
            engine.calls(),
            vec![
                "create_database my_shop_db",
                "create_user my_shop_user",
                "grant_all my_shop_db my_shop_user",
            ]
        );
    }

    #[tokio::test]
    async fn secrets_differ_between_projects() {
        let db = provisioner(Arc::new(FakeEngine::default()));
        let a = db.create("alpha").await.unwrap();
        let b = db.create("beta").await.unwrap();
        assert_ne!(a.secret, b.secret);
    }

    #[tokio::test]
    async fn debug_output_redacts_secret() {
        let db = provisioner(Arc::new(FakeEngine::default()));
        let cred = db.create("demo").await.unwrap();
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains(&cred.secret));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn invalid_slug_issues_no_sql() {
        let engine = Arc::new(FakeEngine::default());
        let db = provisioner(engine.clone());
        let err = db.create("Bad Slug").await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidSlug(_)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn unconventional_name_is_rejected_without_sql() {
        let engine = Arc::new(FakeEngine::default());
        let db = provisioner(engine.clone());

        let err = db.drop("other-projects-main-db", false).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ValidationRejected { .. }));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn protected_and_system_names_are_rejected() {
        let engine = Arc::new(FakeEngine::default());
        let db = provisioner(engine.clone());

        for name in ["postgres", "sitegrid", "billing_db", "template1", "pg_catalog", "DefaultDB"] {
            let err = db.drop(name, false).await.unwrap_err();
            assert!(
                matches!(err, DatabaseError::ValidationRejected { .. }),
                "{name} should be rejected"
            );
        }
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn dropping_missing_database_succeeds() {
        let engine = Arc::new(FakeEngine::default());
        let db = provisioner(engine.clone());

        db.drop("alreadygone_db", false).await.unwrap();
        assert_eq!(
            engine.calls(),
            vec![
                "terminate alreadygone_db",
                "drop_database alreadygone_db",
                "drop_user alreadygone_user",
            ]
        );
    }

    #[tokio::test]
    async fn force_bypasses_the_gate() {
        let engine = Arc::new(FakeEngine::default());
        let db = provisioner(engine.clone());

        db.drop("legacy-main", true).await.unwrap();
        // No conventional role to drop for a non-conforming name.
        assert_eq!(
            engine.calls(),
            vec!["terminate legacy-main", "drop_database legacy-main"]
        );
    }

    #[tokio::test]
    async fn drop_project_removes_database_and_user() {
        let engine = Arc::new(FakeEngine::default());
        let db = provisioner(engine.clone());

        db.create("demo").await.unwrap();
        assert_eq!(db.database_size("demo").await.unwrap(), Some(8_192));

        db.drop_project("demo", false).await.unwrap();
        assert!(engine.databases.lock().unwrap().is_empty());
        assert!(engine.users.lock().unwrap().is_empty());
        assert_eq!(db.database_size("demo").await.unwrap(), None);

        // Dropping twice is harmless.
        db.drop_project("demo", false).await.unwrap();
    }
}
