//! SQL engine seam.
//!
//! The provisioner only ever issues the handful of administrative
//! statements below. Identifiers reaching an engine have already been
//! validated by the provisioner; engines still quote them.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

use crate::error::{DatabaseError, DatabaseResult};

/// Administrative operations against the shared database engine.
#[async_trait]
pub trait DatabaseEngine: Send + Sync {
    async fn create_database(&self, name: &str) -> DatabaseResult<()>;

    async fn create_user(&self, user: &str, password: &str) -> DatabaseResult<()>;

    async fn grant_all(&self, database: &str, user: &str) -> DatabaseResult<()>;

    /// Disconnect every session attached to `database`.
    async fn terminate_connections(&self, database: &str) -> DatabaseResult<()>;

    async fn drop_database_if_exists(&self, name: &str) -> DatabaseResult<()>;

    async fn drop_user_if_exists(&self, user: &str) -> DatabaseResult<()>;

    /// Size in bytes, `None` if the database does not exist.
    async fn database_size(&self, name: &str) -> DatabaseResult<Option<u64>>;
}

/// Double-quote an identifier for DDL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quote a string literal for DDL.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// PostgreSQL engine over a lazily connected administrative pool.
pub struct PostgresEngine {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresEngine {
    /// Build the pool without connecting; the first statement connects.
    pub fn connect_lazy(
        admin_url: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> DatabaseResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect_lazy(admin_url)
            .map_err(|e| DatabaseError::Engine {
                operation: "connect",
                message: e.to_string(),
            })?;
        Ok(Self { pool, timeout })
    }

    /// Run a DDL statement over the simple query protocol. `CREATE
    /// DATABASE` and `DROP DATABASE` refuse to run inside a transaction.
    async fn execute_ddl(&self, operation: &'static str, sql: String) -> DatabaseResult<()> {
        debug!(operation, "executing DDL");
        let pool = &self.pool;
        self.bounded(operation, async move { sqlx::raw_sql(&sql).execute(pool).await })
            .await?;
        Ok(())
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> DatabaseResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DatabaseError::Engine {
                operation,
                message: e.to_string(),
            }),
            Err(_) => Err(DatabaseError::TimedOut {
                operation,
                after: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl DatabaseEngine for PostgresEngine {
    async fn create_database(&self, name: &str) -> DatabaseResult<()> {
        self.execute_ddl("create database", format!("CREATE DATABASE {}", quote_ident(name)))
            .await
    }

    async fn create_user(&self, user: &str, password: &str) -> DatabaseResult<()> {
        let sql = format!(
            "CREATE USER {} WITH PASSWORD {}",
            quote_ident(user),
            quote_literal(password)
        );
        self.execute_ddl("create user", sql).await
    }

    async fn grant_all(&self, database: &str, user: &str) -> DatabaseResult<()> {
        let sql = format!(
            "GRANT ALL PRIVILEGES ON DATABASE {} TO {}",
            quote_ident(database),
            quote_ident(user)
        );
        self.execute_ddl("grant privileges", sql).await
    }

    async fn terminate_connections(&self, database: &str) -> DatabaseResult<()> {
        let query = sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = $1 AND pid <> pg_backend_pid()",
        )
        .bind(database.to_string());
        let pool = &self.pool;
        self.bounded("terminate connections", async move {
            query.execute(pool).await
        })
        .await?;
        Ok(())
    }

    async fn drop_database_if_exists(&self, name: &str) -> DatabaseResult<()> {
        self.execute_ddl(
            "drop database",
            format!("DROP DATABASE IF EXISTS {}", quote_ident(name)),
        )
        .await
    }

    async fn drop_user_if_exists(&self, user: &str) -> DatabaseResult<()> {
        self.execute_ddl("drop user", format!("DROP USER IF EXISTS {}", quote_ident(user)))
            .await
    }

    async fn database_size(&self, name: &str) -> DatabaseResult<Option<u64>> {
        let query = sqlx::query_scalar::<_, i64>(
            "SELECT pg_database_size(datname) FROM pg_database WHERE datname = $1",
        )
        .bind(name.to_string());
        let pool = &self.pool;
        let size = self
            .bounded("database size", async move { query.fetch_optional(pool).await })
            .await?;
        Ok(size.map(|bytes| bytes.max(0) as u64))
    }
}
