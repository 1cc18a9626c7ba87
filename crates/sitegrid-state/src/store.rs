//! StateStore — redb-backed state persistence for SiteGrid.
//!
//! Provides typed CRUD operations over project records and provisioning
//! metadata. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PROJECTS).map_err(map_err!(Table))?;
        txn.open_table(PROVISIONING).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Projects ───────────────────────────────────────────────────

    /// Insert or update a project record.
    pub fn put_project(&self, project: &ProjectRecord) -> StateResult<()> {
        self.put(PROJECTS, project.table_key(), project)?;
        debug!(project = %project.id, status = %project.status, "project stored");
        Ok(())
    }

    /// Get a project by id.
    pub fn get_project(&self, id: &str) -> StateResult<Option<ProjectRecord>> {
        self.get(PROJECTS, id)
    }

    /// List all projects.
    pub fn list_projects(&self) -> StateResult<Vec<ProjectRecord>> {
        self.list(PROJECTS)
    }

    /// List projects currently in `status`.
    pub fn list_projects_with_status(
        &self,
        status: ProjectStatus,
    ) -> StateResult<Vec<ProjectRecord>> {
        let mut projects = self.list_projects()?;
        projects.retain(|p| p.status == status);
        Ok(projects)
    }

    /// Find a project by slug.
    pub fn find_project_by_slug(&self, slug: &str) -> StateResult<Option<ProjectRecord>> {
        Ok(self.list_projects()?.into_iter().find(|p| p.slug == slug))
    }

    /// Update a project's status (and ports, when given).
    ///
    /// Fails with `NotFound` if the project record does not exist.
    pub fn set_project_status(
        &self,
        id: &str,
        status: ProjectStatus,
        ports: Option<(u16, u16)>,
    ) -> StateResult<ProjectRecord> {
        let mut project = self
            .get_project(id)?
            .ok_or_else(|| StateError::NotFound(format!("project {id}")))?;
        project.status = status;
        match ports {
            Some((frontend, backend)) => {
                project.frontend_port = Some(frontend);
                project.backend_port = Some(backend);
            }
            None if status != ProjectStatus::Ready => {
                project.frontend_port = None;
                project.backend_port = None;
            }
            None => {}
        }
        project.updated_at = epoch_secs();
        self.put_project(&project)?;
        Ok(project)
    }

    /// Forget the ports a project holds, leaving its status alone.
    /// Returns false if the project does not exist.
    pub fn clear_project_ports(&self, id: &str) -> StateResult<bool> {
        let Some(mut project) = self.get_project(id)? else {
            return Ok(false);
        };
        project.frontend_port = None;
        project.backend_port = None;
        project.updated_at = epoch_secs();
        self.put_project(&project)?;
        Ok(true)
    }

    /// Delete a project by id. Returns true if it existed.
    pub fn delete_project(&self, id: &str) -> StateResult<bool> {
        let existed = self.remove(PROJECTS, id)?;
        debug!(project = %id, existed, "project deleted");
        Ok(existed)
    }

    // ── Provisioning metadata ─────────────────────────────────────

    /// Insert or update a provisioning metadata record.
    pub fn put_metadata(&self, meta: &ProvisioningMetadata) -> StateResult<()> {
        self.put(PROVISIONING, meta.table_key(), meta)?;
        debug!(project = %meta.project_id, phase = ?meta.phase, "provisioning metadata stored");
        Ok(())
    }

    /// Get the provisioning metadata for a project.
    pub fn get_metadata(&self, project_id: &str) -> StateResult<Option<ProvisioningMetadata>> {
        self.get(PROVISIONING, project_id)
    }

    /// List all provisioning metadata records.
    pub fn list_metadata(&self) -> StateResult<Vec<ProvisioningMetadata>> {
        self.list(PROVISIONING)
    }

    /// Delete the provisioning metadata for a project. Returns true if it existed.
    pub fn delete_metadata(&self, project_id: &str) -> StateResult<bool> {
        let existed = self.remove(PROVISIONING, project_id)?;
        debug!(project = %project_id, existed, "provisioning metadata deleted");
        Ok(existed)
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn put<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list<T: DeserializeOwned>(&self, table: Table) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let item: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(item);
        }
        Ok(results)
    }

    fn remove(&self, table: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}
