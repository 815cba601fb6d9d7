//! StateStore — redb-backed persistence for cluster and instance-group specs.
//!
//! Provides typed CRUD operations over clusters and instance groups. All
//! values are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
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
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.open_table(INSTANCE_GROUPS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Clusters ───────────────────────────────────────────────────

    /// Insert or update a cluster spec.
    pub fn put_cluster(&self, spec: &ClusterSpec) -> StateResult<()> {
        let key = spec.table_key();
        let value = serde_json::to_vec(spec).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "cluster stored");
        Ok(())
    }

    /// Get a cluster by name.
    pub fn get_cluster(&self, name: &str) -> StateResult<Option<ClusterSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let spec: ClusterSpec =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(spec))
            }
            None => Ok(None),
        }
    }

    /// List all clusters.
    pub fn list_clusters(&self) -> StateResult<Vec<ClusterSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let spec: ClusterSpec =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(spec);
        }
        Ok(results)
    }

    /// Delete a cluster and all of its instance groups. Returns true if the
    /// cluster existed.
    pub fn delete_cluster(&self, name: &str) -> StateResult<bool> {
        let group_keys = self.instance_group_keys(name)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut clusters = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            existed = clusters.remove(name).map_err(map_err!(Write))?.is_some();
            let mut groups = txn.open_table(INSTANCE_GROUPS).map_err(map_err!(Table))?;
            for key in &group_keys {
                groups.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cluster = %name, existed, groups = group_keys.len(), "cluster deleted");
        Ok(existed)
    }

    // ── Instance groups ────────────────────────────────────────────

    /// Insert or update an instance group.
    pub fn put_instance_group(&self, group: &InstanceGroup) -> StateResult<()> {
        let key = group.table_key();
        let value = serde_json::to_vec(group).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCE_GROUPS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "instance group stored");
        Ok(())
    }

    /// Get an instance group by its composite `{cluster}/{group}` key.
    pub fn get_instance_group(&self, key: &str) -> StateResult<Option<InstanceGroup>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCE_GROUPS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let group: InstanceGroup =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(group))
            }
            None => Ok(None),
        }
    }

    /// List all instance groups of a cluster, ordered by group name.
    pub fn list_instance_groups_for_cluster(
        &self,
        cluster: &str,
    ) -> StateResult<Vec<InstanceGroup>> {
        let prefix = format!("{cluster}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCE_GROUPS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                continue;
            }
            let group: InstanceGroup =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(group);
        }
        Ok(results)
    }

    /// Delete an instance group by key. Returns true if it existed.
    pub fn delete_instance_group(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(INSTANCE_GROUPS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "instance group deleted");
        Ok(existed)
    }

    /// Collect the keys of every instance group belonging to a cluster.
    fn instance_group_keys(&self, cluster: &str) -> StateResult<Vec<String>> {
        let prefix = format!("{cluster}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCE_GROUPS).map_err(map_err!(Table))?;
        let mut keys = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            let k = key.value();
            if !k.starts_with(&prefix) {
                continue;
            }
            keys.push(k.to_string());
        }
        Ok(keys)
    }
}
