//! Read-only view of the desired state, as consumed by the reconciliation loop.

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::StateStore;
use crate::types::{ClusterSpec, InstanceGroup};

/// Read accessors over the desired-state store.
///
/// The reconciliation loop depends on this trait rather than on
/// `StateStore`, so any store that can answer these two questions can
/// drive it.
pub trait ClusterStateReader: Send + Sync {
    /// Fetch a cluster spec by name. A missing cluster is an error.
    fn get_cluster(&self, name: &str) -> StateResult<ClusterSpec>;

    /// List the instance groups configured for a cluster.
    fn list_instance_groups(&self, cluster: &ClusterSpec) -> StateResult<Vec<InstanceGroup>>;
}

impl ClusterStateReader for StateStore {
    fn get_cluster(&self, name: &str) -> StateResult<ClusterSpec> {
        StateStore::get_cluster(self, name)?
            .ok_or_else(|| StateError::NotFound(format!("cluster {name}")))
    }

    fn list_instance_groups(&self, cluster: &ClusterSpec) -> StateResult<Vec<InstanceGroup>> {
        self.list_instance_groups_for_cluster(&cluster.name)
    }
}

/// A cluster together with its instance groups, read in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterState {
    pub cluster: ClusterSpec,
    pub instance_groups: Vec<InstanceGroup>,
}

/// Read the cluster spec and its instance groups.
pub fn read_cluster_state(
    reader: &dyn ClusterStateReader,
    cluster_name: &str,
) -> StateResult<ClusterState> {
    let cluster = reader.get_cluster(cluster_name)?;
    let instance_groups = reader.list_instance_groups(&cluster)?;
    debug!(
        cluster = %cluster.name,
        groups = instance_groups.len(),
        "cluster state read"
    );
    Ok(ClusterState {
        cluster,
        instance_groups,
    })
}
