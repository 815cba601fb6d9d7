//! Domain types for the desired-state store.
//!
//! A `ClusterSpec` identifies a cluster and its cloud placement; each
//! `InstanceGroup` belongs to exactly one cluster and carries the size
//! bounds the reconciliation loop compares live instance counts against.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cluster name, unique within a store.
pub type ClusterName = String;

// ── Cluster ───────────────────────────────────────────────────────

/// Desired configuration of a managed cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSpec {
    pub name: ClusterName,
    /// Cloud provider identifier (e.g. "openstack").
    pub cloud: String,
    /// Provider region the cluster lives in.
    #[serde(default)]
    pub region: Option<String>,
    /// Provider project (tenant) that owns the cluster's resources.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Unix timestamp (seconds) when this spec was created.
    #[serde(default)]
    pub created_at: u64,
    /// Unix timestamp (seconds) when this spec was last updated.
    #[serde(default)]
    pub updated_at: u64,
}

// ── Instance group ────────────────────────────────────────────────

/// Role of the machines in an instance group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceGroupRole {
    ControlPlane,
    #[default]
    Node,
    Bastion,
}

/// A named set of instances governed by shared size bounds.
///
/// `max_size >= min_size` is assumed but not enforced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceGroup {
    /// Owning cluster name.
    pub cluster: ClusterName,
    pub name: String,
    #[serde(default)]
    pub role: InstanceGroupRole,
    /// Flavor / machine type of the group's instances.
    #[serde(default)]
    pub machine_type: Option<String>,
    pub min_size: u32,
    pub max_size: u32,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl ClusterSpec {
    /// Build the key for the clusters table.
    pub fn table_key(&self) -> String {
        self.name.clone()
    }
}

impl InstanceGroup {
    /// Build the composite key for the instance groups table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.cluster, self.name)
    }
}
