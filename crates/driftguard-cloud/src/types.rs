//! Provider-neutral views of instances, load balancers and quotas.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Instances ─────────────────────────────────────────────────────

/// Lifecycle status of a compute instance.
///
/// Provider status strings are matched case-insensitively; `SHUTOFF` and
/// `STOPPED` both map to [`InstanceStatus::Stopped`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceStatus {
    Active,
    Stopped,
    Building,
    Error,
    Other(String),
}

impl InstanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InstanceStatus::Active => "ACTIVE",
            InstanceStatus::Stopped => "SHUTOFF",
            InstanceStatus::Building => "BUILD",
            InstanceStatus::Error => "ERROR",
            InstanceStatus::Other(s) => s,
        }
    }
}

impl From<&str> for InstanceStatus {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => InstanceStatus::Active,
            "SHUTOFF" | "STOPPED" => InstanceStatus::Stopped,
            "BUILD" | "BUILDING" => InstanceStatus::Building,
            "ERROR" => InstanceStatus::Error,
            _ => InstanceStatus::Other(s.to_string()),
        }
    }
}

impl From<String> for InstanceStatus {
    fn from(s: String) -> Self {
        InstanceStatus::from(s.as_str())
    }
}

impl From<InstanceStatus> for String {
    fn from(status: InstanceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live compute instance as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub status: InstanceStatus,
    /// Provider metadata; carries the cluster, instance-group and
    /// maintenance tags.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Metadata keys that tie an instance to a cluster and instance group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagKeys {
    pub cluster: String,
    pub instance_group: String,
    pub maintenance: String,
}

impl Default for TagKeys {
    fn default() -> Self {
        Self {
            cluster: "k8s".to_string(),
            instance_group: "KopsInstanceGroup".to_string(),
            maintenance: "maintenance".to_string(),
        }
    }
}

impl Instance {
    /// Cluster this instance claims membership of.
    pub fn cluster<'a>(&'a self, keys: &TagKeys) -> Option<&'a str> {
        self.metadata.get(&keys.cluster).map(String::as_str)
    }

    /// Instance group this instance claims to belong to.
    pub fn instance_group<'a>(&'a self, keys: &TagKeys) -> Option<&'a str> {
        self.metadata.get(&keys.instance_group).map(String::as_str)
    }

    /// Whether an operator has flagged this instance as under maintenance.
    pub fn under_maintenance(&self, keys: &TagKeys) -> bool {
        self.metadata
            .get(&keys.maintenance)
            .is_some_and(|v| v == "true")
    }

    pub fn is_stopped(&self) -> bool {
        self.status == InstanceStatus::Stopped
    }
}

/// Server-side filter for instance listings. The default lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    pub status: Option<InstanceStatus>,
}

impl InstanceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, instance: &Instance) -> bool {
        self.status
            .as_ref()
            .is_none_or(|status| *status == instance.status)
    }
}

// ── Load balancers ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    pub provisioning_status: String,
    pub operating_status: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerStats {
    pub active_connections: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub request_errors: u64,
    pub total_connections: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub name: String,
    /// Load balancers this pool is attached to, in provider order.
    pub load_balancer_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMember {
    pub id: String,
    pub name: String,
    pub provisioning_status: String,
    pub operating_status: String,
    pub weight: u32,
}

// ── Quotas ────────────────────────────────────────────────────────

/// Project (tenant) that quotas are accounted against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// One quota line. A `limit` of -1 means unlimited.
///
/// Only block-storage quota sets report `allocated`; Nova leaves it out and
/// it decodes as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    #[serde(default)]
    pub in_use: i64,
    #[serde(default)]
    pub reserved: i64,
    #[serde(default)]
    pub allocated: i64,
    #[serde(default)]
    pub limit: i64,
}

impl QuotaUsage {
    /// Compute consumption: in use plus reserved.
    pub fn compute_used(&self) -> i64 {
        self.in_use + self.reserved
    }

    /// Block-storage consumption: in use plus reserved plus allocated.
    pub fn volume_used(&self) -> i64 {
        self.in_use + self.reserved + self.allocated
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeQuota {
    pub ram: QuotaUsage,
    pub security_groups: QuotaUsage,
    pub cores: QuotaUsage,
    pub instances: QuotaUsage,
    pub server_groups: QuotaUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeQuota {
    pub volumes: QuotaUsage,
    pub gigabytes: QuotaUsage,
}
