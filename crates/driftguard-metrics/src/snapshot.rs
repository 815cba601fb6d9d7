//! The metrics snapshot — one complete, immutable set of readings.
//!
//! Every category is optional. A category is `None` when it was not
//! sampled or when its sub-sample failed in the pass that produced the
//! snapshot.

use serde::{Deserialize, Serialize};

use driftguard_cloud::{
    ComputeQuota, Instance, LoadBalancer, LoadBalancerStats, PoolMember, Project, VolumeQuota,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerReading {
    pub load_balancer: LoadBalancer,
    /// `None` when statistics could not be retrieved.
    pub stats: Option<LoadBalancerStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolMemberReading {
    pub member: PoolMember,
    pub pool_id: String,
    pub pool_name: String,
    /// First load balancer the pool is attached to; empty when detached.
    pub load_balancer_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaReading {
    pub project: Project,
    pub compute: Option<ComputeQuota>,
    pub volume: Option<VolumeQuota>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Unix timestamp (seconds) of the pass that produced the sampled
    /// categories; 0 before the first sample.
    pub sampled_at: u64,
    pub load_balancers: Option<Vec<LoadBalancerReading>>,
    pub pool_members: Option<Vec<PoolMemberReading>>,
    pub quotas: Option<QuotaReading>,
    /// Cluster instances seen by the last drift pass.
    pub instances: Option<Vec<Instance>>,
}

impl MetricsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.load_balancers.is_none()
            && self.pool_members.is_none()
            && self.quotas.is_none()
            && self.instances.is_none()
    }
}
