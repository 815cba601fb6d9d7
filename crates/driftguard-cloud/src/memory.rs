//! In-memory cloud — a scriptable provider double.
//!
//! Holds instances, load balancers, pools and quotas in memory and records
//! every start request. Individual calls can be made to fail so that the
//! best-effort paths of the loop can be exercised.
//!
//! Start requests are recorded but do not change the instance's status,
//! which models a provider that starts instances asynchronously.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::capability::*;
use crate::error::{CloudError, CloudResult};
use crate::types::*;

#[derive(Default)]
struct Inner {
    instances: Vec<Instance>,
    start_requests: Vec<String>,
    load_balancers: Vec<LoadBalancer>,
    stats: HashMap<String, LoadBalancerStats>,
    pools: Vec<Pool>,
    members: HashMap<String, Vec<PoolMember>>,
    project: Option<Project>,
    compute_quota: Option<ComputeQuota>,
    volume_quota: Option<VolumeQuota>,

    fail_instance_listing: bool,
    fail_load_balancer_listing: bool,
    fail_pool_listing: bool,
    failing_starts: HashSet<String>,
    failing_stats: HashSet<String>,
    failing_members: HashSet<String>,
}

/// Thread-safe in-memory provider.
#[derive(Default)]
pub struct InMemoryCloud {
    inner: Mutex<Inner>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Builders ───────────────────────────────────────────────────

    pub fn with_instance(self, instance: Instance) -> Self {
        self.inner().instances.push(instance);
        self
    }

    /// Add a load balancer. `stats: None` leaves its statistics unknown,
    /// which makes `load_balancer_stats` fail with `NotFound`.
    pub fn with_load_balancer(self, lb: LoadBalancer, stats: Option<LoadBalancerStats>) -> Self {
        {
            let mut inner = self.inner();
            if let Some(stats) = stats {
                inner.stats.insert(lb.id.clone(), stats);
            }
            inner.load_balancers.push(lb);
        }
        self
    }

    pub fn with_pool(self, pool: Pool, members: Vec<PoolMember>) -> Self {
        {
            let mut inner = self.inner();
            inner.members.insert(pool.id.clone(), members);
            inner.pools.push(pool);
        }
        self
    }

    pub fn with_project(self, project: Project) -> Self {
        self.inner().project = Some(project);
        self
    }

    pub fn with_compute_quota(self, quota: ComputeQuota) -> Self {
        self.inner().compute_quota = Some(quota);
        self
    }

    pub fn with_volume_quota(self, quota: VolumeQuota) -> Self {
        self.inner().volume_quota = Some(quota);
        self
    }

    // ── Runtime mutation ───────────────────────────────────────────

    /// Replace the instance inventory.
    pub fn set_instances(&self, instances: Vec<Instance>) {
        self.inner().instances = instances;
    }

    /// Replace the load balancer inventory and its statistics.
    pub fn set_load_balancers(&self, lbs: Vec<(LoadBalancer, Option<LoadBalancerStats>)>) {
        let mut inner = self.inner();
        inner.load_balancers.clear();
        inner.stats.clear();
        for (lb, stats) in lbs {
            if let Some(stats) = stats {
                inner.stats.insert(lb.id.clone(), stats);
            }
            inner.load_balancers.push(lb);
        }
    }

    pub fn fail_instance_listing(&self, fail: bool) {
        self.inner().fail_instance_listing = fail;
    }

    pub fn fail_load_balancer_listing(&self, fail: bool) {
        self.inner().fail_load_balancer_listing = fail;
    }

    pub fn fail_pool_listing(&self, fail: bool) {
        self.inner().fail_pool_listing = fail;
    }

    pub fn fail_start_for(&self, id: &str) {
        self.inner().failing_starts.insert(id.to_string());
    }

    pub fn fail_stats_for(&self, id: &str) {
        self.inner().failing_stats.insert(id.to_string());
    }

    pub fn fail_members_for(&self, pool_id: &str) {
        self.inner().failing_members.insert(pool_id.to_string());
    }

    // ── Inspection ─────────────────────────────────────────────────

    /// Every start request received, in order, including failed ones.
    pub fn start_requests(&self) -> Vec<String> {
        self.inner().start_requests.clone()
    }

    pub fn clear_start_requests(&self) {
        self.inner().start_requests.clear();
    }
}

impl InstanceLister for InMemoryCloud {
    fn list_instances<'a>(
        &'a self,
        filter: &'a InstanceFilter,
    ) -> BoxFuture<'a, CloudResult<Vec<Instance>>> {
        let result = {
            let inner = self.inner();
            if inner.fail_instance_listing {
                Err(CloudError::Unavailable("instance listing".to_string()))
            } else {
                Ok(inner
                    .instances
                    .iter()
                    .filter(|i| filter.matches(i))
                    .cloned()
                    .collect())
            }
        };
        Box::pin(async move { result })
    }
}

impl InstanceStarter for InMemoryCloud {
    fn start_instance<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CloudResult<()>> {
        let result = {
            let mut inner = self.inner();
            inner.start_requests.push(id.to_string());
            if inner.failing_starts.contains(id) {
                Err(CloudError::Unavailable(format!("start {id}")))
            } else if inner.instances.iter().any(|i| i.id == id) {
                Ok(())
            } else {
                Err(CloudError::NotFound(format!("instance {id}")))
            }
        };
        Box::pin(async move { result })
    }
}

impl LoadBalancerReader for InMemoryCloud {
    fn list_load_balancers(&self) -> BoxFuture<'_, CloudResult<Vec<LoadBalancer>>> {
        let result = {
            let inner = self.inner();
            if inner.fail_load_balancer_listing {
                Err(CloudError::Unavailable("load balancer listing".to_string()))
            } else {
                Ok(inner.load_balancers.clone())
            }
        };
        Box::pin(async move { result })
    }

    fn load_balancer_stats<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, CloudResult<LoadBalancerStats>> {
        let result = {
            let inner = self.inner();
            if inner.failing_stats.contains(id) {
                Err(CloudError::Unavailable(format!("stats for {id}")))
            } else {
                inner
                    .stats
                    .get(id)
                    .copied()
                    .ok_or_else(|| CloudError::NotFound(format!("stats for {id}")))
            }
        };
        Box::pin(async move { result })
    }

    fn list_pools(&self) -> BoxFuture<'_, CloudResult<Vec<Pool>>> {
        let result = {
            let inner = self.inner();
            if inner.fail_pool_listing {
                Err(CloudError::Unavailable("pool listing".to_string()))
            } else {
                Ok(inner.pools.clone())
            }
        };
        Box::pin(async move { result })
    }

    fn list_pool_members<'a>(
        &'a self,
        pool_id: &'a str,
    ) -> BoxFuture<'a, CloudResult<Vec<PoolMember>>> {
        let result = {
            let inner = self.inner();
            if inner.failing_members.contains(pool_id) {
                Err(CloudError::Unavailable(format!("members of {pool_id}")))
            } else {
                inner
                    .members
                    .get(pool_id)
                    .cloned()
                    .ok_or_else(|| CloudError::NotFound(format!("pool {pool_id}")))
            }
        };
        Box::pin(async move { result })
    }
}

impl QuotaReader for InMemoryCloud {
    fn scoped_project(&self) -> Option<Project> {
        self.inner().project.clone()
    }

    fn compute_quota<'a>(
        &'a self,
        project: &'a Project,
    ) -> BoxFuture<'a, CloudResult<ComputeQuota>> {
        let result = self
            .inner()
            .compute_quota
            .ok_or_else(|| CloudError::NotFound(format!("compute quota for {}", project.id)));
        Box::pin(async move { result })
    }

    fn volume_quota<'a>(&'a self, project: &'a Project) -> BoxFuture<'a, CloudResult<VolumeQuota>> {
        let result = self
            .inner()
            .volume_quota
            .ok_or_else(|| CloudError::NotFound(format!("volume quota for {}", project.id)));
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, status: InstanceStatus) -> Instance {
        Instance {
            id: id.to_string(),
            name: id.to_string(),
            status,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn lists_with_filter() {
        let cloud = InMemoryCloud::new()
            .with_instance(instance("a", InstanceStatus::Active))
            .with_instance(instance("b", InstanceStatus::Stopped));

        let all = cloud.list_instances(&InstanceFilter::all()).await.unwrap();
        assert_eq!(all.len(), 2);

        let stopped = InstanceFilter {
            status: Some(InstanceStatus::Stopped),
        };
        let only = cloud.list_instances(&stopped).await.unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].id, "b");
    }

    #[tokio::test]
    async fn records_start_requests_including_failures() {
        let cloud = InMemoryCloud::new()
            .with_instance(instance("a", InstanceStatus::Stopped))
            .with_instance(instance("b", InstanceStatus::Stopped));
        cloud.fail_start_for("b");

        assert!(cloud.start_instance("a").await.is_ok());
        assert!(cloud.start_instance("b").await.is_err());
        assert!(matches!(
            cloud.start_instance("missing").await,
            Err(CloudError::NotFound(_))
        ));
        assert_eq!(cloud.start_requests(), vec!["a", "b", "missing"]);
    }

    #[tokio::test]
    async fn stats_failures_are_per_load_balancer() {
        let lb = |id: &str| LoadBalancer {
            id: id.to_string(),
            name: id.to_string(),
            provisioning_status: "ACTIVE".to_string(),
            operating_status: "ONLINE".to_string(),
        };
        let cloud = InMemoryCloud::new()
            .with_load_balancer(lb("lb-1"), Some(LoadBalancerStats::default()))
            .with_load_balancer(lb("lb-2"), Some(LoadBalancerStats::default()));
        cloud.fail_stats_for("lb-1");

        assert!(cloud.load_balancer_stats("lb-1").await.is_err());
        assert!(cloud.load_balancer_stats("lb-2").await.is_ok());
    }
}
