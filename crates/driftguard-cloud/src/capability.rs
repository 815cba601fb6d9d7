//! Capability traits over the cloud provider.
//!
//! Each trait covers one concern so that callers can ask for exactly what
//! they use (the drift detector needs listing and starting, the metrics
//! pipeline needs load balancers and quotas). The methods return boxed
//! futures so the traits stay object-safe and can be held as
//! `Arc<dyn CloudProvider>`.

use std::future::Future;
use std::pin::Pin;

use crate::error::CloudResult;
use crate::types::*;

/// Boxed, `Send` future returned by capability methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait InstanceLister: Send + Sync {
    /// List compute instances visible to the credentials.
    fn list_instances<'a>(
        &'a self,
        filter: &'a InstanceFilter,
    ) -> BoxFuture<'a, CloudResult<Vec<Instance>>>;
}

pub trait InstanceStarter: Send + Sync {
    /// Request that a stopped instance be started. Returns once the
    /// provider accepted the request, not once the instance is running.
    fn start_instance<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CloudResult<()>>;
}

pub trait LoadBalancerReader: Send + Sync {
    fn list_load_balancers(&self) -> BoxFuture<'_, CloudResult<Vec<LoadBalancer>>>;

    fn load_balancer_stats<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, CloudResult<LoadBalancerStats>>;

    fn list_pools(&self) -> BoxFuture<'_, CloudResult<Vec<Pool>>>;

    fn list_pool_members<'a>(
        &'a self,
        pool_id: &'a str,
    ) -> BoxFuture<'a, CloudResult<Vec<PoolMember>>>;
}

pub trait QuotaReader: Send + Sync {
    /// Project the credentials are scoped to, if known.
    fn scoped_project(&self) -> Option<Project>;

    fn compute_quota<'a>(&'a self, project: &'a Project)
    -> BoxFuture<'a, CloudResult<ComputeQuota>>;

    fn volume_quota<'a>(&'a self, project: &'a Project) -> BoxFuture<'a, CloudResult<VolumeQuota>>;
}

/// Everything the daemon needs from a provider.
pub trait CloudProvider: InstanceLister + InstanceStarter + LoadBalancerReader + QuotaReader {}

impl<T> CloudProvider for T where
    T: InstanceLister + InstanceStarter + LoadBalancerReader + QuotaReader
{
}
