//! Metrics pipeline — samples load balancers, pool members and quotas.
//!
//! Sub-samples are best-effort. A failing sub-sample is logged and its
//! category keeps the readings of the previous snapshot, so a transient
//! API error does not make series disappear from `/metrics`. A failed
//! stats call drops only that load balancer's statistics, and a pool whose
//! members cannot be listed is skipped. Only when every enabled sub-sample
//! fails is nothing published.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use driftguard_cloud::{LoadBalancerReader, Project, QuotaReader};

use crate::error::{MetricsError, MetricsResult};
use crate::registry::MetricsRegistry;
use crate::snapshot::{LoadBalancerReading, MetricsSnapshot, PoolMemberReading, QuotaReading};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Sample load balancers and their pool members.
    pub load_balancers: bool,
    /// Sample compute and block-storage quotas.
    pub quotas: bool,
    /// Project to report quotas for. Falls back to the provider's scoped
    /// project.
    pub project: Option<Project>,
}

impl PipelineConfig {
    pub fn is_enabled(&self) -> bool {
        self.load_balancers || self.quotas
    }
}

pub struct MetricsPipeline {
    config: PipelineConfig,
    registry: MetricsRegistry,
}

impl MetricsPipeline {
    pub fn new(config: PipelineConfig, registry: MetricsRegistry) -> Self {
        Self { config, registry }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Run every enabled sub-sample and publish the result as one snapshot.
    pub async fn sample<C>(&self, cloud: &C) -> MetricsResult<Arc<MetricsSnapshot>>
    where
        C: LoadBalancerReader + QuotaReader + ?Sized,
    {
        if !self.config.is_enabled() {
            return Err(MetricsError::NothingEnabled);
        }

        let mut snapshot = MetricsSnapshot {
            sampled_at: epoch_secs(),
            ..Default::default()
        };
        let previous = self.registry.current().await;
        let mut enabled = 0;
        let mut failures: Vec<String> = Vec::new();

        if self.config.load_balancers {
            enabled += 2;
            match sample_load_balancers(cloud).await {
                Ok(readings) => snapshot.load_balancers = Some(readings),
                Err(e) => {
                    failures.push(e);
                    snapshot.load_balancers = previous.load_balancers.clone();
                }
            }
            match sample_pool_members(cloud).await {
                Ok(readings) => snapshot.pool_members = Some(readings),
                Err(e) => {
                    failures.push(e);
                    snapshot.pool_members = previous.pool_members.clone();
                }
            }
        }

        if self.config.quotas {
            enabled += 2;
            let project = self.config.project.clone().or_else(|| cloud.scoped_project());
            match project {
                Some(project) => {
                    let (reading, errors) =
                        sample_quotas(cloud, project, previous.quotas.as_ref()).await;
                    snapshot.quotas = reading;
                    failures.extend(errors);
                }
                None => {
                    warn!("no project configured or scoped; skipping quota metrics");
                    failures.push(MetricsError::NoProject.to_string());
                    failures.push(MetricsError::NoProject.to_string());
                }
            }
        }

        if failures.len() >= enabled {
            self.registry.counters().record_sample_failure();
            return Err(MetricsError::AllFailed(failures.join("; ")));
        }

        debug!(
            failed = failures.len(),
            sub_samples = enabled,
            "metrics sample complete"
        );
        self.registry.publish_sample(snapshot).await;
        Ok(self.registry.current().await)
    }
}

async fn sample_load_balancers<C>(cloud: &C) -> Result<Vec<LoadBalancerReading>, String>
where
    C: LoadBalancerReader + ?Sized,
{
    let lbs = cloud.list_load_balancers().await.map_err(|e| {
        warn!(error = %e, "failed to list load balancers");
        format!("load balancers: {e}")
    })?;

    let mut readings = Vec::with_capacity(lbs.len());
    for lb in lbs {
        let stats = match cloud.load_balancer_stats(&lb.id).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(load_balancer = %lb.id, error = %e, "failed to fetch load balancer stats");
                None
            }
        };
        readings.push(LoadBalancerReading {
            load_balancer: lb,
            stats,
        });
    }
    Ok(readings)
}

async fn sample_pool_members<C>(cloud: &C) -> Result<Vec<PoolMemberReading>, String>
where
    C: LoadBalancerReader + ?Sized,
{
    let pools = cloud.list_pools().await.map_err(|e| {
        warn!(error = %e, "failed to list pools");
        format!("pools: {e}")
    })?;

    let mut readings = Vec::new();
    for pool in pools {
        let members = match cloud.list_pool_members(&pool.id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(pool = %pool.id, error = %e, "failed to list pool members");
                continue;
            }
        };
        let load_balancer_id = pool.load_balancer_ids.first().cloned().unwrap_or_default();
        for member in members {
            readings.push(PoolMemberReading {
                member,
                pool_id: pool.id.clone(),
                pool_name: pool.name.clone(),
                load_balancer_id: load_balancer_id.clone(),
            });
        }
    }
    Ok(readings)
}

/// Sample both quota sets. A half that fails keeps the previous reading
/// for the same project.
async fn sample_quotas<C>(
    cloud: &C,
    project: Project,
    previous: Option<&QuotaReading>,
) -> (Option<QuotaReading>, Vec<String>)
where
    C: QuotaReader + ?Sized,
{
    let mut errors = Vec::new();
    let previous = previous.filter(|p| p.project.id == project.id);

    let compute = match cloud.compute_quota(&project).await {
        Ok(q) => Some(q),
        Err(e) => {
            warn!(project = %project.id, error = %e, "failed to fetch compute quota");
            errors.push(format!("compute quota: {e}"));
            None
        }
    };
    let volume = match cloud.volume_quota(&project).await {
        Ok(q) => Some(q),
        Err(e) => {
            warn!(project = %project.id, error = %e, "failed to fetch volume quota");
            errors.push(format!("volume quota: {e}"));
            None
        }
    };

    let compute = compute.or_else(|| previous.and_then(|p| p.compute.clone()));
    let volume = volume.or_else(|| previous.and_then(|p| p.volume.clone()));

    let reading = (compute.is_some() || volume.is_some()).then(|| QuotaReading {
        project,
        compute,
        volume,
    });
    (reading, errors)
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use driftguard_cloud::{
        ComputeQuota, InMemoryCloud, LoadBalancer, LoadBalancerStats, Pool, PoolMember,
        VolumeQuota,
    };

    use super::*;

    fn lb(id: &str) -> LoadBalancer {
        LoadBalancer {
            id: id.to_string(),
            name: format!("{id}-name"),
            provisioning_status: "ACTIVE".to_string(),
            operating_status: "ONLINE".to_string(),
        }
    }

    fn member(id: &str) -> PoolMember {
        PoolMember {
            id: id.to_string(),
            name: id.to_string(),
            provisioning_status: "ACTIVE".to_string(),
            operating_status: "ONLINE".to_string(),
            weight: 1,
        }
    }

    fn project() -> Project {
        Project {
            id: "p-1".to_string(),
            name: "infra".to_string(),
        }
    }

    fn populated_cloud() -> InMemoryCloud {
        InMemoryCloud::new()
            .with_load_balancer(lb("lb-1"), Some(LoadBalancerStats::default()))
            .with_load_balancer(lb("lb-2"), Some(LoadBalancerStats::default()))
            .with_pool(
                Pool {
                    id: "pool-1".to_string(),
                    name: "http".to_string(),
                    load_balancer_ids: vec!["lb-1".to_string(), "lb-2".to_string()],
                },
                vec![member("m-1"), member("m-2")],
            )
            .with_pool(
                Pool {
                    id: "pool-2".to_string(),
                    name: "grpc".to_string(),
                    load_balancer_ids: vec![],
                },
                vec![member("m-3")],
            )
            .with_project(project())
            .with_compute_quota(ComputeQuota::default())
            .with_volume_quota(VolumeQuota::default())
    }

    fn all_enabled() -> PipelineConfig {
        PipelineConfig {
            load_balancers: true,
            quotas: true,
            project: None,
        }
    }

    #[tokio::test]
    async fn samples_every_category() {
        let registry = MetricsRegistry::new();
        let pipeline = MetricsPipeline::new(all_enabled(), registry.clone());

        let snap = pipeline.sample(&populated_cloud()).await.unwrap();
        assert_eq!(snap.load_balancers.as_ref().map(Vec::len), Some(2));
        let members = snap.pool_members.as_ref().unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].load_balancer_id, "lb-1");
        assert_eq!(members[2].load_balancer_id, "");
        let quotas = snap.quotas.as_ref().unwrap();
        assert_eq!(quotas.project.id, "p-1");
        assert!(quotas.compute.is_some() && quotas.volume.is_some());
    }

    #[tokio::test]
    async fn stats_failure_records_status_only() {
        let cloud = populated_cloud();
        cloud.fail_stats_for("lb-1");
        let pipeline = MetricsPipeline::new(all_enabled(), MetricsRegistry::new());

        let snap = pipeline.sample(&cloud).await.unwrap();
        let lbs = snap.load_balancers.as_ref().unwrap();
        assert_eq!(lbs.len(), 2);
        assert!(lbs[0].stats.is_none());
        assert!(lbs[1].stats.is_some());
    }

    #[tokio::test]
    async fn failing_pool_is_skipped() {
        let cloud = populated_cloud();
        cloud.fail_members_for("pool-1");
        let pipeline = MetricsPipeline::new(all_enabled(), MetricsRegistry::new());

        let snap = pipeline.sample(&cloud).await.unwrap();
        let members = snap.pool_members.as_ref().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].pool_id, "pool-2");
    }

    #[tokio::test]
    async fn failed_category_keeps_previous_readings() {
        let cloud = populated_cloud();
        let registry = MetricsRegistry::new();
        let pipeline = MetricsPipeline::new(all_enabled(), registry.clone());
        let first = pipeline.sample(&cloud).await.unwrap();
        assert!(first.load_balancers.is_some());

        cloud.fail_load_balancer_listing(true);
        let snap = pipeline.sample(&cloud).await.unwrap();
        assert_eq!(snap.load_balancers, first.load_balancers);
        assert!(snap.pool_members.is_some());

        let body = registry.render().await;
        assert!(body.contains("openstack_loadbalancer{"));
    }

    #[tokio::test]
    async fn failed_category_without_history_stays_absent() {
        let cloud = populated_cloud();
        cloud.fail_load_balancer_listing(true);
        let registry = MetricsRegistry::new();
        let pipeline = MetricsPipeline::new(all_enabled(), registry.clone());

        let snap = pipeline.sample(&cloud).await.unwrap();
        assert!(snap.load_balancers.is_none());
        assert!(snap.pool_members.is_some());
    }

    #[tokio::test]
    async fn nothing_published_when_everything_fails() {
        let cloud = InMemoryCloud::new();
        cloud.fail_load_balancer_listing(true);
        cloud.fail_pool_listing(true);
        let registry = MetricsRegistry::new();
        let pipeline = MetricsPipeline::new(
            PipelineConfig {
                load_balancers: true,
                quotas: false,
                project: None,
            },
            registry.clone(),
        );

        assert!(matches!(
            pipeline.sample(&cloud).await,
            Err(MetricsError::AllFailed(_))
        ));
        assert!(registry.current().await.is_empty());
        assert_eq!(registry.counters().values().metrics_sample_failures_total, 1);
    }

    #[tokio::test]
    async fn quota_without_project_fails() {
        let cloud = InMemoryCloud::new().with_compute_quota(ComputeQuota::default());
        let pipeline = MetricsPipeline::new(
            PipelineConfig {
                load_balancers: false,
                quotas: true,
                project: None,
            },
            MetricsRegistry::new(),
        );
        assert!(pipeline.sample(&cloud).await.is_err());
    }

    #[tokio::test]
    async fn configured_project_overrides_scoped_one() {
        let cloud = populated_cloud();
        let pipeline = MetricsPipeline::new(
            PipelineConfig {
                load_balancers: false,
                quotas: true,
                project: Some(Project {
                    id: "p-2".to_string(),
                    name: "other".to_string(),
                }),
            },
            MetricsRegistry::new(),
        );
        let snap = pipeline.sample(&cloud).await.unwrap();
        assert_eq!(snap.quotas.as_ref().unwrap().project.id, "p-2");
    }

    #[tokio::test]
    async fn disabled_pipeline_refuses_to_sample() {
        let pipeline = MetricsPipeline::new(PipelineConfig::default(), MetricsRegistry::new());
        assert!(!pipeline.is_enabled());
        assert!(matches!(
            pipeline.sample(&InMemoryCloud::new()).await,
            Err(MetricsError::NothingEnabled)
        ));
    }
}
