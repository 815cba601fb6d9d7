//! Metrics registry — the published snapshot plus the loop counters.
//!
//! The snapshot lives behind `RwLock<Arc<MetricsSnapshot>>`. Writers build
//! a complete replacement and swap the `Arc` under the write lock; readers
//! clone the `Arc` under the read lock and never observe a partial update.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use driftguard_cloud::Instance;

use crate::prometheus::render_prometheus;
use crate::snapshot::MetricsSnapshot;

/// Monotonic counters describing the reconciliation loop.
#[derive(Debug, Default)]
pub struct LoopCounters {
    cycles: AtomicU64,
    cycle_failures: AtomicU64,
    consecutive_failures: AtomicU64,
    drift_detected: AtomicU64,
    applies: AtomicU64,
    instance_restarts: AtomicU64,
    sample_failures: AtomicU64,
    last_sample_timestamp: AtomicU64,
}

/// Point-in-time copy of [`LoopCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterValues {
    pub cycles_total: u64,
    pub cycle_failures_total: u64,
    pub consecutive_failures: u64,
    pub drift_detected_total: u64,
    pub applies_total: u64,
    pub instance_restarts_total: u64,
    pub metrics_sample_failures_total: u64,
    pub last_sample_timestamp_seconds: u64,
}

impl LoopCounters {
    /// Record the end of a cycle and the resulting consecutive-failure count.
    pub fn record_cycle(&self, success: bool, consecutive_failures: u32) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.cycle_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.consecutive_failures
            .store(u64::from(consecutive_failures), Ordering::Relaxed);
    }

    pub fn record_drift(&self) {
        self.drift_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_apply(&self) {
        self.applies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restarts(&self, count: u64) {
        self.instance_restarts.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_sample_failure(&self) {
        self.sample_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample(&self, timestamp: u64) {
        self.last_sample_timestamp
            .store(timestamp, Ordering::Relaxed);
    }

    pub fn values(&self) -> CounterValues {
        CounterValues {
            cycles_total: self.cycles.load(Ordering::Relaxed),
            cycle_failures_total: self.cycle_failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            drift_detected_total: self.drift_detected.load(Ordering::Relaxed),
            applies_total: self.applies.load(Ordering::Relaxed),
            instance_restarts_total: self.instance_restarts.load(Ordering::Relaxed),
            metrics_sample_failures_total: self.sample_failures.load(Ordering::Relaxed),
            last_sample_timestamp_seconds: self.last_sample_timestamp.load(Ordering::Relaxed),
        }
    }
}

/// Shared handle to the published metrics. Cheap to clone.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    snapshot: Arc<RwLock<Arc<MetricsSnapshot>>>,
    counters: Arc<LoopCounters>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &LoopCounters {
        &self.counters
    }

    /// The currently published snapshot.
    pub async fn current(&self) -> Arc<MetricsSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Publish the sampled categories of `sampled`, replacing every sampled
    /// category of the current snapshot. The instance category is owned by
    /// the drift pass and is carried over.
    pub async fn publish_sample(&self, mut sampled: MetricsSnapshot) {
        let mut slot = self.snapshot.write().await;
        sampled.instances = slot.instances.clone();
        self.counters.record_sample(sampled.sampled_at);
        *slot = Arc::new(sampled);
        debug!("metrics snapshot published");
    }

    /// Publish the cluster instances observed by a drift pass.
    pub async fn publish_instances(&self, instances: Vec<Instance>) {
        let mut slot = self.snapshot.write().await;
        let mut next = MetricsSnapshot::clone(&slot);
        next.instances = Some(instances);
        *slot = Arc::new(next);
    }

    /// Render the published snapshot and the loop counters in the
    /// Prometheus text format.
    pub async fn render(&self) -> String {
        let snapshot = self.current().await;
        render_prometheus(&snapshot, &self.counters.values())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use driftguard_cloud::{InstanceStatus, LoadBalancer};

    use super::*;
    use crate::snapshot::LoadBalancerReading;

    fn reading(id: &str) -> LoadBalancerReading {
        LoadBalancerReading {
            load_balancer: LoadBalancer {
                id: id.to_string(),
                name: id.to_string(),
                provisioning_status: "ACTIVE".to_string(),
                operating_status: "ONLINE".to_string(),
            },
            stats: None,
        }
    }

    fn instance(id: &str) -> Instance {
        Instance {
            id: id.to_string(),
            name: id.to_string(),
            status: InstanceStatus::Active,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn starts_empty() {
        let registry = MetricsRegistry::new();
        assert!(registry.current().await.is_empty());
    }

    #[tokio::test]
    async fn sample_replaces_categories_and_keeps_instances() {
        let registry = MetricsRegistry::new();
        registry.publish_instances(vec![instance("i-1")]).await;
        registry
            .publish_sample(MetricsSnapshot {
                sampled_at: 10,
                load_balancers: Some(vec![reading("lb-1")]),
                ..Default::default()
            })
            .await;

        let snap = registry.current().await;
        assert_eq!(snap.load_balancers.as_ref().map(Vec::len), Some(1));
        assert_eq!(snap.instances.as_ref().map(Vec::len), Some(1));
        assert_eq!(registry.counters().values().last_sample_timestamp_seconds, 10);

        // A later pass without load balancers leaves none behind.
        registry
            .publish_sample(MetricsSnapshot {
                sampled_at: 20,
                ..Default::default()
            })
            .await;
        let snap = registry.current().await;
        assert!(snap.load_balancers.is_none());
        assert!(snap.instances.is_some());
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot_across_swaps() {
        let registry = MetricsRegistry::new();
        registry
            .publish_sample(MetricsSnapshot {
                sampled_at: 1,
                load_balancers: Some(vec![reading("lb-1"), reading("lb-2")]),
                ..Default::default()
            })
            .await;

        let held = registry.current().await;
        registry
            .publish_sample(MetricsSnapshot {
                sampled_at: 2,
                load_balancers: Some(vec![reading("lb-3")]),
                ..Default::default()
            })
            .await;

        assert_eq!(held.sampled_at, 1);
        assert_eq!(held.load_balancers.as_ref().map(Vec::len), Some(2));
        assert_eq!(registry.current().await.sampled_at, 2);
    }

    #[tokio::test]
    async fn concurrent_readers_see_whole_snapshots() {
        let registry = MetricsRegistry::new();
        let writer = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for n in 1..=50u64 {
                    let lbs = (0..n).map(|i| reading(&format!("lb-{i}"))).collect();
                    registry
                        .publish_sample(MetricsSnapshot {
                            sampled_at: n,
                            load_balancers: Some(lbs),
                            ..Default::default()
                        })
                        .await;
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..200 {
            let snap = registry.current().await;
            let count = snap.load_balancers.as_ref().map_or(0, Vec::len) as u64;
            assert_eq!(count, snap.sampled_at);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }

    #[test]
    fn counters_track_cycles() {
        let counters = LoopCounters::default();
        counters.record_cycle(true, 0);
        counters.record_cycle(false, 1);
        counters.record_cycle(false, 2);
        counters.record_restarts(3);

        let v = counters.values();
        assert_eq!(v.cycles_total, 3);
        assert_eq!(v.cycle_failures_total, 2);
        assert_eq!(v.consecutive_failures, 2);
        assert_eq!(v.instance_restarts_total, 3);
    }
}
