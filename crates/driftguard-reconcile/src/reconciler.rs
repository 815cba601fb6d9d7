//! Scheduler — the reconciliation loop.
//!
//! Each cycle: resolve the cloud handle, read the cluster state, detect
//! drift, build a dry-run plan, apply it when drift is confirmed, then
//! sample metrics. The outcome goes to the failure governor, which decides
//! the next sleep and whether the loop aborts.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

use driftguard_cloud::{CloudProvider, LazyCloud};
use driftguard_converge::{ConvergenceTrigger, ScaleDirection};
use driftguard_metrics::{MetricsPipeline, MetricsRegistry};
use driftguard_state::{ClusterStateReader, read_cluster_state};

use crate::detector::DriftDetector;
use crate::error::{ReconcileError, ReconcileResult};
use crate::governor::{BackoffPolicy, FailureGovernor, GovernorState};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cluster_name: String,
    pub interval: Duration,
    pub failure_threshold: u32,
    pub backoff: BackoffPolicy,
}

impl SchedulerConfig {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            interval: Duration::from_secs(300),
            failure_threshold: FailureGovernor::DEFAULT_THRESHOLD,
            backoff: BackoffPolicy::Fixed,
        }
    }
}

/// What a successful cycle decided and did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub needs_convergence: bool,
    pub direction: Option<ScaleDirection>,
    pub group: Option<String>,
    pub applied: bool,
    pub restarts_requested: usize,
    pub stale_instances: usize,
}

/// Diagnostic view of the loop, served on `/debug/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopStatus {
    pub cluster: String,
    pub governor: GovernorState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub cycles: u64,
    pub last_cycle_at: Option<u64>,
    pub last_success_at: Option<u64>,
    pub last_outcome: Option<CycleOutcome>,
    pub last_error: Option<String>,
    pub next_interval_secs: u64,
}

pub type SharedStatus = Arc<RwLock<LoopStatus>>;

pub struct Scheduler {
    config: SchedulerConfig,
    reader: Arc<dyn ClusterStateReader>,
    cloud: Arc<LazyCloud>,
    detector: DriftDetector,
    trigger: ConvergenceTrigger,
    pipeline: MetricsPipeline,
    registry: MetricsRegistry,
    governor: FailureGovernor,
    status: SharedStatus,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        reader: Arc<dyn ClusterStateReader>,
        cloud: Arc<LazyCloud>,
        detector: DriftDetector,
        trigger: ConvergenceTrigger,
        pipeline: MetricsPipeline,
        registry: MetricsRegistry,
    ) -> Self {
        let governor = FailureGovernor::new(config.failure_threshold, config.interval, config.backoff);
        let status = Arc::new(RwLock::new(LoopStatus {
            cluster: config.cluster_name.clone(),
            governor: governor.state(),
            consecutive_failures: 0,
            failure_threshold: governor.threshold(),
            cycles: 0,
            last_cycle_at: None,
            last_success_at: None,
            last_outcome: None,
            last_error: None,
            next_interval_secs: governor.next_interval().as_secs(),
        }));
        Self {
            config,
            reader,
            cloud,
            detector,
            trigger,
            pipeline,
            registry,
            governor,
            status,
        }
    }

    /// Handle for readers of the loop status.
    pub fn status(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    pub fn governor(&self) -> &FailureGovernor {
        &self.governor
    }

    /// Run until the governor aborts or `shutdown` fires.
    ///
    /// Every cycle is preceded by a sleep of the governor's current
    /// interval, so the first cycle runs one interval after start.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ReconcileResult<()> {
        info!(
            cluster = %self.config.cluster_name,
            interval_secs = self.config.interval.as_secs(),
            threshold = self.config.failure_threshold,
            strategy = %self.detector.config().strategy,
            "reconciliation loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let wait = self.governor.next_interval();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    info!("reconciliation loop shutting down");
                    break;
                }
            }
            self.tick().await?;
        }
        Ok(())
    }

    /// Run one cycle and feed its outcome to the governor.
    ///
    /// Returns `Err(ReconcileError::Aborted)` once the governor aborts;
    /// ordinary cycle failures are absorbed and return `Ok`.
    pub async fn tick(&mut self) -> ReconcileResult<()> {
        if self.governor.is_aborted() {
            return Err(self.aborted());
        }

        let started = epoch_secs();
        let result = self.run_cycle().await;

        let (state, outcome, last_error) = match result {
            Ok((outcome, cloud)) => {
                let state = self.governor.record_success();
                if self.pipeline.is_enabled()
                    && let Err(e) = self.pipeline.sample(&*cloud).await
                {
                    warn!(error = %e, "metrics sample failed");
                }
                (state, Some(outcome), None)
            }
            Err(e) => {
                error!(cluster = %self.config.cluster_name, error = %e, "reconciliation cycle failed");
                (self.governor.record_failure(), None, Some(e.to_string()))
            }
        };

        let success = outcome.is_some();
        self.registry
            .counters()
            .record_cycle(success, self.governor.consecutive_failures());

        {
            let mut status = self.status.write().await;
            status.governor = state;
            status.consecutive_failures = self.governor.consecutive_failures();
            status.cycles += 1;
            status.last_cycle_at = Some(started);
            status.next_interval_secs = self.governor.next_interval().as_secs();
            if success {
                status.last_success_at = Some(started);
                status.last_outcome = outcome;
                status.last_error = None;
            } else {
                status.last_error = last_error;
            }
        }

        if state == GovernorState::Aborted {
            return Err(self.aborted());
        }
        Ok(())
    }

    async fn run_cycle(&self) -> ReconcileResult<(CycleOutcome, Arc<dyn CloudProvider>)> {
        let cloud = self.cloud.get().await?;
        let state = read_cluster_state(self.reader.as_ref(), &self.config.cluster_name)?;

        let report = self
            .detector
            .detect_drift(&*cloud, &state.cluster, &state.instance_groups)
            .await?;
        let counters = self.registry.counters();
        counters.record_restarts(report.restarts_requested.len() as u64);
        self.registry.publish_instances(report.instances.clone()).await;

        let plan = self
            .trigger
            .plan(&state.cluster, &state.instance_groups)
            .await?;
        let report = self.detector.decide_from_plan(report, &plan.diff);

        let mut applied = false;
        if report.needs_convergence {
            counters.record_drift();
            info!(
                cluster = %state.cluster.name,
                group = report.group.as_deref().unwrap_or("-"),
                direction = ?report.direction,
                "drift detected, applying convergence"
            );
            self.trigger.apply(&plan).await?;
            counters.record_apply();
            applied = true;
        } else {
            debug!(cluster = %state.cluster.name, "cluster in sync");
        }

        let outcome = CycleOutcome {
            needs_convergence: report.needs_convergence,
            direction: report.direction,
            group: report.group,
            applied,
            restarts_requested: report.restarts_requested.len(),
            stale_instances: report.stale_instances.len(),
        };
        Ok((outcome, cloud))
    }

    fn aborted(&self) -> ReconcileError {
        ReconcileError::Aborted {
            failures: self.governor.consecutive_failures(),
            threshold: self.governor.threshold(),
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
