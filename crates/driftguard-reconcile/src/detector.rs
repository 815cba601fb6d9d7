//! Drift detection.
//!
//! Lists the provider's instances, restarts stopped cluster members that
//! are not under maintenance, counts the rest by instance group and
//! compares each group's count with its configured bound.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use driftguard_cloud::{Instance, InstanceFilter, InstanceLister, InstanceStarter, TagKeys};
use driftguard_converge::{PlanDiff, ScaleDirection};
use driftguard_state::{ClusterSpec, InstanceGroup};

use crate::census::GroupCensus;
use crate::error::ReconcileResult;

/// How a group's live count is compared with its bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftBand {
    /// Drift whenever the count differs from `min_size`.
    #[default]
    MinSize,
    /// Drift only when the count leaves `[min_size, max_size]`.
    Range,
}

/// Where the drift decision comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStrategy {
    /// Compare the instance census with the group bounds.
    #[default]
    InstanceCount,
    /// Inspect the dry-run plan for instance creations or capacity changes.
    PlanInspection,
}

impl FromStr for DriftBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min-size" | "min_size" => Ok(Self::MinSize),
            "range" => Ok(Self::Range),
            other => Err(format!("unknown drift band {other:?}")),
        }
    }
}

impl FromStr for DriftStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" | "instance_count" => Ok(Self::InstanceCount),
            "plan" | "plan_inspection" => Ok(Self::PlanInspection),
            other => Err(format!("unknown drift strategy {other:?}")),
        }
    }
}

impl fmt::Display for DriftStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InstanceCount => "count",
            Self::PlanInspection => "plan",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorConfig {
    pub tags: TagKeys,
    pub band: DriftBand,
    pub strategy: DriftStrategy,
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftReport {
    pub needs_convergence: bool,
    pub direction: Option<ScaleDirection>,
    /// Group that triggered the decision under the count strategy.
    pub group: Option<String>,
    pub census: GroupCensus,
    /// Instances a start was requested for, including failed requests.
    pub restarts_requested: Vec<String>,
    pub restart_failures: usize,
    /// Instances tagged with a group that is no longer configured.
    pub stale_instances: Vec<String>,
    /// Cluster instances that carry an instance-group tag.
    #[serde(skip)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, Default)]
pub struct DriftDetector {
    config: DetectorConfig,
}

impl DriftDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Scan the provider and decide whether the cluster has drifted.
    ///
    /// The only mutation is one start request per stopped, non-maintenance
    /// cluster instance. A failed start is logged and does not fail the
    /// pass.
    pub async fn detect_drift<C>(
        &self,
        cloud: &C,
        cluster: &ClusterSpec,
        instance_groups: &[InstanceGroup],
    ) -> ReconcileResult<DriftReport>
    where
        C: InstanceLister + InstanceStarter + ?Sized,
    {
        let tags = &self.config.tags;
        let listed = cloud.list_instances(&InstanceFilter::all()).await?;

        let mut census = GroupCensus::new(instance_groups);
        let mut restarts_requested = Vec::new();
        let mut restart_failures = 0;
        let mut stale_instances = Vec::new();
        let mut instances = Vec::new();

        for instance in listed {
            if instance.cluster(tags) != Some(cluster.name.as_str()) {
                continue;
            }
            let Some(group) = instance.instance_group(tags).map(str::to_string) else {
                continue;
            };

            if instance.is_stopped() && !instance.under_maintenance(tags) {
                restarts_requested.push(instance.id.clone());
                match cloud.start_instance(&instance.id).await {
                    Ok(()) => info!(
                        instance = %instance.name,
                        id = %instance.id,
                        "starting stopped instance"
                    ),
                    Err(e) => {
                        restart_failures += 1;
                        warn!(
                            instance = %instance.name,
                            id = %instance.id,
                            error = %e,
                            "could not start instance"
                        );
                    }
                }
            }

            if !census.record(&group) {
                warn!(
                    instance = %instance.name,
                    group = %group,
                    "instance belongs to an instance group that no longer exists"
                );
                stale_instances.push(instance.id.clone());
            }
            instances.push(instance);
        }

        let decision = decide_by_count(&census, instance_groups, self.config.band);
        let (group, direction) = match decision {
            Some((group, direction)) => (Some(group), Some(direction)),
            None => (None, None),
        };
        if let (Some(group), Some(direction)) = (&group, direction) {
            debug!(cluster = %cluster.name, group = %group, ?direction, "instance count drift");
        }

        Ok(DriftReport {
            needs_convergence: direction.is_some(),
            direction,
            group,
            census,
            restarts_requested,
            restart_failures,
            stale_instances,
            instances,
        })
    }

    /// Replace the count-based decision with one read from the dry-run
    /// plan. A no-op under the count strategy.
    pub fn decide_from_plan(&self, mut report: DriftReport, diff: &PlanDiff) -> DriftReport {
        if self.config.strategy != DriftStrategy::PlanInspection {
            return report;
        }
        report.direction = diff.drift_direction();
        report.needs_convergence = report.direction.is_some();
        report.group = None;
        report
    }
}

/// First group, in store order, whose count falls outside its bound.
fn decide_by_count(
    census: &GroupCensus,
    instance_groups: &[InstanceGroup],
    band: DriftBand,
) -> Option<(String, ScaleDirection)> {
    instance_groups.iter().find_map(|group| {
        let count = census.count(&group.name).unwrap_or(0);
        let direction = match band {
            DriftBand::MinSize if count < group.min_size => Some(ScaleDirection::Up),
            DriftBand::MinSize if count > group.min_size => Some(ScaleDirection::Down),
            DriftBand::Range if count < group.min_size => Some(ScaleDirection::Up),
            DriftBand::Range if count > group.max_size => Some(ScaleDirection::Down),
            _ => None,
        };
        direction.map(|d| (group.name.clone(), d))
    })
}
