//! Convergence plans and their structured diff.

use serde::{Deserialize, Serialize};

use driftguard_state::{ClusterSpec, InstanceGroup};

/// Resource kind reported for instance creations.
pub const INSTANCE_KIND: &str = "instance";

/// Whether an engine call may mutate the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    DryRun,
    Apply,
}

/// Direction of a capacity correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Up,
    Down,
}

/// What the engine is asked to converge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceTarget {
    pub cluster: ClusterSpec,
    pub instance_groups: Vec<InstanceGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creation {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

/// One typed field change inside an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    GroupCapacity {
        old_min_size: u32,
        new_min_size: u32,
        old_max_size: u32,
        new_max_size: u32,
    },
    Field {
        field: String,
        old: Option<String>,
        new: Option<String>,
    },
}

/// Resources a plan would create or update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDiff {
    #[serde(default)]
    pub creations: Vec<Creation>,
    #[serde(default)]
    pub updates: Vec<Update>,
}

impl PlanDiff {
    pub fn is_empty(&self) -> bool {
        self.creations.is_empty() && self.updates.is_empty()
    }

    /// Names of every resource the plan touches, creations first.
    pub fn asset_names(&self) -> Vec<String> {
        self.creations
            .iter()
            .map(|c| c.name.clone())
            .chain(self.updates.iter().map(|u| u.name.clone()))
            .collect()
    }

    pub fn creates_instances(&self) -> bool {
        self.creations.iter().any(|c| c.kind == INSTANCE_KIND)
    }

    /// Direction implied by the first group-capacity change, if any.
    ///
    /// A raised minimum is an upward correction; any other capacity change
    /// is treated as downward.
    pub fn capacity_direction(&self) -> Option<ScaleDirection> {
        self.updates
            .iter()
            .flat_map(|u| u.changes.iter())
            .find_map(|change| match change {
                Change::GroupCapacity {
                    old_min_size,
                    new_min_size,
                    ..
                } => Some(if new_min_size > old_min_size {
                    ScaleDirection::Up
                } else {
                    ScaleDirection::Down
                }),
                Change::Field { .. } => None,
            })
    }

    /// Direction of the correction this plan carries. Instance creations
    /// take precedence over capacity changes.
    pub fn drift_direction(&self) -> Option<ScaleDirection> {
        if self.creates_instances() {
            Some(ScaleDirection::Up)
        } else {
            self.capacity_direction()
        }
    }
}

/// A plan returned by the convergence engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePlan {
    pub target: ConvergenceTarget,
    pub mode: ExecutionMode,
    pub diff: PlanDiff,
}
