//! ConvergenceTrigger — builds dry-run plans and, on request, applies them.

use std::sync::Arc;

use tracing::info;

use driftguard_state::{ClusterSpec, InstanceGroup};

use crate::engine::ConvergenceEngine;
use crate::error::ConvergeResult;
use crate::plan::{ConvergencePlan, ConvergenceTarget, ExecutionMode};

pub struct ConvergenceTrigger {
    engine: Arc<dyn ConvergenceEngine>,
}

impl ConvergenceTrigger {
    pub fn new(engine: Arc<dyn ConvergenceEngine>) -> Self {
        Self { engine }
    }

    /// Compute a fresh dry-run plan for the cluster.
    ///
    /// The engine's asset registry is cleared first, so each plan only
    /// carries the assets it registers itself.
    pub async fn plan(
        &self,
        cluster: &ClusterSpec,
        instance_groups: &[InstanceGroup],
    ) -> ConvergeResult<ConvergencePlan> {
        let target = ConvergenceTarget {
            cluster: cluster.clone(),
            instance_groups: instance_groups.to_vec(),
        };
        self.engine.reset_assets();
        let diff = self.engine.plan(&target).await?;
        Ok(ConvergencePlan {
            target,
            mode: ExecutionMode::DryRun,
            diff,
        })
    }

    /// Re-execute `plan` in apply mode.
    ///
    /// The engine's asset registry is cleared first; it is append-only
    /// within a pass and would otherwise carry the dry run's assets into
    /// the apply pass.
    pub async fn apply(&self, plan: &ConvergencePlan) -> ConvergeResult<ConvergencePlan> {
        self.engine.reset_assets();
        let diff = self.engine.apply(&plan.target).await?;
        info!(
            cluster = %plan.target.cluster.name,
            creations = diff.creations.len(),
            updates = diff.updates.len(),
            "convergence applied"
        );
        Ok(ConvergencePlan {
            target: plan.target.clone(),
            mode: ExecutionMode::Apply,
            diff,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::ConvergeError;
    use crate::plan::{Creation, PlanDiff};
    use crate::scripted::{EngineCall, ScriptedEngine};

    fn cluster() -> ClusterSpec {
        ClusterSpec {
            name: "prod".to_string(),
            cloud: "openstack".to_string(),
            region: None,
            project_id: None,
            project_name: None,
            labels: HashMap::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn diff() -> PlanDiff {
        PlanDiff {
            creations: vec![Creation {
                kind: "instance".to_string(),
                name: "nodes-4".to_string(),
            }],
            updates: vec![],
        }
    }

    #[tokio::test]
    async fn plan_is_dry_run() {
        let engine = Arc::new(ScriptedEngine::new().with_diff(diff()));
        let trigger = ConvergenceTrigger::new(engine.clone());

        let plan = trigger.plan(&cluster(), &[]).await.unwrap();
        assert_eq!(plan.mode, ExecutionMode::DryRun);
        assert_eq!(plan.diff, diff());
        assert_eq!(engine.apply_count(), 0);
    }

    #[tokio::test]
    async fn apply_resets_assets_first() {
        let engine = Arc::new(ScriptedEngine::new().with_diff(diff()));
        let trigger = ConvergenceTrigger::new(engine.clone());

        let plan = trigger.plan(&cluster(), &[]).await.unwrap();
        assert_eq!(engine.asset_count(), 1);

        let applied = trigger.apply(&plan).await.unwrap();
        assert_eq!(applied.mode, ExecutionMode::Apply);

        let calls = engine.calls();
        assert_eq!(calls[2], EngineCall::ResetAssets);
        assert_eq!(
            calls[3],
            EngineCall::Apply {
                cluster: "prod".to_string(),
                assets_before: 0
            }
        );
    }

    #[tokio::test]
    async fn repeated_plans_do_not_accumulate_assets() {
        let engine = Arc::new(ScriptedEngine::new().with_diff(diff()));
        let trigger = ConvergenceTrigger::new(engine.clone());

        for _ in 0..10 {
            trigger.plan(&cluster(), &[]).await.unwrap();
        }
        assert_eq!(engine.asset_count(), 1);
        assert_eq!(engine.calls()[0], EngineCall::ResetAssets);
    }

    #[tokio::test]
    async fn engine_errors_propagate() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.fail_plan(Some("tool crashed"));
        let trigger = ConvergenceTrigger::new(engine);

        assert!(matches!(
            trigger.plan(&cluster(), &[]).await,
            Err(ConvergeError::Engine(_))
        ));
    }
}
