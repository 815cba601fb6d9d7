//! Scripted engine — an in-memory engine that returns a preset diff and
//! records every call.

use std::sync::{Mutex, MutexGuard};

use crate::engine::{BoxFuture, ConvergenceEngine};
use crate::error::{ConvergeError, ConvergeResult};
use crate::plan::{ConvergenceTarget, PlanDiff};

/// A recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Plan { cluster: String },
    /// `assets_before` is the registry size when apply was invoked.
    Apply { cluster: String, assets_before: usize },
    ResetAssets,
}

#[derive(Default)]
struct Inner {
    diff: PlanDiff,
    calls: Vec<EngineCall>,
    assets: Vec<String>,
    fail_plan: Option<String>,
    fail_apply: Option<String>,
}

#[derive(Default)]
pub struct ScriptedEngine {
    inner: Mutex<Inner>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diff(self, diff: PlanDiff) -> Self {
        self.inner().diff = diff;
        self
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_diff(&self, diff: PlanDiff) {
        self.inner().diff = diff;
    }

    /// Make every plan call fail with `reason`; `None` clears the failure.
    pub fn fail_plan(&self, reason: Option<&str>) {
        self.inner().fail_plan = reason.map(str::to_string);
    }

    pub fn fail_apply(&self, reason: Option<&str>) {
        self.inner().fail_apply = reason.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner().calls.clone()
    }

    pub fn apply_count(&self) -> usize {
        self.inner()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::Apply { .. }))
            .count()
    }

    pub fn plan_count(&self) -> usize {
        self.inner()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::Plan { .. }))
            .count()
    }
}

impl ConvergenceEngine for ScriptedEngine {
    fn plan<'a>(&'a self, target: &'a ConvergenceTarget) -> BoxFuture<'a, ConvergeResult<PlanDiff>> {
        let result = {
            let mut inner = self.inner();
            inner.calls.push(EngineCall::Plan {
                cluster: target.cluster.name.clone(),
            });
            if let Some(reason) = inner.fail_plan.clone() {
                Err(ConvergeError::Engine(reason))
            } else {
                let diff = inner.diff.clone();
                inner.assets.extend(diff.asset_names());
                Ok(diff)
            }
        };
        Box::pin(async move { result })
    }

    fn apply<'a>(
        &'a self,
        target: &'a ConvergenceTarget,
    ) -> BoxFuture<'a, ConvergeResult<PlanDiff>> {
        let result = {
            let mut inner = self.inner();
            let assets_before = inner.assets.len();
            inner.calls.push(EngineCall::Apply {
                cluster: target.cluster.name.clone(),
                assets_before,
            });
            if let Some(reason) = inner.fail_apply.clone() {
                Err(ConvergeError::Engine(reason))
            } else {
                let diff = inner.diff.clone();
                inner.assets.extend(diff.asset_names());
                Ok(diff)
            }
        };
        Box::pin(async move { result })
    }

    fn reset_assets(&self) {
        let mut inner = self.inner();
        inner.calls.push(EngineCall::ResetAssets);
        inner.assets.clear();
    }

    fn asset_count(&self) -> usize {
        self.inner().assets.len()
    }
}
