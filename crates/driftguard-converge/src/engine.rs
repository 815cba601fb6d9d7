//! The convergence engine seam.

use std::future::Future;
use std::pin::Pin;

use crate::error::ConvergeResult;
use crate::plan::{ConvergenceTarget, PlanDiff};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A provisioning engine that can compute and execute convergence plans.
///
/// Engines keep an asset registry that grows with every `plan` and `apply`
/// call for the lifetime of the process. Callers reset it before an apply
/// so the apply pass sees only its own assets.
pub trait ConvergenceEngine: Send + Sync {
    /// Compute the diff for `target` without mutating anything.
    fn plan<'a>(&'a self, target: &'a ConvergenceTarget) -> BoxFuture<'a, ConvergeResult<PlanDiff>>;

    /// Execute convergence for `target` and return the applied diff.
    fn apply<'a>(&'a self, target: &'a ConvergenceTarget)
    -> BoxFuture<'a, ConvergeResult<PlanDiff>>;

    /// Clear the accumulated asset registry.
    fn reset_assets(&self);

    fn asset_count(&self) -> usize;
}
