//! Reconciliation error types.

use thiserror::Error;

use driftguard_cloud::CloudError;
use driftguard_converge::ConvergeError;
use driftguard_metrics::MetricsError;
use driftguard_state::StateError;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("state store: {0}")]
    State(#[from] StateError),

    #[error("cloud: {0}")]
    Cloud(#[from] CloudError),

    #[error("convergence: {0}")]
    Converge(#[from] ConvergeError),

    #[error("metrics: {0}")]
    Metrics(#[from] MetricsError),

    #[error("aborting after {failures} consecutive failed cycles (threshold {threshold})")]
    Aborted { failures: u32, threshold: u32 },
}
