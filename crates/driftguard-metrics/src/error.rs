//! Metrics pipeline error types.

use thiserror::Error;

pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("no metrics category is enabled")]
    NothingEnabled,

    #[error("every enabled metrics category failed: {0}")]
    AllFailed(String),

    #[error("no project to sample quotas for")]
    NoProject,
}
