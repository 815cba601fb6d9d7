//! Convergence error types.

use thiserror::Error;

pub type ConvergeResult<T> = Result<T, ConvergeError>;

#[derive(Debug, Error)]
pub enum ConvergeError {
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("engine i/o error: {0}")]
    Io(String),

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} did not finish within {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("engine produced invalid plan output: {0}")]
    InvalidOutput(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("engine error: {0}")]
    Engine(String),
}
