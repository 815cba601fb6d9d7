//! External-command convergence engine.
//!
//! Runs a provisioning tool as a child process. The request is written to
//! the child's stdin as JSON:
//!
//! ```json
//! { "mode": "dry_run", "target": { "cluster": {..}, "instance_groups": [..] }, "assets": [..] }
//! ```
//!
//! Apply invocations append the configured apply flag (`--yes` by default)
//! to the argument list. The tool answers with a JSON `PlanDiff` on stdout;
//! empty output is an empty diff. A non-zero exit is an error carrying the
//! captured stderr.
//!
//! The request is written while stdout and stderr are drained, so a tool
//! that answers before it has read its whole input cannot stall on a full
//! pipe. Every invocation is bounded by a timeout; on expiry the child is
//! killed.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::engine::{BoxFuture, ConvergenceEngine};
use crate::error::{ConvergeError, ConvergeResult};
use crate::plan::{ConvergenceTarget, ExecutionMode, PlanDiff};

pub const DEFAULT_APPLY_FLAG: &str = "--yes";

/// Upper bound on a single plan or apply invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Serialize)]
struct EngineRequest<'a> {
    mode: ExecutionMode,
    target: &'a ConvergenceTarget,
    assets: &'a [String],
}

pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
    apply_flag: String,
    timeout: Duration,
    assets: Mutex<Vec<String>>,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            apply_flag: DEFAULT_APPLY_FLAG.to_string(),
            timeout: DEFAULT_TIMEOUT,
            assets: Mutex::new(Vec::new()),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_apply_flag(mut self, flag: impl Into<String>) -> Self {
        self.apply_flag = flag.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn assets(&self) -> MutexGuard<'_, Vec<String>> {
        self.assets.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run(&self, target: &ConvergenceTarget, mode: ExecutionMode) -> ConvergeResult<PlanDiff> {
        let program = self.program.display().to_string();
        let assets = self.assets().clone();
        let request = serde_json::to_vec(&EngineRequest {
            mode,
            target,
            assets: &assets,
        })
        .map_err(|e| ConvergeError::Serialize(e.to_string()))?;

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if mode == ExecutionMode::Apply {
            command.arg(&self.apply_flag);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %program, ?mode, assets = assets.len(), "invoking convergence engine");
        let mut child = command.spawn().map_err(|e| ConvergeError::Spawn {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take();
        let write_request = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(&request).await,
                None => Ok(()),
            }
        };

        let finished = tokio::time::timeout(self.timeout, async {
            tokio::join!(write_request, child.wait_with_output())
        })
        .await;
        let Ok((written, output)) = finished else {
            warn!(program = %program, timeout_secs = self.timeout.as_secs(), "convergence engine timed out");
            return Err(ConvergeError::Timeout {
                program,
                secs: self.timeout.as_secs(),
            });
        };
        let output = output.map_err(|e| ConvergeError::Io(e.to_string()))?;

        if let Err(e) = &written {
            warn!(program = %program, error = %e, "failed to write engine request");
        }

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if let Err(e) = &written {
                stderr.push_str(&format!(" (request not delivered: {e})"));
            }
            return Err(ConvergeError::CommandFailed {
                program,
                status: output.status.to_string(),
                stderr,
            });
        }

        let diff = parse_diff(&output.stdout)?;
        if let Err(e) = written
            && diff.is_empty()
        {
            return Err(ConvergeError::Io(format!("writing request to {program}: {e}")));
        }
        self.assets().extend(diff.asset_names());
        info!(
            program = %program,
            ?mode,
            creations = diff.creations.len(),
            updates = diff.updates.len(),
            "convergence engine finished"
        );
        Ok(diff)
    }
}

fn parse_diff(stdout: &[u8]) -> ConvergeResult<PlanDiff> {
    let text = String::from_utf8_lossy(stdout);
    if text.trim().is_empty() {
        return Ok(PlanDiff::default());
    }
    serde_json::from_str(text.trim()).map_err(|e| ConvergeError::InvalidOutput(e.to_string()))
}

impl ConvergenceEngine for CommandEngine {
    fn plan<'a>(&'a self, target: &'a ConvergenceTarget) -> BoxFuture<'a, ConvergeResult<PlanDiff>> {
        Box::pin(self.run(target, ExecutionMode::DryRun))
    }

    fn apply<'a>(
        &'a self,
        target: &'a ConvergenceTarget,
    ) -> BoxFuture<'a, ConvergeResult<PlanDiff>> {
        Box::pin(self.run(target, ExecutionMode::Apply))
    }

    fn reset_assets(&self) {
        self.assets().clear();
    }

    fn asset_count(&self) -> usize {
        self.assets().len()
    }
}
