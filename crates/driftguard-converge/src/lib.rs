//! driftguard-converge — convergence trigger and engine adapters.
//!
//! Every cycle asks the engine for a dry-run plan. When drift is confirmed
//! the same target is re-executed in apply mode, after the engine's asset
//! registry has been reset.

pub mod command;
pub mod engine;
pub mod error;
pub mod plan;
pub mod scripted;
pub mod trigger;

pub use command::{CommandEngine, DEFAULT_APPLY_FLAG, DEFAULT_TIMEOUT};
pub use engine::ConvergenceEngine;
pub use error::{ConvergeError, ConvergeResult};
pub use plan::{
    Change, ConvergencePlan, ConvergenceTarget, Creation, ExecutionMode, INSTANCE_KIND, PlanDiff,
    ScaleDirection, Update,
};
pub use scripted::{EngineCall, ScriptedEngine};
pub use trigger::ConvergenceTrigger;
