//! driftguard-reconcile — the reconciliation control loop.
//!
//! ```text
//! Scheduler (every interval)
//!   ├── LazyCloud::get()              first use builds the session
//!   ├── read_cluster_state()          desired state, re-read each cycle
//!   ├── DriftDetector::detect_drift() census + opportunistic restarts
//!   ├── ConvergenceTrigger::plan()    dry run
//!   ├── ConvergenceTrigger::apply()   only when drift is confirmed
//!   ├── MetricsPipeline::sample()     best effort, never counted
//!   └── FailureGovernor               backoff, abort after threshold
//! ```

pub mod census;
pub mod detector;
pub mod error;
pub mod governor;
pub mod reconciler;

pub use census::{GroupCensus, GroupCount};
pub use detector::{DetectorConfig, DriftBand, DriftDetector, DriftReport, DriftStrategy};
pub use error::{ReconcileError, ReconcileResult};
pub use governor::{BackoffPolicy, FailureGovernor, GovernorState};
pub use reconciler::{CycleOutcome, LoopStatus, Scheduler, SchedulerConfig, SharedStatus};
