//! driftguard-metrics — telemetry for the reconciliation loop.
//!
//! Samples load-balancer, pool-member and quota data from the cloud,
//! publishes it as one immutable snapshot, and renders it together with
//! the loop counters in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! MetricsPipeline
//!   └── sample(cloud) → MetricsSnapshot → MetricsRegistry::publish_sample()
//!
//! MetricsRegistry
//!   ├── current() → Arc<MetricsSnapshot>   ← /debug/snapshot
//!   ├── counters() → LoopCounters          ← Scheduler
//!   └── render() → text/plain               ← /metrics
//! ```

pub mod error;
pub mod pipeline;
pub mod prometheus;
pub mod registry;
pub mod snapshot;

pub use error::{MetricsError, MetricsResult};
pub use pipeline::{MetricsPipeline, PipelineConfig};
pub use prometheus::{CONTENT_TYPE, escape_label_value, render_prometheus};
pub use registry::{CounterValues, LoopCounters, MetricsRegistry};
pub use snapshot::{LoadBalancerReading, MetricsSnapshot, PoolMemberReading, QuotaReading};
