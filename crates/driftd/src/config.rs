//! Command-line surface and validation.
//!
//! Every `run` flag also reads an environment variable so the daemon can be
//! configured entirely from a container spec. `validate` turns the raw
//! arguments into a [`DaemonConfig`]; any error there ends the process with
//! status 1 before the loop starts.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};

use driftguard_cloud::{Project, TagKeys};
use driftguard_converge::{DEFAULT_APPLY_FLAG, DEFAULT_TIMEOUT};
use driftguard_metrics::PipelineConfig;
use driftguard_reconcile::{
    BackoffPolicy, DetectorConfig, DriftBand, DriftStrategy, SchedulerConfig,
};
use driftguard_state::StoreLocation;

#[derive(Parser, Debug)]
#[command(name = "driftd", about = "driftguard reconciliation daemon", version)]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, env = "DRIFTGUARD_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the reconciliation loop.
    Run(RunArgs),
    /// Load a cluster manifest into the state store.
    Import(ImportArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Seconds between reconciliation cycles.
    #[arg(long, env = "DRIFTGUARD_SLEEP", default_value_t = 300)]
    pub sleep: u64,

    /// Desired-state store location (`memory://`, `file:///path`, or a path).
    #[arg(long, env = "DRIFTGUARD_STATE_STORE")]
    pub state_store: Option<String>,

    /// Name of the cluster to reconcile.
    #[arg(long, env = "DRIFTGUARD_CLUSTER_NAME")]
    pub name: Option<String>,

    /// Sample load balancers and pool members.
    #[arg(long, env = "DRIFTGUARD_LOAD_BALANCER_METRICS")]
    pub load_balancer_metrics: bool,

    /// Sample compute and block-storage quotas.
    #[arg(long, env = "DRIFTGUARD_QUOTA_METRICS")]
    pub quota_metrics: bool,

    /// Consecutive failed cycles tolerated before the loop aborts.
    #[arg(long, env = "DRIFTGUARD_FAILURE_THRESHOLD", default_value_t = 5)]
    pub failure_threshold: u32,

    #[arg(long, env = "DRIFTGUARD_BACKOFF", value_enum, default_value = "fixed")]
    pub backoff: BackoffKind,

    /// Upper bound on the exponential backoff, in seconds.
    #[arg(long, env = "DRIFTGUARD_MAX_BACKOFF", default_value_t = 3600)]
    pub max_backoff: u64,

    /// Drift signal: `count` (instance census) or `plan` (dry-run diff).
    #[arg(long, env = "DRIFTGUARD_DRIFT_STRATEGY", default_value = "count")]
    pub drift_strategy: DriftStrategy,

    /// Bound a group's count is checked against: `min-size` or `range`.
    #[arg(long, env = "DRIFTGUARD_DRIFT_BAND", default_value = "min-size")]
    pub drift_band: DriftBand,

    /// Instance metadata key naming the owning cluster.
    #[arg(long, env = "DRIFTGUARD_CLUSTER_TAG", default_value = "k8s")]
    pub cluster_tag: String,

    /// Instance metadata key naming the owning instance group.
    #[arg(long, env = "DRIFTGUARD_GROUP_TAG", default_value = "KopsInstanceGroup")]
    pub group_tag: String,

    /// Instance metadata key that suppresses restarts when set to `true`.
    #[arg(long, env = "DRIFTGUARD_MAINTENANCE_TAG", default_value = "maintenance")]
    pub maintenance_tag: String,

    /// Convergence tool invoked for plan and apply.
    #[arg(long, env = "DRIFTGUARD_CONVERGE_COMMAND")]
    pub converge_command: Option<PathBuf>,

    /// Extra argument passed to the convergence tool (repeatable).
    #[arg(long = "converge-arg", allow_hyphen_values = true)]
    pub converge_args: Vec<String>,

    /// Flag appended to the convergence tool's arguments when applying.
    #[arg(
        long,
        env = "DRIFTGUARD_APPLY_FLAG",
        default_value = DEFAULT_APPLY_FLAG,
        allow_hyphen_values = true
    )]
    pub apply_flag: String,

    /// Seconds a single plan or apply may run before the tool is killed.
    #[arg(long, env = "DRIFTGUARD_CONVERGE_TIMEOUT", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub converge_timeout: u64,

    /// Listen address of the `/metrics` endpoint.
    #[arg(long, env = "DRIFTGUARD_METRICS_ADDR", default_value = "0.0.0.0:2112")]
    pub metrics_addr: SocketAddr,

    /// Listen address of the diagnostics endpoints; must be loopback.
    #[arg(long, env = "DRIFTGUARD_DIAGNOSTICS_ADDR", default_value = "127.0.0.1:6060")]
    pub diagnostics_addr: SocketAddr,

    /// Do not serve the diagnostics endpoints.
    #[arg(long, env = "DRIFTGUARD_NO_DIAGNOSTICS")]
    pub no_diagnostics: bool,

    /// Keystone identity endpoint.
    #[arg(long, env = "OS_AUTH_URL")]
    pub auth_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Desired-state store location.
    #[arg(long, env = "DRIFTGUARD_STATE_STORE")]
    pub state_store: String,

    /// Cluster manifest (TOML).
    #[arg(long)]
    pub file: PathBuf,
}

/// Convergence tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergeCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub apply_flag: String,
    pub timeout: Duration,
}

/// Validated daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub store: StoreLocation,
    pub scheduler: SchedulerConfig,
    pub detector: DetectorConfig,
    pub pipeline: PipelineConfig,
    pub converge: ConvergeCommand,
    pub auth_url: String,
    pub metrics_addr: SocketAddr,
    pub diagnostics_addr: Option<SocketAddr>,
}

impl RunArgs {
    pub fn validate(&self) -> anyhow::Result<DaemonConfig> {
        let name = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => bail!("cluster name is required (--name or DRIFTGUARD_CLUSTER_NAME)"),
        };

        let store: StoreLocation = match self.state_store.as_deref().map(str::trim) {
            Some(loc) if !loc.is_empty() => loc
                .parse()
                .with_context(|| format!("invalid state store {loc:?}"))?,
            _ => bail!("state store is required (--state-store or DRIFTGUARD_STATE_STORE)"),
        };

        let auth_url = match self.auth_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => bail!("cloud endpoint is required (--auth-url or OS_AUTH_URL)"),
        };

        if self.failure_threshold == 0 {
            bail!("--failure-threshold must be at least 1");
        }
        if self.sleep == 0 {
            bail!("--sleep must be at least 1 second");
        }
        if self.converge_timeout == 0 {
            bail!("--converge-timeout must be at least 1 second");
        }

        let diagnostics_addr = if self.no_diagnostics {
            None
        } else {
            if !self.diagnostics_addr.ip().is_loopback() {
                bail!(
                    "diagnostics address {} is not a loopback address",
                    self.diagnostics_addr
                );
            }
            Some(self.diagnostics_addr)
        };

        let Some(program) = self.converge_command.clone() else {
            bail!("convergence command is required (--converge-command or DRIFTGUARD_CONVERGE_COMMAND)");
        };

        let backoff = match self.backoff {
            BackoffKind::Fixed => BackoffPolicy::Fixed,
            BackoffKind::Exponential => BackoffPolicy::Exponential {
                max: Duration::from_secs(self.max_backoff.max(self.sleep)),
            },
        };

        let mut scheduler = SchedulerConfig::new(name);
        scheduler.interval = Duration::from_secs(self.sleep);
        scheduler.failure_threshold = self.failure_threshold;
        scheduler.backoff = backoff;

        Ok(DaemonConfig {
            store,
            scheduler,
            detector: DetectorConfig {
                tags: TagKeys {
                    cluster: self.cluster_tag.clone(),
                    instance_group: self.group_tag.clone(),
                    maintenance: self.maintenance_tag.clone(),
                },
                band: self.drift_band,
                strategy: self.drift_strategy,
            },
            pipeline: PipelineConfig {
                load_balancers: self.load_balancer_metrics,
                quotas: self.quota_metrics,
                project: None,
            },
            converge: ConvergeCommand {
                program,
                args: self.converge_args.clone(),
                apply_flag: self.apply_flag.clone(),
                timeout: Duration::from_secs(self.converge_timeout),
            },
            auth_url,
            metrics_addr: self.metrics_addr,
            diagnostics_addr,
        })
    }
}

/// Quota project pinned by the credentials, when both id and name are known.
pub fn quota_project(project_id: Option<&str>, project_name: Option<&str>) -> Option<Project> {
    match (project_id, project_name) {
        (Some(id), Some(name)) => Some(Project {
            id: id.to_string(),
            name: name.to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["driftd", "run"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Run(args) => args,
            Command::Import(_) => panic!("expected run"),
        }
    }

    const VALID: &[&str] = &[
        "--name",
        "prod.k8s.local",
        "--state-store",
        "memory://",
        "--auth-url",
        "https://keystone.example.com:5000",
        "--converge-command",
        "/usr/local/bin/converge",
    ];

    fn without(flag: &str) -> Vec<&'static str> {
        let mut out = Vec::new();
        let mut iter = VALID.iter();
        while let Some(arg) = iter.next() {
            if *arg == flag {
                iter.next();
                continue;
            }
            out.push(*arg);
        }
        out
    }

    #[test]
    fn valid_arguments_produce_config() {
        let config = parse(VALID).validate().unwrap();
        assert_eq!(config.scheduler.cluster_name, "prod.k8s.local");
        assert_eq!(config.scheduler.interval, Duration::from_secs(300));
        assert_eq!(config.scheduler.failure_threshold, 5);
        assert_eq!(config.scheduler.backoff, BackoffPolicy::Fixed);
        assert_eq!(config.store, StoreLocation::Memory);
        assert_eq!(config.detector.strategy, DriftStrategy::InstanceCount);
        assert_eq!(config.detector.band, DriftBand::MinSize);
        assert_eq!(config.detector.tags, TagKeys::default());
        assert!(!config.pipeline.is_enabled());
        assert_eq!(config.converge.apply_flag, "--yes");
        assert_eq!(config.converge.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.metrics_addr, "0.0.0.0:2112".parse().unwrap());
        assert_eq!(config.diagnostics_addr, Some("127.0.0.1:6060".parse().unwrap()));
    }

    #[test]
    fn missing_cluster_name_is_rejected() {
        let err = parse(&without("--name")).validate().unwrap_err();
        assert!(err.to_string().contains("cluster name"));
    }

    #[test]
    fn missing_state_store_is_rejected() {
        let err = parse(&without("--state-store")).validate().unwrap_err();
        assert!(err.to_string().contains("state store"));
    }

    #[test]
    fn remote_state_store_is_rejected() {
        let mut args = without("--state-store");
        args.extend_from_slice(&["--state-store", "s3://bucket/state"]);
        assert!(parse(&args).validate().is_err());
    }

    #[test]
    fn missing_auth_url_is_rejected() {
        let err = parse(&without("--auth-url")).validate().unwrap_err();
        assert!(err.to_string().contains("OS_AUTH_URL"));
    }

    #[test]
    fn missing_converge_command_is_rejected() {
        assert!(parse(&without("--converge-command")).validate().is_err());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let mut args = VALID.to_vec();
        args.extend_from_slice(&["--failure-threshold", "0"]);
        assert!(parse(&args).validate().is_err());
    }

    #[test]
    fn non_loopback_diagnostics_is_rejected() {
        let mut args = VALID.to_vec();
        args.extend_from_slice(&["--diagnostics-addr", "0.0.0.0:6060"]);
        let err = parse(&args).validate().unwrap_err();
        assert!(err.to_string().contains("loopback"));
    }

    #[test]
    fn non_loopback_diagnostics_allowed_when_disabled() {
        let mut args = VALID.to_vec();
        args.extend_from_slice(&["--diagnostics-addr", "0.0.0.0:6060", "--no-diagnostics"]);
        let config = parse(&args).validate().unwrap();
        assert_eq!(config.diagnostics_addr, None);
    }

    #[test]
    fn tuning_flags_are_applied() {
        let mut args = VALID.to_vec();
        args.extend_from_slice(&[
            "--sleep",
            "60",
            "--backoff",
            "exponential",
            "--max-backoff",
            "900",
            "--drift-strategy",
            "plan",
            "--drift-band",
            "range",
            "--load-balancer-metrics",
            "--quota-metrics",
            "--converge-arg",
            "--cluster-dir=/etc/clusters",
            "--converge-arg",
            "--verbose",
            "--apply-flag",
            "--force",
            "--converge-timeout",
            "600",
        ]);
        let config = parse(&args).validate().unwrap();
        assert_eq!(config.scheduler.interval, Duration::from_secs(60));
        assert_eq!(
            config.scheduler.backoff,
            BackoffPolicy::Exponential {
                max: Duration::from_secs(900)
            }
        );
        assert_eq!(config.detector.strategy, DriftStrategy::PlanInspection);
        assert_eq!(config.detector.band, DriftBand::Range);
        assert!(config.pipeline.load_balancers);
        assert!(config.pipeline.quotas);
        assert_eq!(
            config.converge.args,
            vec!["--cluster-dir=/etc/clusters".to_string(), "--verbose".to_string()]
        );
        assert_eq!(config.converge.apply_flag, "--force");
        assert_eq!(config.converge.timeout, Duration::from_secs(600));
    }

    #[test]
    fn zero_converge_timeout_is_rejected() {
        let mut args = VALID.to_vec();
        args.extend_from_slice(&["--converge-timeout", "0"]);
        assert!(parse(&args).validate().is_err());
    }

    #[test]
    fn unknown_drift_strategy_fails_parsing() {
        let mut argv = vec!["driftd", "run"];
        argv.extend_from_slice(VALID);
        argv.extend_from_slice(&["--drift-strategy", "guess"]);
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn quota_project_needs_id_and_name() {
        assert_eq!(
            quota_project(Some("p-1"), Some("ops")),
            Some(Project {
                id: "p-1".to_string(),
                name: "ops".to_string()
            })
        );
        assert_eq!(quota_project(Some("p-1"), None), None);
        assert_eq!(quota_project(None, Some("ops")), None);
    }
}
