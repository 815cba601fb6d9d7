//! driftd — the driftguard daemon.
//!
//! Single binary that assembles the reconciliation loop:
//! - Desired-state store (redb)
//! - Cloud session (OpenStack, built on first use)
//! - Convergence tool (external command)
//! - Drift detector, failure governor and scheduler
//! - Metrics pipeline and `/metrics` endpoint
//! - Loopback diagnostics endpoints
//!
//! # Usage
//!
//! ```text
//! driftd import --state-store /var/lib/driftguard/state.redb --file cluster.toml
//! driftd run --name prod.k8s.local --state-store /var/lib/driftguard/state.redb \
//!     --converge-command /usr/local/bin/converge
//! ```
//!
//! Exits with status 1 when the arguments do not validate or when the
//! loop aborts after too many consecutive failed cycles.

mod config;
mod wiring;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Command, LogFormat};

const DEFAULT_FILTER: &str = "info,driftd=debug,driftguard=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run(args) => {
            let config = args.validate()?;
            wiring::run(config).await
        }
        Command::Import(args) => {
            wiring::import(&args)?;
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
