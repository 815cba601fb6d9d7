//! Subsystem assembly for `driftd run` and `driftd import`.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use driftguard_cloud::{
    CloudFactory, CloudFuture, CloudProvider, LazyCloud, OpenStackCloud, OpenStackCredentials,
};
use driftguard_converge::{CommandEngine, ConvergenceTrigger};
use driftguard_metrics::{MetricsPipeline, MetricsRegistry};
use driftguard_reconcile::{DriftDetector, Scheduler};
use driftguard_state::{ClusterManifest, ImportSummary, StoreLocation};

use crate::config::{DaemonConfig, ImportArgs, quota_project};

pub async fn run(mut config: DaemonConfig) -> anyhow::Result<()> {
    info!(
        cluster = %config.scheduler.cluster_name,
        store = %config.store,
        "driftd starting"
    );

    // ── Initialize subsystems ──────────────────────────────────

    let store = config
        .store
        .open()
        .with_context(|| format!("opening state store {}", config.store))?;
    info!(store = %config.store, "state store opened");

    let auth_url = config.auth_url.clone();
    let credentials = OpenStackCredentials::from_lookup(|key| {
        if key == "OS_AUTH_URL" {
            Some(auth_url.clone())
        } else {
            std::env::var(key).ok()
        }
    })
    .context("reading cloud credentials")?;
    if config.pipeline.project.is_none() {
        config.pipeline.project = quota_project(
            credentials.project_id.as_deref(),
            credentials.project_name.as_deref(),
        );
    }
    let cloud = Arc::new(LazyCloud::new(openstack_factory(credentials)));

    let engine = CommandEngine::new(&config.converge.program)
        .with_args(config.converge.args.clone())
        .with_apply_flag(config.converge.apply_flag.clone())
        .with_timeout(config.converge.timeout);
    let trigger = ConvergenceTrigger::new(Arc::new(engine));
    info!(program = %config.converge.program.display(), "convergence engine configured");

    let registry = MetricsRegistry::new();
    let pipeline = MetricsPipeline::new(config.pipeline.clone(), registry.clone());
    info!(
        load_balancers = config.pipeline.load_balancers,
        quotas = config.pipeline.quotas,
        "metrics pipeline configured"
    );

    let scheduler = Scheduler::new(
        config.scheduler.clone(),
        Arc::new(store),
        cloud,
        DriftDetector::new(config.detector.clone()),
        trigger,
        pipeline,
        registry.clone(),
    );
    let status = scheduler.status();

    // ── Start HTTP servers ─────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut servers = Vec::new();
    servers.push(
        spawn_server(
            "metrics",
            config.metrics_addr,
            driftguard_api::build_router(registry.clone()),
            shutdown_rx.clone(),
        )
        .await?,
    );
    if let Some(addr) = config.diagnostics_addr {
        servers.push(
            spawn_server(
                "diagnostics",
                addr,
                driftguard_api::build_diagnostics_router(registry, status),
                shutdown_rx.clone(),
            )
            .await?,
        );
    }

    // ── Reconciliation loop ────────────────────────────────────

    let reconcile = scheduler.run(shutdown_rx);
    tokio::pin!(reconcile);

    let finished = tokio::select! {
        result = &mut reconcile => Some(result),
        _ = shutdown_signal() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            reconcile.await
        }
    };

    let _ = shutdown_tx.send(true);
    for server in servers {
        let _ = server.await;
    }

    match result {
        Ok(()) => {
            info!("driftd stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "reconciliation loop aborted");
            Err(e.into())
        }
    }
}

/// Load a cluster manifest into the store named by `args`.
pub fn import(args: &ImportArgs) -> anyhow::Result<ImportSummary> {
    let location: StoreLocation = args
        .state_store
        .parse()
        .with_context(|| format!("invalid state store {:?}", args.state_store))?;
    if location == StoreLocation::Memory {
        warn!("importing into an in-memory store; the data is lost on exit");
    }

    let manifest = ClusterManifest::from_file(&args.file)
        .with_context(|| format!("reading manifest {}", args.file.display()))?;
    let store = location
        .open()
        .with_context(|| format!("opening state store {location}"))?;
    let summary = store.import_manifest(&manifest)?;

    info!(
        cluster = %summary.cluster,
        written = summary.groups_written,
        removed = summary.groups_removed,
        "manifest imported"
    );
    Ok(summary)
}

fn openstack_factory(credentials: OpenStackCredentials) -> CloudFactory {
    Box::new(move || -> CloudFuture {
        let credentials = credentials.clone();
        Box::pin(async move {
            let cloud = OpenStackCloud::connect(credentials).await?;
            Ok(cloud as Arc<dyn CloudProvider>)
        })
    })
}

async fn spawn_server(
    name: &'static str,
    addr: std::net::SocketAddr,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {name} listener on {addr}"))?;
    info!(%addr, server = name, "HTTP server listening");

    Ok(tokio::spawn(async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = served {
            error!(server = name, error = %e, "HTTP server failed");
        }
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use driftguard_state::StateStore;

    use super::*;

    #[test]
    fn import_writes_manifest_into_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("state.redb");
        let manifest_path = dir.path().join("cluster.toml");

        let mut file = std::fs::File::create(&manifest_path).unwrap();
        writeln!(
            file,
            r#"
[cluster]
name = "prod.k8s.local"

[[instance_groups]]
name = "nodes"
min_size = 3
max_size = 5

[[instance_groups]]
name = "master-a"
role = "control_plane"
min_size = 1
max_size = 1
"#
        )
        .unwrap();

        let args = ImportArgs {
            state_store: format!("file://{}", store_path.display()),
            file: manifest_path,
        };
        let summary = import(&args).unwrap();
        assert_eq!(summary.cluster, "prod.k8s.local");
        assert_eq!(summary.groups_written, 2);

        let store = StateStore::open(&store_path).unwrap();
        assert!(store.get_cluster("prod.k8s.local").unwrap().is_some());
        let groups = store.list_instance_groups_for_cluster("prod.k8s.local").unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn import_rejects_remote_store() {
        let args = ImportArgs {
            state_store: "s3://bucket/state".to_string(),
            file: "cluster.toml".into(),
        };
        assert!(import(&args).is_err());
    }

    #[test]
    fn import_reports_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let args = ImportArgs {
            state_store: "memory://".to_string(),
            file: dir.path().join("missing.toml"),
        };
        let err = import(&args).unwrap_err();
        assert!(format!("{err:#}").contains("missing.toml"));
    }
}
