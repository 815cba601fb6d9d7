//! Daemon integration tests.
//!
//! Assembles the loop the way `driftd run` does, with in-memory doubles for
//! the cloud and the convergence tool, and checks what the HTTP surface
//! reports after each cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use driftguard_api::{build_diagnostics_router, build_router};
use driftguard_cloud::*;
use driftguard_converge::{ConvergenceTrigger, ScriptedEngine};
use driftguard_metrics::{MetricsPipeline, MetricsRegistry, PipelineConfig};
use driftguard_reconcile::*;
use driftguard_state::{ClusterManifest, StateStore};

const MANIFEST: &str = r#"
[cluster]
name = "edge.k8s.local"
region = "RegionOne"

[[instance_groups]]
name = "nodes"
min_size = 2
max_size = 4
"#;

struct Daemon {
    scheduler: Scheduler,
    registry: MetricsRegistry,
    cloud: Arc<InMemoryCloud>,
    engine: Arc<ScriptedEngine>,
}

impl Daemon {
    fn start(cloud: InMemoryCloud, pipeline: PipelineConfig) -> Self {
        let store = StateStore::open_in_memory().unwrap();
        let manifest = ClusterManifest::parse(MANIFEST).unwrap();
        store.import_manifest(&manifest).unwrap();

        let cloud = Arc::new(cloud);
        let engine = Arc::new(ScriptedEngine::new());
        let registry = MetricsRegistry::new();

        let mut config = SchedulerConfig::new("edge.k8s.local");
        config.interval = Duration::from_millis(1);

        let scheduler = Scheduler::new(
            config,
            Arc::new(store),
            Arc::new(LazyCloud::ready(cloud.clone())),
            DriftDetector::default(),
            ConvergenceTrigger::new(engine.clone()),
            MetricsPipeline::new(pipeline, registry.clone()),
            registry.clone(),
        );

        Self {
            scheduler,
            registry,
            cloud,
            engine,
        }
    }

    fn metrics_router(&self) -> Router {
        build_router(self.registry.clone())
    }

    fn diagnostics_router(&self) -> Router {
        build_diagnostics_router(self.registry.clone(), self.scheduler.status())
    }
}

fn node(id: &str, status: InstanceStatus) -> Instance {
    let mut metadata = HashMap::new();
    metadata.insert("k8s".to_string(), "edge.k8s.local".to_string());
    metadata.insert("KopsInstanceGroup".to_string(), "nodes".to_string());
    Instance {
        id: id.to_string(),
        name: id.to_string(),
        status,
        metadata,
    }
}

async fn get_text(router: Router, uri: &str) -> String {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn get_json(router: Router, uri: &str) -> serde_json::Value {
    serde_json::from_str(&get_text(router, uri).await).unwrap()
}

#[tokio::test]
async fn undersized_group_is_converged_and_reported() {
    let cloud = InMemoryCloud::new().with_instance(node("node-1", InstanceStatus::Active));
    let mut daemon = Daemon::start(cloud, PipelineConfig::default());

    daemon.scheduler.tick().await.unwrap();
    assert_eq!(daemon.engine.apply_count(), 1);

    let body = get_text(daemon.metrics_router(), "/metrics").await;
    assert!(body.contains(r#"openstack_instance{name="node-1",id="node-1",status="ACTIVE"} 1"#));
    assert!(body.contains("driftguard_cycles_total 1"));
    assert!(body.contains("driftguard_drift_detected_total 1"));
    assert!(body.contains("driftguard_applies_total 1"));

    let status = get_json(daemon.diagnostics_router(), "/debug/status").await;
    assert_eq!(status["data"]["cluster"], "edge.k8s.local");
    assert_eq!(status["data"]["governor"], "healthy");
    assert_eq!(status["data"]["last_outcome"]["applied"], true);
    assert_eq!(status["data"]["last_outcome"]["direction"], "up");
    assert_eq!(status["data"]["last_outcome"]["group"], "nodes");
}

#[tokio::test]
async fn stopped_node_is_restarted_without_convergence() {
    let cloud = InMemoryCloud::new()
        .with_instance(node("node-1", InstanceStatus::Active))
        .with_instance(node("node-2", InstanceStatus::Stopped));
    let mut daemon = Daemon::start(cloud, PipelineConfig::default());

    daemon.scheduler.tick().await.unwrap();
    assert_eq!(daemon.cloud.start_requests(), vec!["node-2".to_string()]);
    assert_eq!(daemon.engine.apply_count(), 0);

    let body = get_text(daemon.metrics_router(), "/metrics").await;
    assert!(body.contains("driftguard_instance_restarts_total 1"));
    assert!(body.contains("driftguard_applies_total 0"));
}

#[tokio::test]
async fn load_balancers_are_scraped_after_a_successful_cycle() {
    let cloud = InMemoryCloud::new()
        .with_instance(node("node-1", InstanceStatus::Active))
        .with_instance(node("node-2", InstanceStatus::Active))
        .with_load_balancer(
            LoadBalancer {
                id: "lb-1".to_string(),
                name: "ingress".to_string(),
                provisioning_status: "ACTIVE".to_string(),
                operating_status: "ONLINE".to_string(),
            },
            Some(LoadBalancerStats {
                active_connections: 12,
                ..Default::default()
            }),
        );
    let pipeline = PipelineConfig {
        load_balancers: true,
        ..Default::default()
    };
    let mut daemon = Daemon::start(cloud, pipeline);

    daemon.scheduler.tick().await.unwrap();

    let body = get_text(daemon.metrics_router(), "/metrics").await;
    assert!(body.contains(
        r#"openstack_loadbalancer{name="ingress",id="lb-1",provisioning_status="ACTIVE",operating_status="ONLINE"} 1"#
    ));
    assert!(body.contains(r#"load_balancer_active_connections{name="ingress",id="lb-1"} 12"#));

    let snapshot = get_json(daemon.diagnostics_router(), "/debug/snapshot").await;
    assert_eq!(snapshot["data"]["load_balancers"][0]["load_balancer"]["id"], "lb-1");
    assert_eq!(snapshot["data"]["instances"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn load_balancer_series_survive_a_failed_listing() {
    let cloud = InMemoryCloud::new()
        .with_instance(node("node-1", InstanceStatus::Active))
        .with_instance(node("node-2", InstanceStatus::Active))
        .with_load_balancer(
            LoadBalancer {
                id: "lb-1".to_string(),
                name: "ingress".to_string(),
                provisioning_status: "ACTIVE".to_string(),
                operating_status: "ONLINE".to_string(),
            },
            None,
        );
    let pipeline = PipelineConfig {
        load_balancers: true,
        ..Default::default()
    };
    let mut daemon = Daemon::start(cloud, pipeline);

    daemon.scheduler.tick().await.unwrap();
    daemon.cloud.fail_load_balancer_listing(true);
    daemon.scheduler.tick().await.unwrap();

    let body = get_text(daemon.metrics_router(), "/metrics").await;
    assert!(body.contains(r#"openstack_loadbalancer{name="ingress",id="lb-1""#));
    assert!(body.contains("driftguard_metrics_sample_failures_total 0"));
}

#[tokio::test]
async fn repeated_cloud_failures_abort_the_loop() {
    let cloud = InMemoryCloud::new();
    cloud.fail_instance_listing(true);
    let mut daemon = Daemon::start(cloud, PipelineConfig::default());

    for _ in 0..5 {
        daemon.scheduler.tick().await.unwrap();
    }
    let err = daemon.scheduler.tick().await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Aborted {
            failures: 6,
            threshold: 5
        }
    ));

    let body = get_text(daemon.metrics_router(), "/metrics").await;
    assert!(body.contains("driftguard_cycle_failures_total 6"));
    assert!(body.contains("driftguard_consecutive_failures 6"));

    let status = get_json(daemon.diagnostics_router(), "/debug/status").await;
    assert_eq!(status["data"]["governor"], "aborted");
    assert!(status["data"]["last_error"].as_str().unwrap().contains("instance"));
}
