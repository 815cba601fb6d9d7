//! Prometheus text exposition format (0.0.4).
//!
//! Renders the published snapshot and the loop counters for scraping.
//! Categories absent from the snapshot render no samples; their HELP and
//! TYPE lines are still emitted.

use crate::registry::CounterValues;
use crate::snapshot::MetricsSnapshot;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Escape a label value: backslash, double quote and newline.
pub fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} {kind}\n"));
}

fn sample(out: &mut String, name: &str, labels: &[(&str, &str)], value: impl std::fmt::Display) {
    out.push_str(name);
    if !labels.is_empty() {
        let rendered: Vec<String> = labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
            .collect();
        out.push('{');
        out.push_str(&rendered.join(","));
        out.push('}');
    }
    out.push_str(&format!(" {value}\n"));
}

/// Render the snapshot and counters into Prometheus text format.
pub fn render_prometheus(snapshot: &MetricsSnapshot, counters: &CounterValues) -> String {
    let mut out = String::new();

    render_instances(&mut out, snapshot);
    render_load_balancers(&mut out, snapshot);
    render_pool_members(&mut out, snapshot);
    render_quotas(&mut out, snapshot);
    render_counters(&mut out, counters);

    out
}

fn render_instances(out: &mut String, snapshot: &MetricsSnapshot) {
    header(out, "openstack_instance", "Openstack instance", "gauge");
    for i in snapshot.instances.iter().flatten() {
        sample(
            out,
            "openstack_instance",
            &[("name", i.name.as_str()), ("id", i.id.as_str()), ("status", i.status.as_str())],
            1,
        );
    }
}

fn render_load_balancers(out: &mut String, snapshot: &MetricsSnapshot) {
    let readings = snapshot.load_balancers.as_deref().unwrap_or_default();

    header(out, "openstack_loadbalancer", "Shows the OpenStack loadbalancers", "gauge");
    for r in readings {
        let lb = &r.load_balancer;
        sample(
            out,
            "openstack_loadbalancer",
            &[
                ("name", lb.name.as_str()),
                ("id", lb.id.as_str()),
                ("provisioning_status", lb.provisioning_status.as_str()),
                ("operating_status", lb.operating_status.as_str()),
            ],
            1,
        );
    }

    let stats: [(&str, &str, fn(&driftguard_cloud::LoadBalancerStats) -> u64); 5] = [
        (
            "load_balancer_active_connections",
            "Load balancer active connections",
            |s| s.active_connections,
        ),
        ("load_balancer_bytes_in", "Load balancer bytes in", |s| s.bytes_in),
        ("load_balancer_bytes_out", "Load balancer bytes out", |s| s.bytes_out),
        (
            "load_balancer_request_errors",
            "Load balancer request errors",
            |s| s.request_errors,
        ),
        (
            "load_balancer_total_connections",
            "Load balancer total connections",
            |s| s.total_connections,
        ),
    ];
    for (name, help, value) in stats {
        header(out, name, help, "gauge");
        for r in readings {
            if let Some(s) = &r.stats {
                let lb = &r.load_balancer;
                sample(out, name, &[("name", lb.name.as_str()), ("id", lb.id.as_str())], value(s));
            }
        }
    }
}

fn render_pool_members(out: &mut String, snapshot: &MetricsSnapshot) {
    header(out, "load_balancer_pool_member", "Load balancer pool member", "gauge");
    for r in snapshot.pool_members.iter().flatten() {
        let weight = r.member.weight.to_string();
        sample(
            out,
            "load_balancer_pool_member",
            &[
                ("name", r.member.name.as_str()),
                ("id", r.member.id.as_str()),
                ("pool_name", r.pool_name.as_str()),
                ("pool_id", r.pool_id.as_str()),
                ("load_balancer_id", r.load_balancer_id.as_str()),
                ("provisioning_status", r.member.provisioning_status.as_str()),
                ("operating_status", r.member.operating_status.as_str()),
                ("weight", weight.as_str()),
            ],
            1,
        );
    }
}

fn render_quotas(out: &mut String, snapshot: &MetricsSnapshot) {
    let quotas = snapshot.quotas.as_ref();
    let compute = quotas.and_then(|q| q.compute);
    let volume = quotas.and_then(|q| q.volume);
    let labels: Vec<(&str, &str)> = quotas
        .map(|q| {
            vec![
                ("project_id", q.project.id.as_str()),
                ("project_name", q.project.name.as_str()),
            ]
        })
        .unwrap_or_default();

    let lines = [
        ("ram", "RAM", compute.map(|c| c.ram)),
        ("security_groups", "security groups", compute.map(|c| c.security_groups)),
        ("cores", "cores", compute.map(|c| c.cores)),
        ("instances", "instances", compute.map(|c| c.instances)),
        ("server_groups", "server groups", compute.map(|c| c.server_groups)),
    ]
    .map(|(resource, what, usage)| {
        (resource, what, usage.map(|u| (u.compute_used(), u.limit)))
    });
    let volume_lines = [
        ("volumes", "volumes", volume.map(|v| v.volumes)),
        ("volume_gigabytes", "volume gigabytes", volume.map(|v| v.gigabytes)),
    ]
    .map(|(resource, what, usage)| {
        (resource, what, usage.map(|u| (u.volume_used(), u.limit)))
    });

    for (resource, what, usage) in lines.into_iter().chain(volume_lines) {
        let used = format!("openstack_{resource}_used");
        let quota = format!("openstack_{resource}_quota");
        header(out, &used, &format!("Openstack {what} used"), "gauge");
        if let Some((consumed, _)) = usage {
            sample(out, &used, &labels, consumed);
        }
        header(out, &quota, &format!("Openstack {what} quota"), "gauge");
        if let Some((_, limit)) = usage {
            sample(out, &quota, &labels, limit);
        }
    }
}

fn render_counters(out: &mut String, c: &CounterValues) {
    let counters = [
        ("driftguard_cycles_total", "Reconciliation cycles run.", "counter", c.cycles_total),
        (
            "driftguard_cycle_failures_total",
            "Reconciliation cycles that ended in an error.",
            "counter",
            c.cycle_failures_total,
        ),
        (
            "driftguard_consecutive_failures",
            "Current run of consecutive failed cycles.",
            "gauge",
            c.consecutive_failures,
        ),
        (
            "driftguard_drift_detected_total",
            "Cycles that detected drift.",
            "counter",
            c.drift_detected_total,
        ),
        (
            "driftguard_applies_total",
            "Convergence passes applied.",
            "counter",
            c.applies_total,
        ),
        (
            "driftguard_instance_restarts_total",
            "Start requests issued for stopped instances.",
            "counter",
            c.instance_restarts_total,
        ),
        (
            "driftguard_metrics_sample_failures_total",
            "Metrics sampling passes that published nothing.",
            "counter",
            c.metrics_sample_failures_total,
        ),
        (
            "driftguard_last_sample_timestamp_seconds",
            "Unix time of the last published metrics sample.",
            "gauge",
            c.last_sample_timestamp_seconds,
        ),
    ];
    for (name, help, kind, value) in counters {
        header(out, name, help, kind);
        sample(out, name, &[], value);
    }
}
