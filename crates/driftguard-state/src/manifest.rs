//! Cluster manifest — the TOML document imported into the state store.
//!
//! ```toml
//! [cluster]
//! name = "prod.k8s.local"
//! cloud = "openstack"
//! region = "RegionOne"
//!
//! [[instance_groups]]
//! name = "workers"
//! role = "node"
//! min_size = 3
//! max_size = 6
//! ```
//!
//! Importing a manifest makes the store match it: the cluster and its
//! groups are upserted, and groups of that cluster that the manifest no
//! longer lists are removed.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{StateError, StateResult};
use crate::store::StateStore;
use crate::types::{ClusterSpec, InstanceGroup, InstanceGroupRole};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterManifest {
    pub cluster: ManifestCluster,
    #[serde(default)]
    pub instance_groups: Vec<ManifestInstanceGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestCluster {
    pub name: String,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    pub region: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestInstanceGroup {
    pub name: String,
    #[serde(default)]
    pub role: InstanceGroupRole,
    pub machine_type: Option<String>,
    pub min_size: u32,
    pub max_size: u32,
}

/// What an import changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub cluster: String,
    pub groups_written: usize,
    pub groups_removed: usize,
}

fn default_cloud() -> String {
    "openstack".to_string()
}

impl ClusterManifest {
    pub fn from_file(path: &Path) -> StateResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StateError::Manifest(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> StateResult<Self> {
        let manifest: ClusterManifest =
            toml::from_str(content).map_err(|e| StateError::Manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> StateResult<()> {
        if self.cluster.name.trim().is_empty() {
            return Err(StateError::Manifest("cluster name is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for group in &self.instance_groups {
            if group.name.trim().is_empty() || group.name.contains('/') {
                return Err(StateError::Manifest(format!(
                    "invalid instance group name {:?}",
                    group.name
                )));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(StateError::Manifest(format!(
                    "duplicate instance group {:?}",
                    group.name
                )));
            }
        }
        Ok(())
    }
}

impl StateStore {
    /// Import a manifest, making the stored cluster match it.
    pub fn import_manifest(&self, manifest: &ClusterManifest) -> StateResult<ImportSummary> {
        let now = epoch_secs();
        let name = manifest.cluster.name.clone();
        let created_at = self
            .get_cluster(&name)?
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        self.put_cluster(&ClusterSpec {
            name: name.clone(),
            cloud: manifest.cluster.cloud.clone(),
            region: manifest.cluster.region.clone(),
            project_id: manifest.cluster.project_id.clone(),
            project_name: manifest.cluster.project_name.clone(),
            labels: manifest.cluster.labels.clone(),
            created_at,
            updated_at: now,
        })?;

        let existing = self.list_instance_groups_for_cluster(&name)?;
        let wanted: HashSet<&str> = manifest
            .instance_groups
            .iter()
            .map(|g| g.name.as_str())
            .collect();

        let mut groups_removed = 0;
        for group in &existing {
            if !wanted.contains(group.name.as_str()) && self.delete_instance_group(&group.table_key())? {
                groups_removed += 1;
            }
        }

        for group in &manifest.instance_groups {
            let created_at = existing
                .iter()
                .find(|g| g.name == group.name)
                .map(|g| g.created_at)
                .unwrap_or(now);
            self.put_instance_group(&InstanceGroup {
                cluster: name.clone(),
                name: group.name.clone(),
                role: group.role,
                machine_type: group.machine_type.clone(),
                min_size: group.min_size,
                max_size: group.max_size,
                created_at,
                updated_at: now,
            })?;
        }

        let summary = ImportSummary {
            cluster: name,
            groups_written: manifest.instance_groups.len(),
            groups_removed,
        };
        info!(
            cluster = %summary.cluster,
            written = summary.groups_written,
            removed = summary.groups_removed,
            "manifest imported"
        );
        Ok(summary)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
