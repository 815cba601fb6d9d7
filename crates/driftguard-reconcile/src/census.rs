//! Per-cycle census of live instances by instance group.

use serde::Serialize;

use driftguard_state::InstanceGroup;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub name: String,
    pub count: u32,
}

/// Live instance count per configured group, in store order.
///
/// Built fresh for every cycle with every configured group at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupCensus {
    groups: Vec<GroupCount>,
}

impl GroupCensus {
    pub fn new(groups: &[InstanceGroup]) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|g| GroupCount {
                    name: g.name.clone(),
                    count: 0,
                })
                .collect(),
        }
    }

    /// Count one instance for `group`. Returns false if the group is not
    /// configured.
    pub fn record(&mut self, group: &str) -> bool {
        match self.groups.iter_mut().find(|g| g.name == group) {
            Some(entry) => {
                entry.count += 1;
                true
            }
            None => false,
        }
    }

    pub fn count(&self, group: &str) -> Option<u32> {
        self.groups.iter().find(|g| g.name == group).map(|g| g.count)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupCount> {
        self.groups.iter()
    }

    pub fn total(&self) -> u32 {
        self.groups.iter().map(|g| g.count).sum()
    }
}
