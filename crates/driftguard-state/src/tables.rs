//! redb table definitions for the desired-state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Cluster specs keyed by `{cluster}`.
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

/// Instance groups keyed by `{cluster}/{group}`.
pub const INSTANCE_GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("instance_groups");
