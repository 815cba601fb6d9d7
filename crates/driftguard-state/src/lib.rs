//! driftguard-state — the desired-state store for driftguard.
//!
//! Holds cluster specifications and their instance-group definitions.
//! Backed by [redb](https://docs.rs/redb); records are JSON-serialized into
//! `&[u8]` value columns, keyed by cluster name (`{cluster}`) or by a
//! composite key (`{cluster}/{group}`) so that one prefix scan returns every
//! group of a cluster.
//!
//! The reconciliation loop only ever *reads* from the store, through the
//! [`ClusterStateReader`] trait. Writes happen out of band: a TOML
//! [`ClusterManifest`] is imported by `driftd import`.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod location;
pub mod manifest;
pub mod reader;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use location::StoreLocation;
pub use manifest::{ClusterManifest, ImportSummary};
pub use reader::{ClusterState, ClusterStateReader, read_cluster_state};
pub use store::StateStore;
pub use types::*;
