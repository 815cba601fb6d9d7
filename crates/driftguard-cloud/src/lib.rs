//! driftguard-cloud — read adapter over the cloud provider.
//!
//! The reconciliation loop never talks to a provider SDK directly. It sees
//! the provider through a handful of capability traits:
//!
//! ```text
//! CloudProvider
//!   ├── InstanceLister      list_instances(filter)
//!   ├── InstanceStarter     start_instance(id)
//!   ├── LoadBalancerReader  load balancers, stats, pools, pool members
//!   └── QuotaReader         compute + block-storage quota per project
//! ```
//!
//! Two implementations ship with the crate: [`OpenStackCloud`], a thin REST
//! client over Keystone, Nova, Octavia and Cinder, and [`InMemoryCloud`], a
//! scriptable double used by tests across the workspace. [`LazyCloud`]
//! defers building the real handle until the first cycle needs it.

pub mod capability;
pub mod error;
pub mod lazy;
pub mod memory;
pub mod openstack;
pub mod types;

pub use capability::{
    BoxFuture, CloudProvider, InstanceLister, InstanceStarter, LoadBalancerReader, QuotaReader,
};
pub use error::{CloudError, CloudResult};
pub use lazy::{CloudFactory, CloudFuture, LazyCloud};
pub use memory::InMemoryCloud;
pub use openstack::{OpenStackCloud, OpenStackCredentials};
pub use types::*;
