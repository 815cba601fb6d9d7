//! Lazily initialized provider handle.
//!
//! The provider session is created on first use rather than at startup, so
//! a cloud outage at boot shows up as a failed cycle instead of a crash.
//! A failed initialization leaves the handle empty and the next call tries
//! again.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::capability::{BoxFuture, CloudProvider};
use crate::error::CloudResult;

pub type CloudFuture = BoxFuture<'static, CloudResult<Arc<dyn CloudProvider>>>;

/// Builds a provider session.
pub type CloudFactory = Box<dyn Fn() -> CloudFuture + Send + Sync>;

pub struct LazyCloud {
    cell: OnceCell<Arc<dyn CloudProvider>>,
    factory: CloudFactory,
}

impl LazyCloud {
    pub fn new(factory: CloudFactory) -> Self {
        Self {
            cell: OnceCell::new(),
            factory,
        }
    }

    /// A handle that is already initialized with `cloud`.
    pub fn ready(cloud: Arc<dyn CloudProvider>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(cloud)),
            factory: Box::new(|| -> CloudFuture {
                Box::pin(async {
                    Err(crate::error::CloudError::Init(
                        "handle was created ready".to_string(),
                    ))
                })
            }),
        }
    }

    /// Return the provider, initializing it on first call.
    pub async fn get(&self) -> CloudResult<Arc<dyn CloudProvider>> {
        let cloud = self
            .cell
            .get_or_try_init(|| async {
                match (self.factory)().await {
                    Ok(cloud) => {
                        info!("cloud session established");
                        Ok(cloud)
                    }
                    Err(e) => {
                        warn!(error = %e, "cloud session initialization failed");
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(Arc::clone(cloud))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::CloudError;
    use crate::memory::InMemoryCloud;

    fn counting_factory(calls: Arc<AtomicU32>, fail_first: u32) -> CloudFactory {
        Box::new(move || -> CloudFuture {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < fail_first {
                    Err(CloudError::Init("keystone unreachable".to_string()))
                } else {
                    Ok(Arc::new(InMemoryCloud::new()) as Arc<dyn CloudProvider>)
                }
            })
        })
    }

    #[tokio::test]
    async fn initializes_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let lazy = LazyCloud::new(counting_factory(Arc::clone(&calls), 0));
        assert!(!lazy.is_initialized());

        lazy.get().await.unwrap();
        lazy.get().await.unwrap();

        assert!(lazy.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_after_failed_initialization() {
        let calls = Arc::new(AtomicU32::new(0));
        let lazy = LazyCloud::new(counting_factory(Arc::clone(&calls), 1));

        assert!(matches!(lazy.get().await, Err(CloudError::Init(_))));
        assert!(!lazy.is_initialized());

        lazy.get().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ready_handle_never_calls_factory() {
        let lazy = LazyCloud::ready(Arc::new(InMemoryCloud::new()));
        assert!(lazy.is_initialized());
        assert!(lazy.get().await.is_ok());
    }
}
