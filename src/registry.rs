//! Named pools, one per backend

use crate::config::{PoolConfiguration, PoolSettings};
use crate::errors::{PoolError, PoolResult};
use crate::handle::PooledHandle;
use crate::pool::ResourcePool;
use crate::resource::{Resource, ResourceFactory};

use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Registry of resource pools keyed by backend name
///
/// A process-wide registry is a `static` initialized on first use. It lives
/// until the process exits; pools are closed only through
/// [`remove`](Self::remove) or [`close_all`](Self::close_all).
///
/// ```
/// use roundpool::{BoxError, PoolConfiguration, PoolRegistry, Resource};
/// use std::sync::LazyLock;
/// use tokio_util::sync::CancellationToken;
///
/// struct Conn;
/// impl Resource for Conn {
///     fn close(&self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// static POOLS: LazyLock<PoolRegistry<Conn>> = LazyLock::new(PoolRegistry::new);
///
/// # #[tokio::main]
/// # async fn main() {
/// POOLS
///     .register(
///         "users",
///         |_cancel: CancellationToken| async { Ok::<_, BoxError>(Conn) },
///         PoolConfiguration::new().with_capacity(2),
///     )
///     .await
///     .unwrap();
///
/// let conn = POOLS.acquire("users", &CancellationToken::new()).await;
/// assert!(conn.is_ok());
/// assert!(POOLS.acquire("orders", &CancellationToken::new()).await.is_err());
/// # }
/// ```
pub struct PoolRegistry<R: Resource> {
    pools: DashMap<String, Arc<ResourcePool<R>>>,
    initialized: OnceCell<()>,
}

impl<R: Resource> PoolRegistry<R> {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            initialized: OnceCell::new(),
        }
    }

    /// Build a pool and store it under `name`, closing any pool it replaces
    pub async fn register<F>(
        &self,
        name: impl Into<String>,
        factory: F,
        config: PoolConfiguration,
    ) -> PoolResult<()>
    where
        F: ResourceFactory<Resource = R>,
    {
        let name = name.into();
        let pool = ResourcePool::new(factory, config).await?;

        if let Some(previous) = self.pools.insert(name.clone(), Arc::new(pool)) {
            previous.close();
            debug!(pool = %name, "replaced registered pool");
        }
        info!(pool = %name, "registered resource pool");
        Ok(())
    }

    /// Register every configured pool, once per registry.
    ///
    /// Concurrent callers wait for the first one to finish. Pools whose
    /// construction fails are logged and skipped. Returns `true` for the call
    /// that performed the initialization.
    pub async fn init_once<F, M>(&self, settings: &HashMap<String, PoolSettings>, make_factory: M) -> bool
    where
        F: ResourceFactory<Resource = R>,
        M: Fn(&str, &PoolSettings) -> F,
    {
        let mut performed = false;
        self.initialized
            .get_or_init(|| async {
                performed = true;
                for (name, entry) in settings {
                    debug!(pool = %name, addr = %entry.addr, size = entry.size, "configuring resource pool");
                    let factory = make_factory(name, entry);
                    if let Err(error) = self.register(name.as_str(), factory, entry.to_configuration()).await {
                        warn!(pool = %name, %error, "skipping resource pool");
                    }
                }
            })
            .await;
        performed
    }

    /// Look up a pool by name
    pub fn get(&self, name: &str) -> Option<Arc<ResourcePool<R>>> {
        self.pools.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Borrow a resource from the pool registered under `name`
    pub async fn acquire(&self, name: &str, cancel: &CancellationToken) -> PoolResult<PooledHandle<R>> {
        let pool = self
            .get(name)
            .ok_or_else(|| PoolError::UnknownPool(name.to_string()))?;
        pool.acquire(cancel).await
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Unregister and close a pool. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        match self.pools.remove(name) {
            Some((_, pool)) => {
                pool.close();
                true
            }
            None => false,
        }
    }

    /// Close every registered pool and empty the registry
    pub fn close_all(&self) {
        for name in self.names() {
            self.remove(&name);
        }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl<R: Resource> Default for PoolRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> fmt::Debug for PoolRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.names())
            .field("initialized", &self.initialized.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Backend, TestConn};
    use std::time::Duration;

    fn config() -> PoolConfiguration {
        PoolConfiguration::new()
            .with_capacity(2)
            .with_eviction_interval(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_register_and_acquire() {
        let registry = PoolRegistry::new();
        registry.register("users", Backend::default(), config()).await.unwrap();
        registry.register("orders", Backend::default(), config()).await.unwrap();

        assert_eq!(registry.names(), vec!["orders".to_string(), "users".to_string()]);
        assert_eq!(registry.get("users").unwrap().capacity(), 2);

        let conn = registry.acquire("orders", &CancellationToken::new()).await.unwrap();
        assert_eq!(conn.use_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_pool() {
        let registry: PoolRegistry<TestConn> = PoolRegistry::default();
        let result = registry.acquire("missing", &CancellationToken::new()).await;
        assert!(matches!(result, Err(PoolError::UnknownPool(name)) if name == "missing"));
    }

    #[tokio::test]
    async fn test_reregister_closes_previous_pool() {
        let registry = PoolRegistry::new();
        let first = Backend::default();
        registry.register("users", first.clone(), config()).await.unwrap();
        let previous = registry.get("users").unwrap();

        registry.register("users", Backend::default(), config()).await.unwrap();
        assert!(previous.is_closed());
        assert_eq!(first.closed_ids(), vec![0, 1]);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_registration_keeps_registry_unchanged() {
        let registry = PoolRegistry::new();
        let result = registry.register("users", Backend::default().failing_after(0), config()).await;

        assert!(matches!(result, Err(PoolError::ConstructionFailed { .. })));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_close_all() {
        let registry = PoolRegistry::new();
        let users = Backend::default();
        let orders = Backend::default();
        registry.register("users", users.clone(), config()).await.unwrap();
        registry.register("orders", orders.clone(), config()).await.unwrap();

        assert!(registry.remove("users"));
        assert!(!registry.remove("users"));
        assert_eq!(users.closed_ids(), vec![0, 1]);

        registry.close_all();
        assert!(registry.is_empty());
        assert_eq!(orders.closed_ids(), vec![0, 1]);
    }

    #[cfg(feature = "serde")]
    #[tokio::test]
    async fn test_init_once_from_settings() {
        let settings: HashMap<String, PoolSettings> = serde_json::from_str(
            r#"{
                "users": {"addr": "10.0.0.1:9000", "size": 3, "max_life": 60},
                "broken": {"addr": "10.0.0.2:9000", "size": 2},
                "orders": {"addr": "10.0.0.3:9000"}
            }"#,
        )
        .unwrap();

        let registry = PoolRegistry::new();
        let make_factory = |name: &str, _: &PoolSettings| {
            let backend = Backend::default();
            if name == "broken" { backend.failing_after(0) } else { backend }
        };

        assert!(registry.init_once(&settings, make_factory).await);
        assert!(!registry.init_once(&settings, make_factory).await);

        assert_eq!(registry.names(), vec!["orders".to_string(), "users".to_string()]);
        assert_eq!(registry.get("users").unwrap().capacity(), 3);
        assert_eq!(registry.get("orders").unwrap().capacity(), 2);
    }
}
