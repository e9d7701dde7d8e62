//! Round-robin resource pool

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{self, EvictionPolicy};
use crate::handle::{ManagedHandle, PooledHandle};
use crate::health::{HealthStatus, HealthTracker};
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::queue::LockFreeQueue;
use crate::resource::{Resource, ResourceFactory};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering, fence};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// State shared between the pool, its handles and the eviction task.
pub(crate) struct PoolShared<R: Resource> {
    pub(crate) handles: LockFreeQueue<Arc<ManagedHandle<R>>>,
    pub(crate) factory: Arc<dyn ResourceFactory<Resource = R>>,
    pub(crate) config: PoolConfiguration,
    pub(crate) policy: EvictionPolicy,
    pub(crate) health: HealthTracker,
    pub(crate) metrics: MetricsTracker,
    /// Token handed to the factory for replacements. Child of the base token,
    /// cancelled on close.
    pub(crate) dial: CancellationToken,
    pub(crate) shutdown: CancellationToken,
    closed: AtomicBool,
    next_id: AtomicU64,
}

impl<R: Resource> PoolShared<R> {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn new_handle(self: &Arc<Self>, resource: R) -> Arc<ManagedHandle<R>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(ManagedHandle::new(id, resource, Arc::downgrade(self)))
    }

    /// Put a handle back at the tail. Returns `false` if the pool closed in
    /// the meantime, in which case the handle has already been closed.
    pub(crate) fn requeue(&self, handle: Arc<ManagedHandle<R>>) -> bool {
        self.handles.enqueue(handle);
        // Pairs with the fence in `close`: either this load sees the flag or
        // the closing drain sees the handle.
        fence(Ordering::SeqCst);
        if self.is_closed() {
            self.drain();
            return false;
        }
        true
    }

    /// Close every queued resource. Each dequeue is exclusive, so no resource
    /// is closed twice even when several threads drain at once.
    fn drain(&self) -> usize {
        let mut drained = 0;
        while let Some(handle) = self.handles.dequeue() {
            handle.close_resource();
            drained += 1;
        }
        drained
    }
}

/// Fixed-capacity pool of shared network client resources
///
/// Every acquisition takes the next resource from a lock-free queue and puts
/// it straight back at the tail, so callers are spread round-robin over all
/// healthy resources. Resources whose age or use budget runs out are marked
/// unhealthy on release and replaced by a background task once idle.
///
/// # Examples
///
/// ```
/// use roundpool::{BoxError, PoolConfiguration, Resource, ResourcePool};
/// use tokio_util::sync::CancellationToken;
///
/// struct Conn(&'static str);
/// impl Resource for Conn {
///     fn close(&self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() {
/// let pool = ResourcePool::new(
///     |_cancel: CancellationToken| async { Ok::<_, BoxError>(Conn("users:9000")) },
///     PoolConfiguration::new().with_capacity(4),
/// )
/// .await
/// .unwrap();
///
/// {
///     let conn = pool.acquire(&CancellationToken::new()).await.unwrap();
///     assert_eq!(conn.0, "users:9000");
///     // Released when `conn` goes out of scope
/// }
///
/// pool.close();
/// assert_eq!(pool.capacity(), 0);
/// # }
/// ```
pub struct ResourcePool<R: Resource> {
    pub(crate) shared: Arc<PoolShared<R>>,
}

impl<R: Resource> ResourcePool<R> {
    /// Build a pool and fill it with `capacity` resources.
    ///
    /// Must be called inside a Tokio runtime; the eviction task is spawned on it.
    pub async fn new<F>(factory: F, config: PoolConfiguration) -> PoolResult<Self>
    where
        F: ResourceFactory<Resource = R>,
    {
        Self::with_cancellation(CancellationToken::new(), factory, config).await
    }

    /// Like [`new`](Self::new), with a base token passed to every factory call.
    ///
    /// Cancelling `base` makes in-flight and later replacement dials give up;
    /// it does not close the pool. Closing the pool cancels replacement dials
    /// but never `base` itself.
    pub async fn with_cancellation<F>(
        base: CancellationToken,
        factory: F,
        config: PoolConfiguration,
    ) -> PoolResult<Self>
    where
        F: ResourceFactory<Resource = R>,
    {
        let config = config.normalized();
        let capacity = config.capacity;
        let factory: Arc<dyn ResourceFactory<Resource = R>> = Arc::new(factory);

        let mut resources = Vec::with_capacity(capacity);
        for index in 0..capacity {
            match factory.create(&base).await {
                Ok(resource) => resources.push(resource),
                Err(source) => {
                    for resource in &resources {
                        if let Err(error) = resource.close() {
                            warn!(%error, "failed to close resource of abandoned pool");
                        }
                    }
                    return Err(PoolError::ConstructionFailed {
                        index,
                        capacity,
                        source,
                    });
                }
            }
        }

        let shutdown = CancellationToken::new();
        let shared = Arc::new_cyclic(|pool| {
            let handles = LockFreeQueue::new();
            for (id, resource) in resources.into_iter().enumerate() {
                handles.enqueue(Arc::new(ManagedHandle::new(id as u64, resource, pool.clone())));
            }

            PoolShared {
                handles,
                factory,
                policy: EvictionPolicy::from_configuration(&config),
                health: HealthTracker::new(capacity),
                metrics: MetricsTracker::new(),
                dial: base.child_token(),
                shutdown: shutdown.clone(),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(capacity as u64),
                config,
            }
        });

        tokio::spawn(eviction::run_eviction_task(
            Arc::downgrade(&shared),
            shared.config.eviction_interval,
            shutdown,
        ));

        info!(
            capacity,
            max_life_secs = shared.config.max_life_duration.as_secs(),
            max_use_count = shared.config.max_use_count,
            "resource pool ready"
        );

        Ok(Self { shared })
    }

    /// Borrow a healthy resource.
    ///
    /// Spins over the queue, skipping unhealthy resources and yielding to the
    /// scheduler between misses, until a healthy resource turns up. Fails with
    /// [`PoolError::Closed`] once the pool is closed and with
    /// [`PoolError::Timeout`] once `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> PoolResult<PooledHandle<R>> {
        let shared = &self.shared;
        loop {
            if shared.is_closed() {
                return Err(PoolError::Closed);
            }
            if cancel.is_cancelled() {
                MetricsTracker::record(&shared.metrics.acquire_timeouts);
                return Err(PoolError::Timeout);
            }

            if let Some(handle) = shared.handles.dequeue() {
                if !shared.requeue(Arc::clone(&handle)) {
                    return Err(PoolError::Closed);
                }
                if handle.try_borrow() {
                    MetricsTracker::record(&shared.metrics.total_acquired);
                    return Ok(PooledHandle::new(handle));
                }
            }

            tokio::task::yield_now().await;
        }
    }

    /// Borrow a healthy resource, giving up after `timeout`
    pub async fn acquire_timeout(&self, timeout: Duration) -> PoolResult<PooledHandle<R>> {
        let cancel = CancellationToken::new();
        match tokio::time::timeout(timeout, self.acquire(&cancel)).await {
            Ok(result) => result,
            Err(_) => {
                MetricsTracker::record(&self.shared.metrics.acquire_timeouts);
                Err(PoolError::Timeout)
            }
        }
    }

    /// Close the pool and every pooled resource. Later calls do nothing.
    ///
    /// Resources still borrowed are closed as well; their guards stay valid
    /// but the connection behind them is gone.
    pub fn close(&self) {
        if self
            .shared
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        fence(Ordering::SeqCst);

        self.shared.shutdown.cancel();
        self.shared.dial.cancel();
        let drained = self.shared.drain();
        info!(drained, "resource pool closed");
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Configured capacity, or 0 once closed
    pub fn capacity(&self) -> usize {
        if self.is_closed() {
            0
        } else {
            self.shared.config.capacity
        }
    }

    /// Resources currently in rotation
    pub fn queued(&self) -> usize {
        self.shared.handles.len()
    }

    /// Get health status
    pub fn health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.shared.config.capacity,
            self.shared.health.unhealthy(),
            self.queued(),
            self.is_closed(),
        )
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        self.shared.metrics.get_metrics(
            self.capacity(),
            self.queued(),
            self.shared.health.unhealthy(),
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }
}

impl<R: Resource> Drop for ResourcePool<R> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<R: Resource> fmt::Debug for ResourcePool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("config", &self.shared.config)
            .field("queued", &self.queued())
            .field("unhealthy", &self.shared.health.unhealthy())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Backend, TestConn};
    use std::collections::HashSet;
    use std::time::Instant;

    fn manual_config(capacity: usize) -> PoolConfiguration {
        PoolConfiguration::new()
            .with_capacity(capacity)
            .with_eviction_interval(Duration::from_secs(3600))
    }

    fn force_all_unhealthy(pool: &ResourcePool<TestConn>) {
        for _ in 0..pool.shared.config.capacity {
            if let Some(handle) = pool.shared.handles.dequeue() {
                handle.force_unhealthy();
                pool.shared.handles.enqueue(handle);
            }
        }
    }

    #[tokio::test]
    async fn test_pool_basic() {
        let backend = Backend::default();
        let pool = ResourcePool::new(backend.clone(), manual_config(3)).await.unwrap();
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.queued(), 3);

        {
            let conn = pool.acquire(&CancellationToken::new()).await.unwrap();
            assert_eq!(conn.id, 0);
            assert_eq!(conn.in_use(), 1);
            assert_eq!(conn.use_count(), 1);
        }

        assert_eq!(pool.queued(), 3);
        let metrics = pool.metrics();
        assert_eq!(metrics.total_acquired, 1);
        assert_eq!(metrics.total_released, 1);
    }

    #[tokio::test]
    async fn test_capacity_is_clamped() {
        let backend = Backend::default();
        let pool = ResourcePool::new(backend.clone(), manual_config(0)).await.unwrap();
        assert_eq!(pool.capacity(), 2);
        assert_eq!(backend.created(), 2);
    }

    #[tokio::test]
    async fn test_acquire_is_round_robin_and_shared() {
        let pool = ResourcePool::new(Backend::default(), manual_config(3)).await.unwrap();
        let cancel = CancellationToken::new();

        let mut held = Vec::new();
        for _ in 0..6 {
            held.push(pool.acquire(&cancel).await.unwrap());
        }

        let ids: Vec<_> = held.iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 0, 1, 2]);
        assert!(held.iter().all(|h| h.in_use() == 2));
    }

    #[tokio::test]
    async fn test_construction_failure_discards_partial_pool() {
        let backend = Backend::default().failing_after(2);
        let result = ResourcePool::new(backend.clone(), manual_config(4)).await;

        match result {
            Err(PoolError::ConstructionFailed { index, capacity, .. }) => {
                assert_eq!(index, 2);
                assert_eq!(capacity, 4);
            }
            other => panic!("expected construction failure, got {other:?}"),
        }
        assert_eq!(backend.closed_ids(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_cancelled_acquire_times_out() {
        let pool = ResourcePool::new(Backend::default(), manual_config(2)).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = pool.acquire(&cancel).await;
        assert!(matches!(result, Err(PoolError::Timeout)));
        assert_eq!(pool.metrics().acquire_timeouts, 1);
    }

    #[tokio::test]
    async fn test_acquire_timeout_when_nothing_is_healthy() {
        let pool = ResourcePool::new(Backend::default(), manual_config(2)).await.unwrap();
        force_all_unhealthy(&pool);

        let started = Instant::now();
        let result = pool.acquire_timeout(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(PoolError::Timeout)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_interrupts_spinning_acquire() {
        let pool = Arc::new(ResourcePool::new(Backend::default(), manual_config(2)).await.unwrap());
        force_all_unhealthy(&pool);

        let spinning = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let started = Instant::now();
                let result = pool.acquire_timeout(Duration::from_secs(5)).await;
                (result, started.elapsed())
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.close();

        let (result, elapsed) = spinning.await.unwrap();
        assert!(matches!(result, Err(PoolError::Closed)));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_acquire_after_close() {
        let backend = Backend::default();
        let pool = ResourcePool::new(backend.clone(), manual_config(2)).await.unwrap();
        pool.close();

        assert!(pool.is_closed());
        assert_eq!(pool.capacity(), 0);
        assert!(matches!(
            pool.acquire(&CancellationToken::new()).await,
            Err(PoolError::Closed)
        ));
        assert!(!pool.health_status().is_healthy());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_close_drains_once() {
        let backend = Backend::default();
        let pool = Arc::new(ResourcePool::new(backend.clone(), manual_config(8)).await.unwrap());

        let closers: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.close() })
            })
            .collect();
        for closer in closers {
            closer.await.unwrap();
        }

        assert_eq!(backend.closed_ids(), (0..8).collect::<Vec<_>>());
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn test_drop_closes_resources() {
        let backend = Backend::default();
        {
            let _pool = ResourcePool::new(backend.clone(), manual_config(3)).await.unwrap();
        }
        assert_eq!(backend.closed_ids(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_use_count_budget_and_replacement() {
        let backend = Backend::default();
        let pool = ResourcePool::new(backend.clone(), manual_config(4).with_max_use_count(2))
            .await
            .unwrap();
        let cancel = CancellationToken::new();

        let original_created = pool.acquire(&cancel).await.unwrap().created_at();
        // Three borrows per resource; the round-robin walks all four each pass.
        for _ in 0..11 {
            pool.acquire(&cancel).await.unwrap().release();
        }

        // Only capacity / 2 markings are allowed.
        let metrics = pool.metrics();
        assert_eq!(metrics.unhealthy_marked, 2);
        assert_eq!(metrics.markings_refused, 2);
        assert_eq!(metrics.unhealthy_resources, 2);

        tokio::time::sleep(Duration::from_millis(5)).await;
        for _ in 0..4 {
            pool.shared.run_eviction_cycle().await;
        }
        assert_eq!(pool.metrics().replacements, 2);
        assert_eq!(pool.metrics().unhealthy_resources, 0);
        assert_eq!(backend.closed_ids(), vec![0, 1]);

        let fresh = pool.acquire(&cancel).await.unwrap();
        assert_eq!(fresh.id(), 4);
        assert_eq!(fresh.use_count(), 1);
        assert!(fresh.created_at() > original_created);

        let next = pool.acquire(&cancel).await.unwrap();
        assert_eq!(next.id(), 5);
        assert_eq!(next.use_count(), 1);

        let veteran = pool.acquire(&cancel).await.unwrap();
        assert_eq!(veteran.id(), 2);
        assert_eq!(veteran.use_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_life_retires_and_replaces() {
        let backend = Backend::default();
        let config = PoolConfiguration::new()
            .with_capacity(2)
            .with_max_life(Duration::from_secs(1))
            .with_eviction_interval(Duration::from_millis(500));
        let pool = ResourcePool::new(backend.clone(), config).await.unwrap();
        let cancel = CancellationToken::new();

        let held = pool.acquire(&cancel).await.unwrap();
        let retired = held.id();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(pool.metrics().replacements, 0);

        held.release();
        assert_eq!(pool.health_status().unhealthy_resources, 1);

        // Cycles at 1.5s and 2s; the retired resource is second in the queue.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(pool.metrics().replacements, 1);
        assert_eq!(backend.closed_ids(), vec![retired]);

        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(pool.acquire(&cancel).await.unwrap());
        }
        let seen: HashSet<_> = held.iter().map(|conn| conn.id()).collect();
        assert!(!seen.contains(&retired));
        assert!(seen.contains(&2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unhealthy_never_exceeds_half_capacity() {
        let backend = Backend::default();
        let config = PoolConfiguration::new()
            .with_capacity(6)
            .with_max_use_count(1)
            .with_eviction_interval(Duration::from_millis(1));
        let pool = Arc::new(ResourcePool::new(backend.clone(), config).await.unwrap());

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let conn = pool.acquire_timeout(Duration::from_secs(5)).await.unwrap();
                        assert!(pool.shared.health.unhealthy() <= 3);
                        tokio::task::yield_now().await;
                        conn.release();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.await.unwrap();
        }

        assert!(pool.health_status().unhealthy_resources <= 3);
        pool.close();
        // Let an eviction cycle caught mid-flight finish its drain.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let closed = backend.closed_ids();
        let unique: HashSet<_> = closed.iter().copied().collect();
        assert_eq!(unique.len(), closed.len(), "a resource was closed twice");
        assert_eq!(closed.len() as u64, backend.created());
    }
}
