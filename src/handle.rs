//! Managed handles and the borrow guard handed to callers

use crate::metrics::MetricsTracker;
use crate::pool::PoolShared;
use crate::resource::Resource;

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tracing::{debug, warn};

/// One pooled resource plus its lifecycle bookkeeping.
///
/// Borrowing is shared: `in_use` counts outstanding borrows and is not a lock.
/// All flags use `SeqCst` so that a borrower bumping `in_use` and the eviction
/// task reading it after seeing `unhealthy` can never both miss each other.
pub(crate) struct ManagedHandle<R: Resource> {
    id: u64,
    resource: R,
    created_at: Instant,
    in_use: AtomicUsize,
    use_count: AtomicU64,
    unhealthy: AtomicBool,
    pool: Weak<PoolShared<R>>,
}

impl<R: Resource> ManagedHandle<R> {
    pub fn new(id: u64, resource: R, pool: Weak<PoolShared<R>>) -> Self {
        Self {
            id,
            resource,
            created_at: Instant::now(),
            in_use: AtomicUsize::new(0),
            use_count: AtomicU64::new(0),
            unhealthy: AtomicBool::new(false),
            pool,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_healthy(&self) -> bool {
        !self.unhealthy.load(Ordering::SeqCst)
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    pub fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::SeqCst)
    }

    /// Register a borrow unless the handle is unhealthy.
    pub fn try_borrow(&self) -> bool {
        self.in_use.fetch_add(1, Ordering::SeqCst);
        if self.unhealthy.load(Ordering::SeqCst) {
            self.in_use.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        self.use_count.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// End a borrow and retire the handle if its age or use budget is spent.
    pub fn release(&self) {
        let _ = self
            .in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        MetricsTracker::record(&pool.metrics.total_released);

        if pool
            .policy
            .is_exhausted(self.created_at.elapsed(), self.use_count())
        {
            self.mark_unhealthy(&pool);
        }
    }

    fn mark_unhealthy(&self, pool: &PoolShared<R>) {
        if !self.is_healthy() {
            return;
        }
        if !pool.health.try_mark() {
            MetricsTracker::record(&pool.metrics.markings_refused);
            debug!(
                handle_id = self.id,
                unhealthy = pool.health.unhealthy(),
                "unhealthy limit reached, keeping resource in rotation"
            );
            return;
        }
        if self
            .unhealthy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Lost the race to another releaser.
            pool.health.recover();
            return;
        }

        MetricsTracker::record(&pool.metrics.unhealthy_marked);
        debug!(
            handle_id = self.id,
            use_count = self.use_count(),
            age_ms = self.created_at.elapsed().as_millis() as u64,
            "resource marked unhealthy"
        );
    }

    /// Close the underlying resource, logging failures.
    pub fn close_resource(&self) {
        if let Err(error) = self.resource.close() {
            warn!(handle_id = self.id, %error, "failed to close pooled resource");
        }
    }

    #[cfg(test)]
    pub fn force_unhealthy(&self) {
        self.unhealthy.store(true, Ordering::SeqCst);
    }
}

/// A borrowed resource that is released back to its pool when dropped
///
/// Several guards may point at the same resource at once; the pool shares
/// resources between borrowers rather than handing out exclusive access.
pub struct PooledHandle<R: Resource> {
    handle: Arc<ManagedHandle<R>>,
}

impl<R: Resource> PooledHandle<R> {
    pub(crate) fn new(handle: Arc<ManagedHandle<R>>) -> Self {
        Self { handle }
    }

    /// Release explicitly; equivalent to dropping the guard
    pub fn release(self) {
        drop(self);
    }

    /// Pool-unique identity of the managed resource
    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    /// Borrows over the resource's lifetime, this one included
    pub fn use_count(&self) -> u64 {
        self.handle.use_count()
    }

    /// Outstanding borrows, this one included
    pub fn in_use(&self) -> usize {
        self.handle.in_use()
    }

    /// When the resource was created
    pub fn created_at(&self) -> Instant {
        self.handle.created_at
    }

    /// Whether the resource is still eligible for acquisition
    pub fn is_healthy(&self) -> bool {
        self.handle.is_healthy()
    }
}

impl<R: Resource> Deref for PooledHandle<R> {
    type Target = R;

    fn deref(&self) -> &Self::Target {
        &self.handle.resource
    }
}

impl<R: Resource> Drop for PooledHandle<R> {
    fn drop(&mut self) {
        self.handle.release();
    }
}

impl<R: Resource> fmt::Debug for PooledHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledHandle")
            .field("id", &self.id())
            .field("use_count", &self.use_count())
            .field("in_use", &self.in_use())
            .field("healthy", &self.is_healthy())
            .finish()
    }
}
