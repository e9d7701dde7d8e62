//! Retirement policy and the background task that replaces retired resources

use crate::config::PoolConfiguration;
use crate::errors::PoolError;
use crate::handle::ManagedHandle;
use crate::metrics::MetricsTracker;
use crate::pool::PoolShared;
use crate::resource::Resource;

use std::error::Error as _;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Budget after which a resource is retired on its next release
///
/// # Examples
///
/// ```
/// use roundpool::EvictionPolicy;
/// use std::time::Duration;
///
/// let policy = EvictionPolicy {
///     max_life: Duration::from_secs(60),
///     max_use_count: 2,
/// };
///
/// assert!(!policy.is_exhausted(Duration::from_secs(1), 2));
/// assert!(policy.is_exhausted(Duration::from_secs(1), 3));
/// assert!(policy.is_exhausted(Duration::from_secs(61), 1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Maximum age; zero disables the age check
    pub max_life: Duration,

    /// Maximum borrows; zero disables the use check
    pub max_use_count: u64,
}

impl EvictionPolicy {
    pub fn from_configuration(config: &PoolConfiguration) -> Self {
        Self {
            max_life: config.max_life_duration,
            max_use_count: config.max_use_count,
        }
    }

    /// Whether a resource of this age and use count should be retired
    pub fn is_exhausted(&self, age: Duration, use_count: u64) -> bool {
        let too_old = !self.max_life.is_zero() && age > self.max_life;
        let overused = self.max_use_count > 0 && use_count > self.max_use_count;
        too_old || overused
    }
}

impl<R: Resource> PoolShared<R> {
    /// Take the next resource off the queue, replace it if it is retired and
    /// idle, and put the result back at the tail.
    pub(crate) async fn run_eviction_cycle(self: &Arc<Self>) {
        let Some(handle) = self.handles.dequeue() else {
            return;
        };

        let handle = if handle.is_healthy() || handle.in_use() > 0 {
            handle
        } else {
            self.replace(handle).await
        };

        self.requeue(handle);
    }

    /// Dial a replacement for `retired`. Returns the handle to put back: the
    /// fresh one on success, `retired` itself on failure or when the pool
    /// closes mid-dial (the caller's requeue then drains it).
    async fn replace(self: &Arc<Self>, retired: Arc<ManagedHandle<R>>) -> Arc<ManagedHandle<R>> {
        let created = tokio::select! {
            created = self.factory.create(&self.dial) => created,
            _ = self.shutdown.cancelled() => {
                debug!(retired = retired.id(), "pool closed during replacement");
                return retired;
            }
        };

        match created {
            Ok(resource) => {
                retired.close_resource();
                self.health.recover();
                MetricsTracker::record(&self.metrics.replacements);

                let fresh = self.new_handle(resource);
                debug!(
                    retired = retired.id(),
                    replacement = fresh.id(),
                    "replaced unhealthy resource"
                );
                fresh
            }
            Err(_) if self.is_closed() => {
                debug!(retired = retired.id(), "replacement dial cancelled by close");
                retired
            }
            Err(source) => {
                let error = PoolError::ReplacementFailed {
                    handle_id: retired.id(),
                    source,
                };
                MetricsTracker::record(&self.metrics.replacement_failures);
                warn!(
                    %error,
                    cause = ?error.source(),
                    "keeping unhealthy resource until the next eviction cycle"
                );
                retired
            }
        }
    }
}

/// Drive eviction cycles until the pool is closed or dropped.
pub(crate) async fn run_eviction_task<R: Resource>(
    pool: Weak<PoolShared<R>>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(shared) = pool.upgrade() else {
            break;
        };
        if shared.is_closed() {
            break;
        }
        shared.run_eviction_cycle().await;
    }

    debug!("eviction task stopped");
}
