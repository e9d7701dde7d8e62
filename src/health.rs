//! Health monitoring for resource pools

use std::sync::atomic::{AtomicUsize, Ordering};

/// Health status of a resource pool
///
/// # Examples
///
/// ```
/// use roundpool::HealthStatus;
///
/// let health = HealthStatus::new(4, 1, 4, false);
/// assert!(health.is_healthy());
/// assert_eq!(health.healthy_resources, 3);
///
/// let saturated = HealthStatus::new(4, 2, 4, false);
/// assert!(!saturated.is_healthy());
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Share of resources marked unhealthy (0.0 to 1.0)
    pub unhealthy_ratio: f64,

    /// Resources eligible for acquisition
    pub healthy_resources: usize,

    /// Resources waiting for replacement
    pub unhealthy_resources: usize,

    /// Resources currently sitting in the queue. Acquirers and the eviction
    /// cycle briefly hold one off the queue, so this can dip below capacity.
    pub queued_resources: usize,

    /// Total capacity
    pub total_capacity: usize,

    /// Whether the pool has been closed
    pub closed: bool,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(capacity: usize, unhealthy: usize, queued: usize, closed: bool) -> Self {
        let unhealthy_ratio = if capacity > 0 {
            unhealthy as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if closed {
            warnings.push("Pool is closed".to_string());
            is_healthy = false;
        }

        // The safeguard refuses further markings from here on.
        if capacity > 0 && unhealthy >= capacity / 2 {
            warnings.push(format!(
                "Unhealthy resources at safeguard limit: {unhealthy}/{capacity}"
            ));
            is_healthy = false;
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            unhealthy_ratio,
            healthy_resources: capacity.saturating_sub(unhealthy),
            unhealthy_resources: unhealthy,
            queued_resources: queued,
            total_capacity: capacity,
            closed,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

/// Pool-wide count of unhealthy resources, capped below half the capacity.
///
/// Capping keeps a backend blip from retiring most of the pool at once and
/// starving every caller.
#[derive(Debug)]
pub(crate) struct HealthTracker {
    capacity: usize,
    unhealthy: AtomicUsize,
}

impl HealthTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            unhealthy: AtomicUsize::new(0),
        }
    }

    /// Maximum number of simultaneously unhealthy resources.
    pub fn limit(&self) -> usize {
        self.capacity / 2
    }

    /// Reserve one unhealthy slot; `false` when the cap is reached.
    pub fn try_mark(&self) -> bool {
        let limit = self.limit();
        self.unhealthy
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok()
    }

    /// Give back a slot after a replacement or an abandoned marking.
    pub fn recover(&self) {
        let _ = self
            .unhealthy
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn unhealthy(&self) -> usize {
        self.unhealthy.load(Ordering::SeqCst)
    }
}
