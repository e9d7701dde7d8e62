//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use roundpool::{BoxError, PoolConfiguration, Resource, ResourcePool};
/// use tokio_util::sync::CancellationToken;
///
/// struct Conn;
/// impl Resource for Conn {
///     fn close(&self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() {
/// let pool = ResourcePool::new(
///     |_cancel: CancellationToken| async { Ok::<_, BoxError>(Conn) },
///     PoolConfiguration::new().with_capacity(3),
/// )
/// .await
/// .unwrap();
///
/// {
///     let _conn = pool.acquire(&CancellationToken::new()).await.unwrap();
///     let metrics = pool.metrics();
///     assert_eq!(metrics.total_acquired, 1);
///     assert_eq!(metrics.capacity, 3);
/// }
/// assert_eq!(pool.metrics().total_released, 1);
/// # }
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Configured capacity, 0 once closed
    pub capacity: usize,

    /// Resources currently sitting in the queue
    pub queued_resources: usize,

    /// Resources marked unhealthy and awaiting replacement
    pub unhealthy_resources: usize,

    /// Total successful acquisitions
    pub total_acquired: usize,

    /// Total releases
    pub total_released: usize,

    /// Acquisitions abandoned because the caller's deadline passed
    pub acquire_timeouts: usize,

    /// Resources marked unhealthy
    pub unhealthy_marked: usize,

    /// Markings refused by the unhealthy-ratio safeguard
    pub markings_refused: usize,

    /// Resources replaced by the eviction task
    pub replacements: usize,

    /// Replacement attempts whose factory call failed
    pub replacement_failures: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics.insert("queued_resources".to_string(), self.queued_resources.to_string());
        metrics.insert("unhealthy_resources".to_string(), self.unhealthy_resources.to_string());
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("acquire_timeouts".to_string(), self.acquire_timeouts.to_string());
        metrics.insert("unhealthy_marked".to_string(), self.unhealthy_marked.to_string());
        metrics.insert("markings_refused".to_string(), self.markings_refused.to_string());
        metrics.insert("replacements".to_string(), self.replacements.to_string());
        metrics.insert("replacement_failures".to_string(), self.replacement_failures.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[derive(Debug)]
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// ```
    /// use roundpool::{MetricsExporter, PoolMetrics};
    /// use std::collections::HashMap;
    ///
    /// let metrics = PoolMetrics {
    ///     capacity: 4,
    ///     queued_resources: 4,
    ///     unhealthy_resources: 1,
    ///     total_acquired: 10,
    ///     total_released: 9,
    ///     acquire_timeouts: 0,
    ///     unhealthy_marked: 1,
    ///     markings_refused: 0,
    ///     replacements: 0,
    ///     replacement_failures: 0,
    /// };
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("backend".to_string(), "users".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&metrics, "users_grpc", Some(&tags));
    /// assert!(output.contains("roundpool_resources_unhealthy{pool=\"users_grpc\",backend=\"users\"} 1"));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges = [
            ("roundpool_capacity", "Configured pool capacity", metrics.capacity),
            ("roundpool_resources_queued", "Resources in rotation", metrics.queued_resources),
            ("roundpool_resources_unhealthy", "Resources awaiting replacement", metrics.unhealthy_resources),
        ];
        let counters = [
            ("roundpool_acquired_total", "Total acquisitions", metrics.total_acquired),
            ("roundpool_released_total", "Total releases", metrics.total_released),
            ("roundpool_acquire_timeouts_total", "Acquisitions abandoned on deadline", metrics.acquire_timeouts),
            ("roundpool_unhealthy_marked_total", "Resources marked unhealthy", metrics.unhealthy_marked),
            ("roundpool_markings_refused_total", "Markings refused by the unhealthy cap", metrics.markings_refused),
            ("roundpool_replacements_total", "Resources replaced", metrics.replacements),
            ("roundpool_replacement_failures_total", "Failed replacement attempts", metrics.replacement_failures),
        ];

        for (kind, series) in [("gauge", &gauges[..]), ("counter", &counters[..])] {
            for (name, help, value) in series {
                let _ = writeln!(output, "# HELP {name} {help}");
                let _ = writeln!(output, "# TYPE {name} {kind}");
                let _ = writeln!(output, "{name}{{{labels}}} {value}");
            }
        }

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub total_acquired: AtomicUsize,
    pub total_released: AtomicUsize,
    pub acquire_timeouts: AtomicUsize,
    pub unhealthy_marked: AtomicUsize,
    pub markings_refused: AtomicUsize,
    pub replacements: AtomicUsize,
    pub replacement_failures: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, capacity: usize, queued: usize, unhealthy: usize) -> PoolMetrics {
        PoolMetrics {
            capacity,
            queued_resources: queued,
            unhealthy_resources: unhealthy,
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
            unhealthy_marked: self.unhealthy_marked.load(Ordering::Relaxed),
            markings_refused: self.markings_refused.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            replacement_failures: self.replacement_failures.load(Ordering::Relaxed),
        }
    }
}
