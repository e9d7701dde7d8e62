//! # roundpool
//!
//! Non-blocking pool of shared network client resources (RPC connections and
//! the like), built on a lock-free Michael–Scott queue.
//!
//! ## Features
//!
//! - Fixed-capacity pool filled eagerly at construction
//! - Round-robin acquisition without locks: every acquire dequeues the next
//!   resource and re-enqueues it at the tail
//! - Resources shared between concurrent borrowers, released via RAII
//! - Age and use-count budgets; exhausted resources are replaced in the
//!   background once idle
//! - At most half the pool can be marked unhealthy at a time
//! - Cancellation-aware acquisition with deadline support
//! - Named pool registry, health status and Prometheus-style metrics
//!
//! ## Quick Start
//!
//! ```rust
//! use roundpool::{BoxError, PoolConfiguration, Resource, ResourcePool};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! struct RpcClient {
//!     addr: String,
//! }
//!
//! impl Resource for RpcClient {
//!     fn close(&self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), roundpool::PoolError> {
//! let config = PoolConfiguration::new()
//!     .with_capacity(4)
//!     .with_max_life(Duration::from_secs(600))
//!     .with_max_use_count(1_000);
//!
//! let pool = ResourcePool::new(
//!     |_cancel: CancellationToken| async {
//!         Ok::<_, BoxError>(RpcClient { addr: "10.0.0.7:9000".into() })
//!     },
//!     config,
//! )
//! .await?;
//!
//! {
//!     let client = pool.acquire_timeout(Duration::from_secs(1)).await?;
//!     println!("Using {}", client.addr);
//!     // Released back to the pool when `client` goes out of scope
//! }
//!
//! pool.close();
//! # Ok(())
//! # }
//! ```

mod pool;
mod queue;
mod resource;
mod handle;
mod config;
mod metrics;
mod health;
mod eviction;
mod registry;
mod errors;

#[cfg(test)]
mod testing;

pub use pool::ResourcePool;
pub use queue::LockFreeQueue;
pub use resource::{BoxError, Resource, ResourceFactory};
pub use handle::PooledHandle;
pub use config::{
    PoolConfiguration, PoolSettings, DEFAULT_EVICTION_INTERVAL, DEFAULT_MAX_LIFE,
    DEFAULT_MAX_USE_COUNT, MIN_CAPACITY,
};
pub use metrics::{PoolMetrics, MetricsExporter};
pub use health::HealthStatus;
pub use eviction::EvictionPolicy;
pub use registry::PoolRegistry;
pub use errors::{PoolError, PoolResult};
