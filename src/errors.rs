//! Error types for the resource pool

use crate::resource::BoxError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("resource pool is closed")]
    Closed,

    #[error("resource pool timed out waiting for a healthy resource")]
    Timeout,

    #[error("failed to construct pooled resource {index} of {capacity}")]
    ConstructionFailed {
        index: usize,
        capacity: usize,
        #[source]
        source: BoxError,
    },

    /// Only ever logged by the eviction task, never returned to callers.
    #[error("failed to replace unhealthy resource {handle_id}")]
    ReplacementFailed {
        handle_id: u64,
        #[source]
        source: BoxError,
    },

    #[error("no resource pool registered under '{0}'")]
    UnknownPool(String),
}

pub type PoolResult<T> = Result<T, PoolError>;
