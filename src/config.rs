//! Pool configuration options

use std::time::Duration;

/// Smallest capacity a pool is built with.
pub const MIN_CAPACITY: usize = 2;
/// Lifetime applied when none is configured.
pub const DEFAULT_MAX_LIFE: Duration = Duration::from_secs(3600);
/// Borrow budget applied when none is configured.
pub const DEFAULT_MAX_USE_COUNT: u64 = 256;
/// Pause between two background eviction cycles.
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for resource pool behavior
///
/// Zero values are placeholders for the defaults; see [`normalized`](Self::normalized).
///
/// # Examples
///
/// ```
/// use roundpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_capacity(8)
///     .with_max_life(Duration::from_secs(600))
///     .with_max_use_count(1_000);
///
/// assert_eq!(config.capacity, 8);
/// assert_eq!(config.max_use_count, 1_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfiguration {
    /// Number of resources the pool keeps
    pub capacity: usize,

    /// Age after which a resource is retired on its next release
    pub max_life_duration: Duration,

    /// Borrows after which a resource is retired on its next release
    pub max_use_count: u64,

    /// Pause between two background eviction cycles
    pub eviction_interval: Duration,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            capacity: MIN_CAPACITY,
            max_life_duration: DEFAULT_MAX_LIFE,
            max_use_count: DEFAULT_MAX_USE_COUNT,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of pooled resources
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the maximum resource lifetime
    pub fn with_max_life(mut self, max_life: Duration) -> Self {
        self.max_life_duration = max_life;
        self
    }

    /// Set the maximum number of borrows per resource
    pub fn with_max_use_count(mut self, count: u64) -> Self {
        self.max_use_count = count;
        self
    }

    /// Set the pause between eviction cycles
    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = interval;
        self
    }

    /// Replace out-of-range values with their defaults.
    ///
    /// ```
    /// use roundpool::PoolConfiguration;
    /// use std::time::Duration;
    ///
    /// let config = PoolConfiguration::new()
    ///     .with_capacity(1)
    ///     .with_max_life(Duration::ZERO)
    ///     .with_max_use_count(0)
    ///     .normalized();
    ///
    /// assert_eq!(config.capacity, 2);
    /// assert_eq!(config.max_life_duration, Duration::from_secs(3600));
    /// assert_eq!(config.max_use_count, 256);
    /// ```
    pub fn normalized(mut self) -> Self {
        self.capacity = self.capacity.max(MIN_CAPACITY);
        if self.max_life_duration.is_zero() {
            self.max_life_duration = DEFAULT_MAX_LIFE;
        }
        if self.max_use_count == 0 {
            self.max_use_count = DEFAULT_MAX_USE_COUNT;
        }
        if self.eviction_interval.is_zero() {
            self.eviction_interval = DEFAULT_EVICTION_INTERVAL;
        }
        self
    }
}

/// Externally loaded settings for one named backend pool.
///
/// Mirrors one entry of a service configuration file:
///
/// ```json
/// { "addr": "10.0.0.7:9000", "size": 4, "max_life": 600, "max_use_count": 512, "ctx": ["x-request-id"] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolSettings {
    /// Backend address handed to the factory
    pub addr: String,

    /// Pool capacity
    pub size: usize,

    /// Maximum resource lifetime in seconds
    pub max_life: u64,

    /// Maximum borrows per resource
    pub max_use_count: u64,

    /// Context keys the factory propagates on outgoing calls
    pub ctx: Vec<String>,
}

impl PoolSettings {
    /// Resolve into a normalized pool configuration
    pub fn to_configuration(&self) -> PoolConfiguration {
        PoolConfiguration::new()
            .with_capacity(self.size)
            .with_max_life(Duration::from_secs(self.max_life))
            .with_max_use_count(self.max_use_count)
            .normalized()
    }
}
