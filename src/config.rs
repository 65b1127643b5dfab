/*!
 * Lock Configuration
 *
 * Construction-time tuning for the registry and keyed lock pools
 */

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Default number of idle locks retained per keyed lock
pub const DEFAULT_MAX_POOL_SIZE: usize = 64;

/// Upper bound on `max_pool_size`
pub const MAX_POOL_SIZE: usize = 1 << 16;

/// Registry map configuration
///
/// Both fields are performance hints only; neither changes semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Initial entry capacity of the backing map
    pub initial_capacity: usize,
    /// Number of map shards (power of two > 1). `None` uses the map default,
    /// which scales with available parallelism.
    pub shard_amount: Option<usize>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            shard_amount: None,
        }
    }
}

impl RegistryConfig {
    /// Check the configuration before any map is built
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self.shard_amount {
            Some(shards) if shards <= 1 || !shards.is_power_of_two() => {
                Err(ConfigurationError::InvalidShardAmount(shards))
            }
            _ => Ok(()),
        }
    }
}

/// Keyed lock configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedLockConfig {
    /// Maximum idle lock instances kept for reuse; `0` disables pooling
    pub max_pool_size: usize,
    /// Backing registry configuration
    pub registry: RegistryConfig,
}

impl Default for KeyedLockConfig {
    fn default() -> Self {
        Self {
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            registry: RegistryConfig::default(),
        }
    }
}

impl KeyedLockConfig {
    /// Configuration for workloads that touch many short-lived keys
    pub const fn high_churn() -> Self {
        Self {
            max_pool_size: 1024,
            registry: RegistryConfig {
                initial_capacity: 1024,
                shard_amount: None,
            },
        }
    }

    /// Configuration that retains nothing between leases
    pub const fn low_memory() -> Self {
        Self {
            max_pool_size: 0,
            registry: RegistryConfig {
                initial_capacity: 0,
                shard_amount: Some(4),
            },
        }
    }

    /// Set pool capacity
    pub const fn with_max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.max_pool_size = max_pool_size;
        self
    }

    /// Set registry configuration
    pub const fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_pool_size > MAX_POOL_SIZE {
            return Err(ConfigurationError::PoolTooLarge {
                requested: self.max_pool_size,
                max: MAX_POOL_SIZE,
            });
        }
        self.registry.validate()
    }
}
