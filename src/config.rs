/*!
 * Pool Configuration
 * Block sizing and table bounds, with environment overrides
 */

use crate::core::limits::{
    ALLOCATION_GRANULARITY, DEFAULT_POOL_SIZE, EXTRA_BLOCK_SIZE, MAX_RAW_ALLOCATIONS,
};
use crate::core::types::DeviceSize;
use crate::memory::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Whether the crate was built with block sub-allocation disabled
pub const PASSTHROUGH: bool = cfg!(feature = "passthrough");

/// Device memory pool configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Size of the device-local block created eagerly at construction
    pub default_pool_size: DeviceSize,
    /// Preferred size of blocks created on demand
    pub extra_block_size: DeviceSize,
    /// Granularity pooled allocation sizes are rounded up to
    pub allocation_granularity: DeviceSize,
    /// Live raw allocations allowed per memory type
    pub max_raw_allocations: usize,
    /// Create the default device-local block up front
    pub preallocate_device_local: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_pool_size: DEFAULT_POOL_SIZE,
            extra_block_size: EXTRA_BLOCK_SIZE,
            allocation_granularity: ALLOCATION_GRANULARITY,
            max_raw_allocations: MAX_RAW_ALLOCATIONS,
            preallocate_device_local: true,
        }
    }
}

impl PoolConfig {
    pub fn with_default_pool_size(mut self, size: DeviceSize) -> Self {
        self.default_pool_size = size;
        self
    }

    pub fn with_extra_block_size(mut self, size: DeviceSize) -> Self {
        self.extra_block_size = size;
        self
    }

    pub fn with_allocation_granularity(mut self, granularity: DeviceSize) -> Self {
        self.allocation_granularity = granularity;
        self
    }

    pub fn with_max_raw_allocations(mut self, max: usize) -> Self {
        self.max_raw_allocations = max;
        self
    }

    pub fn with_preallocation(mut self, enabled: bool) -> Self {
        self.preallocate_device_local = enabled;
        self
    }

    /// Defaults overridden by environment variables
    ///
    /// Environment variables:
    /// - DEVICE_MEMORY_POOL_SIZE: eager device-local block size (e.g. "256M")
    /// - DEVICE_MEMORY_EXTRA_BLOCK_SIZE: on-demand block size (e.g. "100M")
    /// - DEVICE_MEMORY_PREALLOCATE: "0"/"false" disables the eager block
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(size) = env_size("DEVICE_MEMORY_POOL_SIZE") {
            config.default_pool_size = size;
        }
        if let Some(size) = env_size("DEVICE_MEMORY_EXTRA_BLOCK_SIZE") {
            config.extra_block_size = size;
        }
        if let Ok(value) = std::env::var("DEVICE_MEMORY_PREALLOCATE") {
            config.preallocate_device_local = !matches!(value.trim(), "0" | "false" | "no");
        }

        config
    }

    /// Reject configurations the allocator cannot honour
    pub fn validate(&self) -> MemoryResult<()> {
        if !self.allocation_granularity.is_power_of_two() {
            return Err(MemoryError::InvalidConfig(format!(
                "allocation granularity {} is not a power of two",
                self.allocation_granularity
            )));
        }
        if self.extra_block_size < self.allocation_granularity {
            return Err(MemoryError::InvalidConfig(format!(
                "extra block size {} is smaller than the granularity {}",
                self.extra_block_size, self.allocation_granularity
            )));
        }
        if self.preallocate_device_local && self.default_pool_size < self.allocation_granularity {
            return Err(MemoryError::InvalidConfig(format!(
                "default pool size {} is smaller than the granularity {}",
                self.default_pool_size, self.allocation_granularity
            )));
        }
        Ok(())
    }
}

fn env_size(name: &str) -> Option<DeviceSize> {
    let value = std::env::var(name).ok()?;
    match parse_size(&value) {
        Ok(size) => Some(size),
        Err(err) => {
            warn!(variable = name, value = %value, error = %err, "ignoring invalid size");
            None
        }
    }
}

/// Parse a byte count with an optional `K`, `M` or `G` suffix (`B` optional)
///
/// `"512M"`, `"512MB"`, `"4k"` and `"1073741824"` are all accepted.
pub fn parse_size(input: &str) -> MemoryResult<DeviceSize> {
    let trimmed = input.trim();
    let upper = trimmed.to_ascii_uppercase();
    let without_b = upper.strip_suffix('B').unwrap_or(&upper);

    let (digits, multiplier) = match without_b.chars().last() {
        Some('K') => (&without_b[..without_b.len() - 1], 1024),
        Some('M') => (&without_b[..without_b.len() - 1], 1024 * 1024),
        Some('G') => (&without_b[..without_b.len() - 1], 1024 * 1024 * 1024),
        _ => (without_b, 1),
    };

    let value: DeviceSize = digits
        .trim()
        .parse()
        .map_err(|_| MemoryError::InvalidConfig(format!("invalid size '{trimmed}'")))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| MemoryError::InvalidConfig(format!("size '{trimmed}' overflows")))
}
