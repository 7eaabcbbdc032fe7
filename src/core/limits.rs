/*!
 * Allocator Limits and Constants
 *
 * Centralized location for block sizes, granularity and table bounds.
 * Performance-critical constants are marked with [PERF].
 */

use super::types::DeviceSize;

/// Granularity every pooled allocation is rounded up to (4KB)
/// [PERF] Coarse rounding keeps fragment counts low
pub const ALLOCATION_GRANULARITY: DeviceSize = 4 * 1024;

/// Size of the block pre-allocated for device-local memory at startup (256MB)
pub const DEFAULT_POOL_SIZE: DeviceSize = 256 * 1024 * 1024;

/// Size of each additional block created when existing blocks are full (100MB)
pub const EXTRA_BLOCK_SIZE: DeviceSize = 100 * 1024 * 1024;

/// Upper bound on native memory types
/// Vulkan caps VK_MAX_MEMORY_TYPES at 32
pub const MAX_MEMORY_TYPES: usize = 32;

/// Maximum number of live raw allocations per memory type
pub const MAX_RAW_ALLOCATIONS: usize = 64 * 1024;
