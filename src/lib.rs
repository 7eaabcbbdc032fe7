/*!
 * Device Memory Pool Library
 * Sub-allocation of GPU device memory blocks into fragments
 */

pub mod config;
pub mod core;
pub mod memory;
pub mod monitoring;

// Re-exports
pub use config::PoolConfig;
pub use crate::core::types::{BlockIndex, DeviceSize, MemoryTypeIndex};
pub use memory::{
    Allocation, AllocationRequest, Allocator, DeviceMemory, DeviceMemoryPool, HostMemoryDevice,
    MemoryDevice, MemoryError, MemoryFlags, MemoryInfo, MemoryResult, PhysicalDevice, PoolStats,
};
pub use monitoring::init_tracing;
