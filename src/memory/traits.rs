/*!
 * Memory Traits
 * Allocator abstractions for resource creation code
 */

use super::device::MemoryDevice;
use super::pool::DeviceMemoryPool;
use super::types::*;

/// Device memory allocator interface
///
/// Buffers, images and streaming jobs depend on this instead of the concrete
/// pool so tests can substitute their own allocator.
pub trait Allocator: Send + Sync {
    /// Reserve memory for a request
    fn allocate(&self, request: AllocationRequest) -> MemoryResult<Allocation>;

    /// Release a reservation made by `allocate`
    fn deallocate(&self, allocation: Allocation) -> MemoryResult<()>;

    /// Check if an allocation is live
    fn is_valid(&self, allocation: &Allocation) -> bool;
}

/// Memory statistics provider
pub trait MemoryInfo: Send + Sync {
    /// Snapshot of every memory type
    fn stats(&self) -> PoolStats;

    /// Bytes held in blocks and bytes still free in them
    fn info(&self) -> (u64, u64) {
        let stats = self.stats();
        (stats.total_block_bytes(), stats.total_available_bytes())
    }
}

impl<D: MemoryDevice> Allocator for DeviceMemoryPool<D> {
    fn allocate(&self, request: AllocationRequest) -> MemoryResult<Allocation> {
        DeviceMemoryPool::allocate(
            self,
            request.size,
            request.alignment,
            request.memory_type_index,
            request.flags,
        )
    }

    fn deallocate(&self, allocation: Allocation) -> MemoryResult<()> {
        DeviceMemoryPool::deallocate(self, allocation)
    }

    fn is_valid(&self, allocation: &Allocation) -> bool {
        if allocation.is_raw() {
            self.is_raw_allocation_valid(allocation)
        } else {
            self.is_allocation_valid(allocation)
        }
    }
}

impl<D: MemoryDevice> MemoryInfo for DeviceMemoryPool<D> {
    fn stats(&self) -> PoolStats {
        DeviceMemoryPool::stats(self)
    }
}
