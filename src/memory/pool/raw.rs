/*!
 * Raw Allocation
 * One native memory object per allocation, no sub-division
 */

use super::DeviceMemoryPool;
use crate::core::types::{DeviceSize, MemoryTypeIndex};
use crate::memory::device::MemoryDevice;
use crate::memory::types::{Allocation, MemoryError, MemoryFlags, MemoryResult};
use tracing::{debug, error, warn};

impl<D: MemoryDevice> DeviceMemoryPool<D> {
    /// Create a dedicated memory object of exactly `size` bytes
    ///
    /// Used for host-mappable staging memory and when sub-allocation is
    /// compiled out. Costs one native allocation per call.
    pub fn allocate_raw(
        &self,
        size: DeviceSize,
        memory_type_index: MemoryTypeIndex,
        flags: MemoryFlags,
    ) -> MemoryResult<Allocation> {
        self.ensure_live()?;
        if size == 0 {
            return Err(MemoryError::ZeroSized);
        }
        let pool = self.memory_type(memory_type_index)?;

        let mut raw = pool.raw_memory.lock();
        self.ensure_live()?;
        if raw.is_full() {
            warn!(memory_type = memory_type_index, "Raw allocation table full");
            return Err(MemoryError::RawSlotsExhausted(memory_type_index));
        }

        let memory = self
            .device
            .create_memory(size, memory_type_index, flags)
            .map_err(|err| {
                warn!(memory_type = memory_type_index, size, error = %err, "Raw allocation failed");
                MemoryError::from(err)
            })?;

        let Some(identifier) = raw.acquire(memory) else {
            self.device.destroy_memory(memory);
            return Err(MemoryError::RawSlotsExhausted(memory_type_index));
        };

        debug!(memory_type = memory_type_index, size, raw = %identifier, "Raw allocation created");
        Ok(Allocation {
            memory,
            offset: 0,
            size,
            padding: 0,
            identifier,
            memory_type_index,
            block_index: None,
        })
    }

    /// Destroy the memory object behind a raw allocation
    pub fn deallocate_raw(&self, allocation: Allocation) -> MemoryResult<()> {
        let invalid = |reason| MemoryError::InvalidAllocation {
            identifier: allocation.identifier,
            reason,
        };

        self.ensure_live()?;
        if !allocation.is_raw() {
            return Err(invalid("pooled allocations must be freed with deallocate"));
        }
        let pool = self.memory_type(allocation.memory_type_index)?;

        let mut raw = pool.raw_memory.lock();
        self.ensure_live()?;
        if raw.get(allocation.identifier) != Some(&allocation.memory) {
            error!(
                memory_type = allocation.memory_type_index,
                raw = %allocation.identifier,
                "Rejected raw deallocation of unknown memory"
            );
            return Err(invalid("raw allocation is not live"));
        }

        raw.release(allocation.identifier);
        drop(raw);
        self.device.destroy_memory(allocation.memory);
        debug!(
            memory_type = allocation.memory_type_index,
            size = allocation.size,
            raw = %allocation.identifier,
            "Raw allocation destroyed"
        );
        Ok(())
    }
}
