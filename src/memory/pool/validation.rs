/*!
 * Allocation Validation and Introspection
 * Read-only diagnostics over live pool state
 */

use super::DeviceMemoryPool;
use crate::core::types::{BlockIndex, MemoryTypeIndex};
use crate::memory::block::Block;
use crate::memory::device::MemoryDevice;
use crate::memory::types::{Allocation, MemoryError, MemoryResult, PoolStats};

impl<D: MemoryDevice> DeviceMemoryPool<D> {
    /// Whether `allocation` is a live pooled reservation of this pool
    ///
    /// Checks memory type, block and fragment liveness and that the fragment
    /// still spans exactly the allocation's reserved range.
    pub fn is_allocation_valid(&self, allocation: &Allocation) -> bool {
        let Some(block_index) = allocation.block_index else {
            return false;
        };
        let Ok(pool) = self.memory_type(allocation.memory_type_index) else {
            return false;
        };

        let blocks = pool.blocks.read();
        let Some(block) = blocks.get(block_index as usize) else {
            return false;
        };
        if block.memory() != allocation.memory {
            return false;
        }

        let range = allocation.fragment_range();
        block.is_live_fragment(allocation.identifier, range.start, range.end - range.start)
    }

    /// Whether `allocation` is a live raw reservation of this pool
    pub fn is_raw_allocation_valid(&self, allocation: &Allocation) -> bool {
        if !allocation.is_raw() || allocation.offset != 0 {
            return false;
        }
        let Ok(pool) = self.memory_type(allocation.memory_type_index) else {
            return false;
        };
        let raw = pool.raw_memory.lock();
        raw.get(allocation.identifier) == Some(&allocation.memory)
    }

    /// Number of blocks created for a memory type
    pub fn block_count(&self, memory_type_index: MemoryTypeIndex) -> usize {
        self.memory_type(memory_type_index)
            .map_or(0, |pool| pool.blocks.read().len())
    }

    /// Run `inspect` against one block under the shared lock
    pub fn with_block<R>(
        &self,
        memory_type_index: MemoryTypeIndex,
        block_index: BlockIndex,
        inspect: impl FnOnce(&Block) -> R,
    ) -> Option<R> {
        let pool = self.memory_type(memory_type_index).ok()?;
        let blocks = pool.blocks.read();
        blocks.get(block_index as usize).map(inspect)
    }

    /// Check the fragment invariants of every block
    pub fn check_invariants(&self) -> MemoryResult<()> {
        for memory_type_index in 0..self.memory_type_count() {
            let pool = &self.pools[memory_type_index];
            for (block_index, block) in pool.blocks.read().iter().enumerate() {
                block.check_invariants().map_err(|err| {
                    MemoryError::CorruptionDetected(format!(
                        "memory type {memory_type_index} block {block_index}: {err}"
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Snapshot of every configured memory type
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            memory_types: self
                .memory_types
                .iter()
                .enumerate()
                .map(|(index, flags)| self.pools[index].stats(index as MemoryTypeIndex, *flags))
                .collect(),
        }
    }
}
