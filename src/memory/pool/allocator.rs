/*!
 * Pooled Allocation
 * Block search, block growth and deallocation
 */

use super::memory_type::MemoryTypePool;
use super::DeviceMemoryPool;
use crate::config::PASSTHROUGH;
use crate::core::types::{align_up, BlockIndex, DeviceSize, MemoryTypeIndex};
use crate::memory::block::{Block, FragmentAllocation};
use crate::memory::device::MemoryDevice;
use crate::memory::types::{Allocation, MemoryError, MemoryFlags, MemoryResult};
use tracing::{debug, error, info, warn};

impl<D: MemoryDevice> DeviceMemoryPool<D> {
    /// Reserve `size` bytes aligned to `alignment` from a memory type
    ///
    /// The size is rounded up to the allocation granularity. Existing blocks
    /// are searched in creation order; if none fits a new block is created.
    /// Exhaustion is reported as an error the caller is expected to recover
    /// from, e.g. by deferring the resource.
    pub fn allocate(
        &self,
        size: DeviceSize,
        alignment: DeviceSize,
        memory_type_index: MemoryTypeIndex,
        flags: MemoryFlags,
    ) -> MemoryResult<Allocation> {
        if PASSTHROUGH {
            return self.allocate_raw(size, memory_type_index, flags);
        }

        self.ensure_live()?;
        if size == 0 {
            return Err(MemoryError::ZeroSized);
        }
        if !alignment.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(alignment));
        }
        let pool = self.memory_type(memory_type_index)?;
        let rounded = align_up(size, self.config.allocation_granularity)
            .ok_or(MemoryError::SizeOverflow(size))?;

        // Fragment search mutates the block, so scanning takes the write lock too
        let mut blocks = pool.blocks.write();
        self.ensure_live()?;

        for (block_index, block) in blocks.iter_mut().enumerate() {
            if block.available_space() < rounded {
                continue;
            }
            if let Some(reserved) = block.try_allocate(rounded, alignment) {
                let allocation = Self::describe(block, block_index, memory_type_index, rounded, reserved);
                debug!(
                    memory_type = memory_type_index,
                    block = block_index,
                    offset = allocation.offset(),
                    size = rounded,
                    "Allocated from existing block"
                );
                return Ok(allocation);
            }
        }

        if pool.is_out_of_memory() {
            debug!(
                memory_type = memory_type_index,
                size = rounded,
                "Memory type latched out of memory, not creating a block"
            );
            return Err(MemoryError::MemoryTypeExhausted {
                memory_type_index,
                requested: rounded,
            });
        }

        let block_index = self.grow(pool, &mut blocks, memory_type_index, flags, rounded)?;
        let block = &mut blocks[block_index];
        match block.try_allocate(rounded, alignment) {
            Some(reserved) => Ok(Self::describe(block, block_index, memory_type_index, rounded, reserved)),
            None => {
                error!(
                    memory_type = memory_type_index,
                    block = block_index,
                    size = rounded,
                    "Fresh block could not satisfy the request"
                );
                Err(MemoryError::CorruptionDetected(format!(
                    "new block {block_index} cannot fit {rounded} bytes"
                )))
            }
        }
    }

    /// Create a block able to hold `rounded` bytes and return its index
    ///
    /// Starts at `max(extra_block_size, rounded)` and halves on failure, never
    /// going below `rounded`. Sets the out-of-memory latch if nothing works.
    fn grow(
        &self,
        pool: &MemoryTypePool,
        blocks: &mut Vec<Block>,
        memory_type_index: MemoryTypeIndex,
        flags: MemoryFlags,
        rounded: DeviceSize,
    ) -> MemoryResult<usize> {
        let block_index = blocks.len();
        if block_index > BlockIndex::MAX as usize {
            return Err(MemoryError::BlockLimitReached(memory_type_index));
        }

        let flags = flags | MemoryFlags::ALLOCATE_DEVICE_ADDRESS;
        let mut block_size = self.config.extra_block_size.max(rounded);
        loop {
            match self.device.create_memory(block_size, memory_type_index, flags) {
                Ok(memory) => {
                    blocks.push(Block::new(memory));
                    info!(
                        memory_type = memory_type_index,
                        block = block_index,
                        block_size,
                        "Created memory block"
                    );
                    return Ok(block_index);
                }
                Err(err) if block_size > rounded => {
                    let halved = (block_size / 2).max(rounded);
                    warn!(
                        memory_type = memory_type_index,
                        block_size,
                        retry_size = halved,
                        error = %err,
                        "Block creation failed, retrying smaller"
                    );
                    block_size = halved;
                }
                Err(err) => {
                    if pool.trip_out_of_memory() {
                        error!(
                            memory_type = memory_type_index,
                            requested = rounded,
                            error = %err,
                            "Out of device memory, latching memory type"
                        );
                    }
                    return Err(MemoryError::OutOfDeviceMemory {
                        memory_type_index,
                        requested: rounded,
                    });
                }
            }
        }
    }

    fn describe(
        block: &Block,
        block_index: usize,
        memory_type_index: MemoryTypeIndex,
        size: DeviceSize,
        reserved: FragmentAllocation,
    ) -> Allocation {
        Allocation {
            memory: block.memory(),
            offset: reserved.offset + reserved.padding,
            size,
            padding: reserved.padding,
            identifier: reserved.identifier,
            memory_type_index,
            block_index: Some(block_index as BlockIndex),
        }
    }

    /// Return a pooled allocation to its block
    ///
    /// Double frees, stale handles and handles whose offset or size were
    /// altered are rejected with [`MemoryError::InvalidAllocation`].
    pub fn deallocate(&self, allocation: Allocation) -> MemoryResult<()> {
        let Some(block_index) = allocation.block_index else {
            if PASSTHROUGH {
                return self.deallocate_raw(allocation);
            }
            return Err(MemoryError::InvalidAllocation {
                identifier: allocation.identifier,
                reason: "raw allocations must be freed with deallocate_raw",
            });
        };

        self.ensure_live()?;
        let pool = self.memory_type(allocation.memory_type_index)?;
        let mut blocks = pool.blocks.write();
        self.ensure_live()?;

        let block = blocks
            .get_mut(block_index as usize)
            .filter(|block| block.memory() == allocation.memory)
            .ok_or(MemoryError::InvalidAllocation {
                identifier: allocation.identifier,
                reason: "allocation does not belong to a live block",
            })?;

        let range = allocation.fragment_range();
        if let Err(err) = block.free(allocation.identifier, range.start, range.end - range.start) {
            error!(
                memory_type = allocation.memory_type_index,
                block = block_index,
                error = %err,
                "Rejected deallocation"
            );
            return Err(err);
        }

        debug!(
            memory_type = allocation.memory_type_index,
            block = block_index,
            offset = allocation.offset,
            size = allocation.size,
            available = block.available_space(),
            "Deallocated"
        );
        Ok(())
    }
}
