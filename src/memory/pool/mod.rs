/*!
 * Device Memory Pool
 *
 * Sub-allocates native device memory for buffers and images.
 *
 * ## Structure
 *
 * - One [`MemoryTypePool`] per native memory type, each with its own lock
 * - Each memory-type pool owns a list of [`Block`]s, never freed before
 *   [`DeviceMemoryPool::destroy`]
 * - A raw fallback store per memory type for standalone memory objects
 *
 * ## Growth
 *
 * When no block fits a request a new block of `max(extra_block_size, size)`
 * is created, halving on native failure down to the request size. If even
 * that fails, the memory type is latched out of memory and later requests
 * that do not fit existing blocks fail without calling the device.
 */

mod allocator;
mod memory_type;
mod raw;
mod validation;

use crate::config::{PoolConfig, PASSTHROUGH};
use crate::core::limits::MAX_MEMORY_TYPES;
use crate::core::types::MemoryTypeIndex;
use crate::memory::block::Block;
use crate::memory::device::{MemoryDevice, PhysicalDevice};
use crate::memory::types::{MemoryError, MemoryFlags, MemoryResult};
use memory_type::MemoryTypePool;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Sub-allocator for all memory types of one logical device
///
/// Explicitly constructed per device and explicitly torn down with
/// [`destroy`](Self::destroy); dropping a pool that still owns memory is a
/// contract violation.
pub struct DeviceMemoryPool<D: MemoryDevice> {
    device: D,
    config: PoolConfig,
    memory_types: Vec<MemoryFlags>,
    pools: [MemoryTypePool; MAX_MEMORY_TYPES],
    destroyed: AtomicBool,
}

impl<D: MemoryDevice> DeviceMemoryPool<D> {
    /// Create a pool with the default configuration
    pub fn new(device: D, physical_device: &PhysicalDevice) -> MemoryResult<Self> {
        Self::with_config(device, physical_device, PoolConfig::default())
    }

    /// Create a pool and eagerly create the default device-local block
    ///
    /// Failure to create the eager block is not an error; the memory type
    /// simply starts without blocks.
    pub fn with_config(
        device: D,
        physical_device: &PhysicalDevice,
        config: PoolConfig,
    ) -> MemoryResult<Self> {
        config.validate()?;

        let pool = Self {
            device,
            config,
            memory_types: physical_device.memory_types().to_vec(),
            pools: std::array::from_fn(|_| MemoryTypePool::new(config.max_raw_allocations)),
            destroyed: AtomicBool::new(false),
        };

        info!(
            memory_types = pool.memory_types.len(),
            extra_block_size = config.extra_block_size,
            granularity = config.allocation_granularity,
            passthrough = PASSTHROUGH,
            "Device memory pool initialized"
        );

        if !PASSTHROUGH && config.preallocate_device_local {
            if let Some(memory_type_index) = physical_device.device_local_memory_type() {
                pool.preallocate(memory_type_index);
            }
        }

        Ok(pool)
    }

    fn preallocate(&self, memory_type_index: MemoryTypeIndex) {
        let size = self.config.default_pool_size;
        let flags = MemoryFlags::DEVICE_LOCAL | MemoryFlags::ALLOCATE_DEVICE_ADDRESS;
        match self.device.create_memory(size, memory_type_index, flags) {
            Ok(memory) => {
                self.pools[memory_type_index as usize]
                    .blocks
                    .write()
                    .push(Block::new(memory));
                info!(memory_type = memory_type_index, size, "Pre-allocated device-local block");
            }
            Err(err) => {
                warn!(
                    memory_type = memory_type_index,
                    size,
                    error = %err,
                    "Could not pre-allocate device-local block, starting empty"
                );
            }
        }
    }

    /// The native device this pool allocates from
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of memory types configured from the physical device
    pub fn memory_type_count(&self) -> usize {
        self.memory_types.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Whether the out-of-memory latch is set for a memory type
    pub fn is_out_of_memory(&self, memory_type_index: MemoryTypeIndex) -> bool {
        self.memory_type(memory_type_index)
            .map_or(false, MemoryTypePool::is_out_of_memory)
    }

    /// Clear the out-of-memory latch so block creation is attempted again
    pub fn reset_out_of_memory(&self, memory_type_index: MemoryTypeIndex) -> MemoryResult<()> {
        self.memory_type(memory_type_index)?.reset_out_of_memory();
        info!(memory_type = memory_type_index, "Out-of-memory latch reset");
        Ok(())
    }

    pub(crate) fn memory_type(&self, memory_type_index: MemoryTypeIndex) -> MemoryResult<&MemoryTypePool> {
        if (memory_type_index as usize) >= self.memory_types.len() {
            return Err(MemoryError::InvalidMemoryType(memory_type_index));
        }
        Ok(&self.pools[memory_type_index as usize])
    }

    fn ensure_live(&self) -> MemoryResult<()> {
        if self.is_destroyed() {
            return Err(MemoryError::Destroyed);
        }
        Ok(())
    }

    /// Destroy every block and raw memory object
    ///
    /// Outstanding allocations become invalid. Further allocation requests
    /// fail with [`MemoryError::Destroyed`]. Calling this twice is harmless.
    pub fn destroy(&self) {
        // Raised before draining so requests racing for a pool lock observe it
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut blocks_destroyed = 0;
        let mut raw_destroyed = 0;

        for pool in &self.pools {
            {
                let mut blocks = pool.blocks.write();
                for block in blocks.drain(..) {
                    self.device.destroy_memory(block.memory());
                    blocks_destroyed += 1;
                }
            }

            let mut raw = pool.raw_memory.lock();
            for memory in raw.drain() {
                self.device.destroy_memory(memory);
                raw_destroyed += 1;
            }
        }

        info!(blocks_destroyed, raw_destroyed, "Device memory pool destroyed");
    }
}

impl<D: MemoryDevice> Drop for DeviceMemoryPool<D> {
    fn drop(&mut self) {
        if self.is_destroyed() {
            return;
        }
        let leaked = self.pools.iter().any(MemoryTypePool::holds_memory);
        if leaked {
            error!("Device memory pool dropped without destroy, native memory leaked");
            if !std::thread::panicking() {
                debug_assert!(!leaked, "destroy must be called before dropping the pool");
            }
        }
    }
}
