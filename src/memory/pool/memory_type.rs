/*!
 * Memory-Type Pool
 * Per memory type block list, out-of-memory latch and raw store
 */

use crate::core::types::MemoryTypeIndex;
use crate::core::IdentifierStorage;
use crate::memory::block::Block;
use crate::memory::types::{DeviceMemory, MemoryFlags, MemoryTypeStats};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};

/// Allocator state for one native memory type
///
/// Different memory types never contend: each has its own locks.
#[derive(Debug)]
pub(crate) struct MemoryTypePool {
    /// Blocks in creation order; a block's position is its index
    pub blocks: RwLock<Vec<Block>>,
    /// Once set, no further blocks are created for this type
    pub out_of_memory: AtomicBool,
    /// Standalone memory objects handed out by the raw path
    pub raw_memory: Mutex<IdentifierStorage<DeviceMemory>>,
}

impl MemoryTypePool {
    pub fn new(max_raw_allocations: usize) -> Self {
        Self {
            blocks: RwLock::new(Vec::new()),
            out_of_memory: AtomicBool::new(false),
            raw_memory: Mutex::new(IdentifierStorage::with_max_len(max_raw_allocations)),
        }
    }

    #[inline]
    pub fn is_out_of_memory(&self) -> bool {
        self.out_of_memory.load(Ordering::Acquire)
    }

    /// Set the latch, returning whether it was previously clear
    pub fn trip_out_of_memory(&self) -> bool {
        !self.out_of_memory.swap(true, Ordering::AcqRel)
    }

    pub fn reset_out_of_memory(&self) {
        self.out_of_memory.store(false, Ordering::Release);
    }

    /// Whether any native memory object is still owned by this pool
    pub fn holds_memory(&self) -> bool {
        !self.blocks.read().is_empty() || !self.raw_memory.lock().is_empty()
    }

    pub fn stats(&self, memory_type_index: MemoryTypeIndex, flags: MemoryFlags) -> MemoryTypeStats {
        let mut stats = MemoryTypeStats {
            memory_type_index,
            flags,
            out_of_memory: self.is_out_of_memory(),
            ..MemoryTypeStats::default()
        };

        {
            let blocks = self.blocks.read();
            stats.block_count = blocks.len();
            for block in blocks.iter() {
                stats.block_bytes += block.size();
                stats.available_bytes += block.available_space();
                stats.used_fragments += block.used_fragment_count();
                stats.unused_fragments += block.unused_fragment_count();
            }
        }

        let raw = self.raw_memory.lock();
        stats.raw_allocations = raw.len();
        stats.raw_bytes = raw.iter().map(|(_, memory)| memory.size()).sum();
        stats
    }
}
