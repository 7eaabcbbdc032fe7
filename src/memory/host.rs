/*!
 * Host Memory Device
 * In-process memory backend with per-type byte budgets
 *
 * Stands in for a graphics driver: every memory object is bookkeeping only,
 * no host bytes are reserved. Counters make creation behaviour observable.
 */

use super::device::{DeviceError, MemoryDevice};
use super::types::{DeviceMemory, MemoryFlags};
use crate::core::types::{DeviceSize, MemoryTypeIndex};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

#[derive(Debug, Default)]
struct HostState {
    used: Vec<DeviceSize>,
    live: HashMap<u64, DeviceMemory>,
}

/// Memory backend that enforces a byte budget per memory type
#[derive(Debug)]
pub struct HostMemoryDevice {
    budgets: Vec<DeviceSize>,
    max_allocation_size: Option<DeviceSize>,
    state: Mutex<HostState>,
    next_id: AtomicU64,
    create_attempts: AtomicU64,
    failed_creations: AtomicU64,
    destroyed: AtomicU64,
}

impl HostMemoryDevice {
    /// One budget entry per memory type index
    pub fn new(budgets: Vec<DeviceSize>) -> Self {
        let used = vec![0; budgets.len()];
        Self {
            budgets,
            max_allocation_size: None,
            state: Mutex::new(HostState {
                used,
                live: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
            create_attempts: AtomicU64::new(0),
            failed_creations: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
        }
    }

    /// Device with `memory_type_count` types and no budget limit
    pub fn unlimited(memory_type_count: usize) -> Self {
        Self::new(vec![DeviceSize::MAX; memory_type_count])
    }

    /// Reject single objects larger than `size`, like a driver allocation cap
    pub fn with_max_allocation_size(mut self, size: DeviceSize) -> Self {
        self.max_allocation_size = Some(size);
        self
    }

    /// Total `create_memory` calls, successful or not
    pub fn create_attempts(&self) -> u64 {
        self.create_attempts.load(Ordering::Relaxed)
    }

    pub fn failed_creations(&self) -> u64 {
        self.failed_creations.load(Ordering::Relaxed)
    }

    pub fn destroyed_count(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }

    /// Number of memory objects not yet destroyed
    pub fn live_objects(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Bytes currently held by live objects of one memory type
    pub fn used_bytes(&self, memory_type_index: MemoryTypeIndex) -> DeviceSize {
        self.state
            .lock()
            .used
            .get(memory_type_index as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Sizes of the live objects of one memory type, ascending
    pub fn live_object_sizes(&self, memory_type_index: MemoryTypeIndex) -> Vec<DeviceSize> {
        let state = self.state.lock();
        let mut sizes: Vec<DeviceSize> = state
            .live
            .values()
            .filter(|memory| memory.memory_type_index == memory_type_index)
            .map(|memory| memory.size)
            .collect();
        sizes.sort_unstable();
        sizes
    }

    fn reject(&self, error: DeviceError) -> Result<DeviceMemory, DeviceError> {
        self.failed_creations.fetch_add(1, Ordering::Relaxed);
        Err(error)
    }
}

impl MemoryDevice for HostMemoryDevice {
    fn create_memory(
        &self,
        size: DeviceSize,
        memory_type_index: MemoryTypeIndex,
        flags: MemoryFlags,
    ) -> Result<DeviceMemory, DeviceError> {
        self.create_attempts.fetch_add(1, Ordering::Relaxed);

        let Some(&budget) = self.budgets.get(memory_type_index as usize) else {
            return self.reject(DeviceError::UnsupportedMemoryType(memory_type_index));
        };

        let mut state = self.state.lock();
        let used = state.used[memory_type_index as usize];
        let available = budget - used;
        let over_cap = self.max_allocation_size.map_or(false, |max| size > max);
        if size > available || over_cap {
            drop(state);
            return self.reject(DeviceError::OutOfMemory {
                requested: size,
                available,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let memory = DeviceMemory::new(id, size, memory_type_index, flags);
        state.used[memory_type_index as usize] = used + size;
        state.live.insert(id, memory);
        trace!(id, size, memory_type = memory_type_index, "host memory object created");
        Ok(memory)
    }

    fn destroy_memory(&self, memory: DeviceMemory) {
        let mut state = self.state.lock();
        match state.live.remove(&memory.id) {
            Some(live) => {
                let slot = &mut state.used[live.memory_type_index as usize];
                *slot -= live.size;
                self.destroyed.fetch_add(1, Ordering::Relaxed);
                trace!(id = memory.id, size = live.size, "host memory object destroyed");
            }
            None => warn!(id = memory.id, "destroy of unknown or already destroyed memory object"),
        }
    }
}
