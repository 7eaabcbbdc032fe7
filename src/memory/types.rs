/*!
 * Memory Types
 * Common types for device memory sub-allocation
 */

use super::device::DeviceError;
use crate::core::types::{BlockIndex, DeviceSize, MemoryTypeIndex};
use crate::core::Identifier;
use bitflags::bitflags;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum MemoryError {
    #[error("Cannot allocate zero bytes")]
    #[diagnostic(code(memory::zero_sized))]
    ZeroSized,

    #[error("Invalid alignment {0}: must be a non-zero power of two")]
    #[diagnostic(code(memory::invalid_alignment))]
    InvalidAlignment(DeviceSize),

    #[error("Memory type {0} is not configured on this device")]
    #[diagnostic(
        code(memory::invalid_memory_type),
        help("Query the physical device for supported memory type indices.")
    )]
    InvalidMemoryType(MemoryTypeIndex),

    #[error("Allocation size {0} overflows the device address range")]
    #[diagnostic(code(memory::size_overflow))]
    SizeOverflow(DeviceSize),

    #[error("Out of device memory: memory type {memory_type_index} could not fit {requested} bytes")]
    #[diagnostic(
        code(memory::out_of_device_memory),
        help("Free unused resources and retry; the memory type stays latched until reset.")
    )]
    OutOfDeviceMemory {
        memory_type_index: MemoryTypeIndex,
        requested: DeviceSize,
    },

    #[error("Memory type {memory_type_index} is exhausted, refusing to create blocks for {requested} bytes")]
    #[diagnostic(
        code(memory::memory_type_exhausted),
        help("A previous block creation failed. Deallocate to free space in existing blocks.")
    )]
    MemoryTypeExhausted {
        memory_type_index: MemoryTypeIndex,
        requested: DeviceSize,
    },

    #[error("Memory type {0} reached the maximum number of blocks")]
    #[diagnostic(code(memory::block_limit_reached))]
    BlockLimitReached(MemoryTypeIndex),

    #[error("Memory type {0} has no free raw allocation slots")]
    #[diagnostic(code(memory::raw_slots_exhausted))]
    RawSlotsExhausted(MemoryTypeIndex),

    #[error("Invalid allocation {identifier}: {reason}")]
    #[diagnostic(
        code(memory::invalid_allocation),
        help("The allocation was already freed, belongs to another pool, or was modified.")
    )]
    InvalidAllocation {
        identifier: Identifier,
        reason: &'static str,
    },

    #[error("Fragment list corruption detected: {0}")]
    #[diagnostic(code(memory::corruption_detected))]
    CorruptionDetected(String),

    #[error("Invalid pool configuration: {0}")]
    #[diagnostic(code(memory::invalid_config))]
    InvalidConfig(String),

    #[error("Device memory pool has been destroyed")]
    #[diagnostic(code(memory::destroyed))]
    Destroyed,

    #[error(transparent)]
    #[diagnostic(code(memory::device))]
    Device(#[from] DeviceError),
}

impl MemoryError {
    /// Whether the caller may retry later once memory pressure drops
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            MemoryError::OutOfDeviceMemory { .. }
                | MemoryError::MemoryTypeExhausted { .. }
                | MemoryError::BlockLimitReached(_)
                | MemoryError::RawSlotsExhausted(_)
                | MemoryError::Device(DeviceError::OutOfMemory { .. })
        )
    }
}

bitflags! {
    /// Native memory property flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MemoryFlags: u32 {
        /// Memory local to the GPU
        const DEVICE_LOCAL = 1 << 0;
        /// Memory the host can map
        const HOST_VISIBLE = 1 << 1;
        /// Host writes need no explicit flush
        const HOST_COHERENT = 1 << 2;
        /// Host reads are cached
        const HOST_CACHED = 1 << 3;
        /// Backing may be committed lazily
        const LAZILY_ALLOCATED = 1 << 4;
        /// Buffers bound here may query device addresses
        const ALLOCATE_DEVICE_ADDRESS = 1 << 5;
    }
}

/// View of one native device memory object
///
/// Copyable and inert: the pool owning it is responsible for destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceMemory {
    pub(crate) id: u64,
    pub(crate) size: DeviceSize,
    pub(crate) memory_type_index: MemoryTypeIndex,
    pub(crate) flags: MemoryFlags,
}

impl DeviceMemory {
    /// Construct a view of a native object; used by [`MemoryDevice`](super::MemoryDevice) implementations
    pub fn new(id: u64, size: DeviceSize, memory_type_index: MemoryTypeIndex, flags: MemoryFlags) -> Self {
        Self {
            id,
            size,
            memory_type_index,
            flags,
        }
    }

    /// Backend-specific handle value
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> DeviceSize {
        self.size
    }

    pub fn memory_type_index(&self) -> MemoryTypeIndex {
        self.memory_type_index
    }

    pub fn flags(&self) -> MemoryFlags {
        self.flags
    }
}

/// Handle to a live reservation
///
/// `offset` is already aligned to the requested alignment and is the value
/// resources should be bound at. Alignment padding in front of it is still
/// owned by the reservation and released with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    pub(crate) memory: DeviceMemory,
    pub(crate) offset: DeviceSize,
    pub(crate) size: DeviceSize,
    pub(crate) padding: DeviceSize,
    pub(crate) identifier: Identifier,
    pub(crate) memory_type_index: MemoryTypeIndex,
    pub(crate) block_index: Option<BlockIndex>,
}

impl Allocation {
    pub fn memory(&self) -> DeviceMemory {
        self.memory
    }

    /// Aligned byte offset into [`memory`](Self::memory)
    pub fn offset(&self) -> DeviceSize {
        self.offset
    }

    /// Usable bytes starting at [`offset`](Self::offset)
    pub fn size(&self) -> DeviceSize {
        self.size
    }

    /// Bytes skipped in front of `offset` to satisfy alignment
    pub fn padding(&self) -> DeviceSize {
        self.padding
    }

    pub fn identifier(&self) -> Identifier {
        self.identifier
    }

    pub fn memory_type_index(&self) -> MemoryTypeIndex {
        self.memory_type_index
    }

    /// Block the allocation was carved from; `None` for raw allocations
    pub fn block_index(&self) -> Option<BlockIndex> {
        self.block_index
    }

    pub fn is_raw(&self) -> bool {
        self.block_index.is_none()
    }

    /// Usable range `[offset, offset + size)`
    pub fn range(&self) -> Range<DeviceSize> {
        self.offset..self.offset + self.size
    }

    /// Whole reserved range including alignment padding
    pub fn fragment_range(&self) -> Range<DeviceSize> {
        (self.offset - self.padding)..(self.offset + self.size)
    }
}

/// Allocation request
#[derive(Debug, Clone, Copy)]
pub struct AllocationRequest {
    pub size: DeviceSize,
    pub alignment: DeviceSize,
    pub memory_type_index: MemoryTypeIndex,
    pub flags: MemoryFlags,
}

impl AllocationRequest {
    pub fn new(size: DeviceSize, memory_type_index: MemoryTypeIndex) -> Self {
        Self {
            size,
            alignment: 1,
            memory_type_index,
            flags: MemoryFlags::empty(),
        }
    }

    pub fn with_alignment(mut self, alignment: DeviceSize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_flags(mut self, flags: MemoryFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Per memory type statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryTypeStats {
    pub memory_type_index: MemoryTypeIndex,
    pub flags: MemoryFlags,
    pub block_count: usize,
    pub block_bytes: DeviceSize,
    pub available_bytes: DeviceSize,
    pub used_fragments: usize,
    pub unused_fragments: usize,
    pub raw_allocations: usize,
    pub raw_bytes: DeviceSize,
    pub out_of_memory: bool,
}

impl MemoryTypeStats {
    /// Bytes reserved out of pooled blocks
    pub fn used_bytes(&self) -> DeviceSize {
        self.block_bytes - self.available_bytes
    }
}

/// Pool-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub memory_types: Vec<MemoryTypeStats>,
}

impl PoolStats {
    pub fn total_block_bytes(&self) -> DeviceSize {
        self.memory_types.iter().map(|t| t.block_bytes).sum()
    }

    pub fn total_available_bytes(&self) -> DeviceSize {
        self.memory_types.iter().map(|t| t.available_bytes).sum()
    }

    pub fn total_blocks(&self) -> usize {
        self.memory_types.iter().map(|t| t.block_count).sum()
    }

    pub fn total_raw_allocations(&self) -> usize {
        self.memory_types.iter().map(|t| t.raw_allocations).sum()
    }
}
