/*!
 * Native Device Interfaces
 * Memory object creation/destruction and memory type capabilities
 */

use super::types::{DeviceMemory, MemoryFlags};
use crate::core::limits::MAX_MEMORY_TYPES;
use crate::core::types::{DeviceSize, MemoryTypeIndex};
use miette::Diagnostic;
use thiserror::Error;

/// Errors reported by the native memory backend
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum DeviceError {
    #[error("Device out of memory: requested {requested} bytes, {available} bytes available")]
    #[diagnostic(code(device::out_of_memory))]
    OutOfMemory {
        requested: DeviceSize,
        available: DeviceSize,
    },

    #[error("Memory type {0} is not supported by the device")]
    #[diagnostic(code(device::unsupported_memory_type))]
    UnsupportedMemoryType(MemoryTypeIndex),
}

/// Logical device able to create native memory objects
///
/// Creating memory may be expensive and the number of live objects may be
/// limited by the driver, which is why the pool sub-allocates.
pub trait MemoryDevice: Send + Sync {
    /// Create one native memory object of exactly `size` bytes
    fn create_memory(
        &self,
        size: DeviceSize,
        memory_type_index: MemoryTypeIndex,
        flags: MemoryFlags,
    ) -> Result<DeviceMemory, DeviceError>;

    /// Destroy a memory object previously returned by `create_memory`
    fn destroy_memory(&self, memory: DeviceMemory);
}

/// Memory type capabilities of a physical device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhysicalDevice {
    memory_types: Vec<MemoryFlags>,
}

impl PhysicalDevice {
    /// Describe a device from its memory type flags, index order preserved
    ///
    /// Types beyond [`MAX_MEMORY_TYPES`] are ignored.
    pub fn new(mut memory_types: Vec<MemoryFlags>) -> Self {
        memory_types.truncate(MAX_MEMORY_TYPES);
        Self { memory_types }
    }

    pub fn memory_types(&self) -> &[MemoryFlags] {
        &self.memory_types
    }

    pub fn memory_type_count(&self) -> usize {
        self.memory_types.len()
    }

    pub fn memory_type_flags(&self, index: MemoryTypeIndex) -> Option<MemoryFlags> {
        self.memory_types.get(index as usize).copied()
    }

    /// First memory type whose flags contain all of `required`
    pub fn find_memory_type(&self, required: MemoryFlags) -> Option<MemoryTypeIndex> {
        self.memory_types
            .iter()
            .position(|flags| flags.contains(required))
            .map(|index| index as MemoryTypeIndex)
    }

    pub fn device_local_memory_type(&self) -> Option<MemoryTypeIndex> {
        self.find_memory_type(MemoryFlags::DEVICE_LOCAL)
    }
}
