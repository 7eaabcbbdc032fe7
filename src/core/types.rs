/*!
 * Core Types
 * Common types used across the allocator
 */

/// Byte size or offset within device memory
pub type DeviceSize = u64;

/// Index of a native memory type as reported by the physical device
pub type MemoryTypeIndex = u8;

/// Index of a block inside its memory-type pool
pub type BlockIndex = u16;

/// Round `value` up to the next multiple of `alignment`
///
/// `alignment` must be a non-zero power of two. Returns `None` on overflow.
#[inline]
pub fn align_up(value: DeviceSize, alignment: DeviceSize) -> Option<DeviceSize> {
    debug_assert!(alignment.is_power_of_two());
    let mask = alignment - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Check whether `value` is a multiple of `alignment` (power of two)
#[inline]
pub fn is_aligned(value: DeviceSize, alignment: DeviceSize) -> bool {
    debug_assert!(alignment.is_power_of_two());
    value & (alignment - 1) == 0
}
