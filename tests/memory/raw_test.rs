/*!
 * Raw Allocation Tests
 * Dedicated memory objects and the passthrough build
 */

use device_memory_pool::{
    DeviceMemoryPool, HostMemoryDevice, MemoryError, MemoryFlags, PhysicalDevice, PoolConfig,
};
use pretty_assertions::assert_eq;

fn pool() -> DeviceMemoryPool<HostMemoryDevice> {
    let physical = PhysicalDevice::new(vec![
        MemoryFlags::DEVICE_LOCAL,
        MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
    ]);
    let config = PoolConfig::default().with_preallocation(false);
    DeviceMemoryPool::with_config(HostMemoryDevice::unlimited(2), &physical, config).unwrap()
}

#[test]
fn test_staging_buffers_get_dedicated_memory() {
    let pool = pool();
    let flags = MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT;

    let staging: Vec<_> = (1..=4)
        .map(|i| pool.allocate_raw(i * 1000, 1, flags).unwrap())
        .collect();

    for (i, allocation) in staging.iter().enumerate() {
        assert!(allocation.is_raw());
        assert_eq!(allocation.offset(), 0);
        assert_eq!(allocation.size(), (i as u64 + 1) * 1000);
        assert_eq!(allocation.memory().flags(), flags);
        assert!(pool.is_raw_allocation_valid(allocation));
        assert!(!pool.is_allocation_valid(allocation));
    }
    assert_eq!(pool.device().live_objects(), 4);
    assert_eq!(pool.stats().memory_types[1].raw_bytes, 10_000);

    for allocation in staging {
        pool.deallocate_raw(allocation).unwrap();
        assert!(!pool.is_raw_allocation_valid(&allocation));
    }
    assert_eq!(pool.device().live_objects(), 0);
    pool.destroy();
}

#[test]
fn test_raw_rejects_bad_requests() {
    let pool = pool();
    assert_eq!(
        pool.allocate_raw(0, 1, MemoryFlags::HOST_VISIBLE),
        Err(MemoryError::ZeroSized)
    );
    assert_eq!(
        pool.allocate_raw(4096, 9, MemoryFlags::HOST_VISIBLE),
        Err(MemoryError::InvalidMemoryType(9))
    );
    assert_eq!(pool.device().create_attempts(), 0);
    pool.destroy();
}

#[cfg(not(feature = "passthrough"))]
#[test]
fn test_pooled_handle_rejected_by_raw_free() {
    let pool = pool();
    let pooled = pool.allocate(4096, 1, 0, MemoryFlags::DEVICE_LOCAL).unwrap();

    assert!(matches!(
        pool.deallocate_raw(pooled),
        Err(MemoryError::InvalidAllocation { .. })
    ));
    assert!(pool.is_allocation_valid(&pooled));

    pool.deallocate(pooled).unwrap();
    pool.destroy();
}

#[cfg(feature = "passthrough")]
#[test]
fn test_passthrough_allocates_raw() {
    let pool = pool();
    let allocation = pool.allocate(100, 256, 0, MemoryFlags::DEVICE_LOCAL).unwrap();

    assert!(allocation.is_raw());
    assert_eq!(allocation.size(), 100);
    assert_eq!(pool.block_count(0), 0);
    assert!(pool.is_raw_allocation_valid(&allocation));

    pool.deallocate(allocation).unwrap();
    assert_eq!(pool.device().live_objects(), 0);
    pool.destroy();
}
