/*!
 * Pool Scenario Tests
 * Sub-allocation, reuse, growth, coalescing and exhaustion through the public API
 */

#![cfg(not(feature = "passthrough"))]

use device_memory_pool::memory::FragmentInfo;
use device_memory_pool::{
    Allocation, AllocationRequest, Allocator, DeviceMemoryPool, DeviceSize, HostMemoryDevice,
    MemoryError, MemoryFlags, MemoryInfo, PhysicalDevice, PoolConfig,
};
use pretty_assertions::assert_eq;

const KB: DeviceSize = 1024;
const MB: DeviceSize = 1024 * 1024;

fn physical() -> PhysicalDevice {
    PhysicalDevice::new(vec![
        MemoryFlags::DEVICE_LOCAL,
        MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
    ])
}

fn pool_with(device: HostMemoryDevice, extra_block_size: DeviceSize) -> DeviceMemoryPool<HostMemoryDevice> {
    let config = PoolConfig::default()
        .with_extra_block_size(extra_block_size)
        .with_preallocation(false);
    DeviceMemoryPool::with_config(device, &physical(), config).unwrap()
}

fn pool() -> DeviceMemoryPool<HostMemoryDevice> {
    pool_with(HostMemoryDevice::unlimited(2), MB)
}

fn allocate(pool: &DeviceMemoryPool<HostMemoryDevice>, size: DeviceSize, alignment: DeviceSize) -> Allocation {
    pool.allocate(size, alignment, 0, MemoryFlags::DEVICE_LOCAL)
        .unwrap()
}

fn layout(pool: &DeviceMemoryPool<HostMemoryDevice>, block_index: u16) -> Vec<FragmentInfo> {
    pool.with_block(0, block_index, |block| block.fragments_in_order())
        .unwrap()
}

#[test]
fn test_freed_middle_region_is_reused() {
    let pool = pool();

    let first = allocate(&pool, KB, 256);
    let middle = allocate(&pool, KB, 256);
    let last = allocate(&pool, KB, 256);
    assert_eq!(first.offset(), 0);
    assert_eq!(middle.offset(), 4 * KB);
    assert_eq!(last.offset(), 8 * KB);
    assert_eq!(pool.block_count(0), 1);

    pool.deallocate(middle).unwrap();
    let reused = allocate(&pool, KB, 256);

    assert_eq!(reused.offset(), middle.offset());
    assert_eq!(reused.memory(), first.memory());
    assert_eq!(pool.block_count(0), 1);
    assert_eq!(pool.device().create_attempts(), 1);
    pool.check_invariants().unwrap();
    pool.destroy();
}

#[test]
fn test_oversized_request_gets_its_own_block() {
    let pool = pool();
    let small = allocate(&pool, 4 * KB, 1);
    let large = allocate(&pool, 3 * MB, 1);

    assert_eq!(pool.block_count(0), 2);
    assert_eq!(large.block_index(), Some(1));
    assert_ne!(large.memory(), small.memory());
    assert!(large.memory().size() >= 3 * MB);
    assert_eq!(large.offset(), 0);

    // Exactly filled, so the block holds one used fragment and nothing else
    let fragments = layout(&pool, 1);
    assert_eq!(fragments.len(), 1);
    assert!(fragments[0].used);

    pool.deallocate(large).unwrap();
    pool.deallocate(small).unwrap();
    pool.check_invariants().unwrap();
    pool.destroy();
}

#[test]
fn test_reverse_order_free_coalesces_block() {
    let pool = pool();
    let allocations: Vec<_> = (1..=6).map(|i| allocate(&pool, i * 3 * KB, 1)).collect();
    assert_eq!(pool.block_count(0), 1);

    for allocation in allocations.into_iter().rev() {
        pool.deallocate(allocation).unwrap();
        pool.check_invariants().unwrap();
    }

    let fragments = layout(&pool, 0);
    assert_eq!(fragments.len(), 1);
    assert_eq!((fragments[0].offset, fragments[0].size, fragments[0].used), (0, MB, false));
    assert_eq!(
        pool.with_block(0, 0, |block| block.available_space()),
        Some(MB)
    );
    pool.destroy();
}

#[test]
fn test_interleaved_free_coalesces_block() {
    let pool = pool();
    let allocations: Vec<_> = (0..8).map(|_| allocate(&pool, 8 * KB, 1)).collect();

    // Free the even slots first so every odd free merges on both sides
    for allocation in allocations.iter().step_by(2) {
        pool.deallocate(*allocation).unwrap();
    }
    assert_eq!(pool.with_block(0, 0, |block| block.unused_fragment_count()), Some(5));

    for allocation in allocations.iter().skip(1).step_by(2) {
        pool.deallocate(*allocation).unwrap();
        pool.check_invariants().unwrap();
    }
    assert_eq!(layout(&pool, 0).len(), 1);
    pool.destroy();
}

#[test]
fn test_offsets_honour_alignment() {
    let pool = pool();
    let _misaligning = allocate(&pool, 4 * KB, 1);

    for shift in [8, 12, 14, 16] {
        let alignment: DeviceSize = 1 << shift;
        let allocation = allocate(&pool, 5 * KB, alignment);
        assert_eq!(allocation.offset() % alignment, 0, "alignment {alignment}");
        assert_eq!(allocation.size(), 8 * KB);
        assert!(allocation.fragment_range().start <= allocation.offset());
    }

    pool.check_invariants().unwrap();
    pool.destroy();
}

#[test]
fn test_allocations_do_not_overlap() {
    let pool = pool();
    let allocations: Vec<_> = (0..32)
        .map(|i| allocate(&pool, (i % 5 + 1) * 3 * KB, 1 << (i % 10)))
        .collect();

    for (i, a) in allocations.iter().enumerate() {
        for b in &allocations[i + 1..] {
            if a.memory() != b.memory() {
                continue;
            }
            let disjoint = a.range().end <= b.range().start || b.range().end <= a.range().start;
            assert!(disjoint, "{:?} overlaps {:?}", a.range(), b.range());
        }
    }
    pool.destroy();
}

#[test]
fn test_exhaustion_latches_memory_type() {
    let device = HostMemoryDevice::new(vec![2 * MB, u64::MAX]);
    let pool = pool_with(device, MB);

    let first = allocate(&pool, MB, 1);
    let _second = allocate(&pool, MB, 1);
    assert_eq!(pool.block_count(0), 2);

    let err = pool.allocate(4 * KB, 1, 0, MemoryFlags::DEVICE_LOCAL).unwrap_err();
    assert_eq!(
        err,
        MemoryError::OutOfDeviceMemory {
            memory_type_index: 0,
            requested: 4 * KB,
        }
    );
    assert!(err.is_exhaustion());
    assert!(pool.is_out_of_memory(0));

    // Latched: no further native calls for requests that do not fit
    let attempts = pool.device().create_attempts();
    let err = pool.allocate(4 * KB, 1, 0, MemoryFlags::DEVICE_LOCAL).unwrap_err();
    assert!(matches!(err, MemoryError::MemoryTypeExhausted { .. }));
    assert_eq!(pool.device().create_attempts(), attempts);

    // Existing blocks still serve requests that fit
    pool.deallocate(first).unwrap();
    let refill = allocate(&pool, 4 * KB, 1);
    assert_eq!(refill.block_index(), Some(0));
    assert_eq!(pool.device().create_attempts(), attempts);

    // Other memory types are unaffected
    assert!(pool.allocate(4 * KB, 1, 1, MemoryFlags::HOST_VISIBLE).is_ok());
    pool.destroy();
}

#[test]
fn test_reset_out_of_memory_retries_device() {
    let device = HostMemoryDevice::new(vec![MB, MB]);
    let pool = pool_with(device, MB);

    let _full = allocate(&pool, MB, 1);
    assert!(pool.allocate(4 * KB, 1, 0, MemoryFlags::DEVICE_LOCAL).is_err());
    assert!(pool.is_out_of_memory(0));

    pool.reset_out_of_memory(0).unwrap();
    assert!(!pool.is_out_of_memory(0));

    let attempts = pool.device().create_attempts();
    assert!(pool.allocate(4 * KB, 1, 0, MemoryFlags::DEVICE_LOCAL).is_err());
    assert!(pool.device().create_attempts() > attempts);
    pool.destroy();
}

#[test]
fn test_double_free_rejected_without_corruption() {
    let pool = pool();
    let a = allocate(&pool, 4 * KB, 1);
    let b = allocate(&pool, 4 * KB, 1);

    pool.deallocate(a).unwrap();
    assert!(matches!(
        pool.deallocate(a),
        Err(MemoryError::InvalidAllocation { .. })
    ));
    assert!(!pool.is_allocation_valid(&a));
    assert!(pool.is_allocation_valid(&b));
    pool.check_invariants().unwrap();

    pool.deallocate(b).unwrap();
    pool.destroy();
}

#[test]
fn test_destroy_releases_everything() {
    let pool = pool();
    let pooled = allocate(&pool, 64 * KB, 1);
    let _large = allocate(&pool, 2 * MB, 1);
    let _raw = pool.allocate_raw(4 * KB, 1, MemoryFlags::HOST_VISIBLE).unwrap();
    assert_eq!(pool.device().live_objects(), 3);

    pool.destroy();
    assert_eq!(pool.device().live_objects(), 0);
    assert_eq!(pool.block_count(0), 0);
    assert!(!pool.is_allocation_valid(&pooled));
    assert_eq!(pool.deallocate(pooled), Err(MemoryError::Destroyed));
    assert_eq!(
        pool.allocate_raw(4 * KB, 1, MemoryFlags::HOST_VISIBLE),
        Err(MemoryError::Destroyed)
    );
}

#[test]
fn test_preallocated_block_serves_first_requests() {
    let config = PoolConfig::default().with_default_pool_size(8 * MB);
    let pool = DeviceMemoryPool::with_config(HostMemoryDevice::unlimited(2), &physical(), config).unwrap();
    assert_eq!(pool.block_count(0), 1);

    let allocation = allocate(&pool, 2 * MB, 256);
    assert_eq!(allocation.block_index(), Some(0));
    assert_eq!(pool.device().create_attempts(), 1);

    pool.deallocate(allocation).unwrap();
    pool.destroy();
}

#[test]
fn test_allocator_trait_object() {
    let pool = pool();
    let allocator: &dyn Allocator = &pool;

    let request = AllocationRequest::new(10 * KB, 0)
        .with_alignment(4 * KB)
        .with_flags(MemoryFlags::DEVICE_LOCAL);
    let allocation = allocator.allocate(request).unwrap();
    assert_eq!(allocation.size(), 12 * KB);
    assert!(allocator.is_valid(&allocation));

    let (block_bytes, available) = pool.info();
    assert_eq!(block_bytes, MB);
    assert_eq!(available, MB - 12 * KB);

    allocator.deallocate(allocation).unwrap();
    assert!(!allocator.is_valid(&allocation));
    pool.destroy();
}

#[test]
fn test_stats_serialize() {
    let pool = pool();
    let _allocation = allocate(&pool, 4 * KB, 1);

    let json = serde_json::to_value(pool.stats()).unwrap();
    let device_local = &json["memory_types"][0];
    assert_eq!(device_local["block_count"], 1);
    assert_eq!(device_local["used_fragments"], 1);
    assert_eq!(device_local["out_of_memory"], false);
    pool.destroy();
}
