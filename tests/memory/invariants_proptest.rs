/*!
 * Fragment Invariant Property Tests
 * Random allocate/free sequences must keep every block well formed
 */

#![cfg(not(feature = "passthrough"))]

use device_memory_pool::{
    Allocation, DeviceMemoryPool, DeviceSize, HostMemoryDevice, MemoryFlags, PhysicalDevice,
    PoolConfig,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Allocate { size: DeviceSize, alignment_shift: u32 },
    Free { pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1..=96 * 1024u64, 0..=14u32)
            .prop_map(|(size, alignment_shift)| Op::Allocate { size, alignment_shift }),
        2 => any::<usize>().prop_map(|pick| Op::Free { pick }),
    ]
}

fn pool() -> DeviceMemoryPool<HostMemoryDevice> {
    let physical = PhysicalDevice::new(vec![MemoryFlags::DEVICE_LOCAL]);
    let config = PoolConfig::default()
        .with_extra_block_size(512 * 1024)
        .with_preallocation(false);
    DeviceMemoryPool::with_config(HostMemoryDevice::unlimited(1), &physical, config).unwrap()
}

fn assert_disjoint(live: &[Allocation]) {
    for (i, a) in live.iter().enumerate() {
        for b in &live[i + 1..] {
            if a.memory() == b.memory() {
                let (x, y) = (a.fragment_range(), b.fragment_range());
                assert!(x.end <= y.start || y.end <= x.start, "{x:?} overlaps {y:?}");
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_blocks_stay_well_formed(ops in prop::collection::vec(op(), 1..200)) {
        let pool = pool();
        let mut live: Vec<Allocation> = Vec::new();

        for op in ops {
            match op {
                Op::Allocate { size, alignment_shift } => {
                    let alignment: DeviceSize = 1 << alignment_shift;
                    let allocation = pool.allocate(size, alignment, 0, MemoryFlags::DEVICE_LOCAL).unwrap();
                    prop_assert_eq!(allocation.offset() % alignment, 0);
                    prop_assert!(allocation.size() >= size);
                    prop_assert!(allocation.range().end <= allocation.memory().size());
                    live.push(allocation);
                }
                Op::Free { pick } if !live.is_empty() => {
                    let allocation = live.swap_remove(pick % live.len());
                    pool.deallocate(allocation).unwrap();
                    prop_assert!(!pool.is_allocation_valid(&allocation));
                }
                Op::Free { .. } => {}
            }
            prop_assert!(pool.check_invariants().is_ok());
        }

        assert_disjoint(&live);
        for allocation in &live {
            prop_assert!(pool.is_allocation_valid(allocation));
        }

        for allocation in live.drain(..) {
            pool.deallocate(allocation).unwrap();
        }
        for block_index in 0..pool.block_count(0) {
            let (empty, fragments) = pool
                .with_block(0, block_index as u16, |block| {
                    (block.available_space() == block.size(), block.fragments_in_order().len())
                })
                .unwrap();
            prop_assert!(empty);
            prop_assert_eq!(fragments, 1);
        }
        pool.destroy();
    }
}
