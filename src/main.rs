/*!
 * Device Memory Pool - Demo Entry Point
 *
 * Runs a texture-streaming style workload against an in-process device
 * and prints the resulting pool statistics as JSON.
 */

use device_memory_pool::{
    init_tracing, DeviceMemoryPool, HostMemoryDevice, MemoryFlags, MemoryTypeIndex, PhysicalDevice,
    PoolConfig,
};
use std::collections::VecDeque;
use std::error::Error;
use tracing::{info, warn};

const MB: u64 = 1024 * 1024;

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let physical = PhysicalDevice::new(vec![
        MemoryFlags::DEVICE_LOCAL,
        MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
    ]);
    let device_local = physical
        .device_local_memory_type()
        .ok_or("no device-local memory type")?;

    let device = HostMemoryDevice::new(vec![512 * MB, 64 * MB]);
    let config = PoolConfig::from_env();
    let pool = DeviceMemoryPool::with_config(device, &physical, config)?;

    let result = run_workload(&pool, device_local);
    pool.destroy();
    result?;
    info!("Demo complete");
    Ok(())
}

/// Stream in mip chains of varying size, evicting the oldest every third frame
fn run_workload(
    pool: &DeviceMemoryPool<HostMemoryDevice>,
    device_local: MemoryTypeIndex,
) -> Result<(), Box<dyn Error>> {
    let mut resident = VecDeque::new();
    for frame in 0..64u64 {
        let size = (frame % 8 + 1) * 2 * MB + frame * 4096;
        match pool.allocate(size, 256, device_local, MemoryFlags::DEVICE_LOCAL) {
            Ok(allocation) => resident.push_back(allocation),
            Err(err) if err.is_exhaustion() => {
                warn!(frame, size, error = %err, "Deferring texture upload");
                continue;
            }
            Err(err) => return Err(err.into()),
        }
        if frame % 3 == 2 {
            if let Some(evicted) = resident.pop_front() {
                pool.deallocate(evicted)?;
            }
        }
    }

    let staging = pool.allocate_raw(8 * MB, 1, MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT)?;
    pool.check_invariants()?;

    println!("{}", serde_json::to_string_pretty(&pool.stats())?);

    pool.deallocate_raw(staging)?;
    for allocation in resident {
        pool.deallocate(allocation)?;
    }
    Ok(())
}
