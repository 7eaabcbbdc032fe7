/*!
 * Memory Module
 * Device memory sub-allocation
 */

pub mod block;
pub mod device;
pub mod host;
pub mod pool;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use block::{Block, Fragment, FragmentInfo};
pub use device::{DeviceError, MemoryDevice, PhysicalDevice};
pub use host::HostMemoryDevice;
pub use pool::DeviceMemoryPool;
pub use traits::*;
pub use types::*;
