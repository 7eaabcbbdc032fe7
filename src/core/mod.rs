/*!
 * Core Module
 * Fundamental types, limits and data structures
 */

pub mod bitset;
pub mod id;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use bitset::BitSet;
pub use id::{Identifier, IdentifierStorage};
pub use types::*;
