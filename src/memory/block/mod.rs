/*!
 * Memory Block
 *
 * One native memory object divided into fragments. Fragments form a doubly
 * linked list in address order that tiles `[0, size)` exactly; every fragment
 * is either used or unused, mirrored by two bit sets for fast iteration.
 *
 * ## Operations
 *
 * - **Search**: lowest-address first fit over unused fragments, splitting
 *   the front off larger fragments
 * - **Free**: coalesces with unused neighbours so no two adjacent fragments
 *   are ever both unused
 */

mod coalesce;
mod fragment;
mod search;

pub use fragment::{Fragment, FragmentInfo};
pub(crate) use fragment::FragmentAllocation;

use super::types::{DeviceMemory, MemoryError, MemoryResult};
use crate::core::types::DeviceSize;
use crate::core::{BitSet, Identifier, IdentifierStorage};
use fragment::NO_FRAGMENT;

/// Sub-allocated native memory object
#[derive(Debug)]
pub struct Block {
    memory: DeviceMemory,
    /// Sum of unused fragment sizes, only a fast reject
    available_space: DeviceSize,
    fragments: IdentifierStorage<Fragment>,
    used_fragments: BitSet,
    unused_fragments: BitSet,
}

impl Block {
    /// Wrap a freshly created memory object with one unused root fragment
    pub fn new(memory: DeviceMemory) -> Self {
        let mut fragments = IdentifierStorage::new();
        let mut unused_fragments = BitSet::new();
        if let Some(root) = fragments.acquire(Fragment::root(memory.size)) {
            unused_fragments.set(root.index());
        }

        Self {
            memory,
            available_space: memory.size,
            fragments,
            used_fragments: BitSet::new(),
            unused_fragments,
        }
    }

    pub fn memory(&self) -> DeviceMemory {
        self.memory
    }

    pub fn size(&self) -> DeviceSize {
        self.memory.size
    }

    pub fn available_space(&self) -> DeviceSize {
        self.available_space
    }

    pub fn used_fragment_count(&self) -> usize {
        self.used_fragments.count()
    }

    pub fn unused_fragment_count(&self) -> usize {
        self.unused_fragments.count()
    }

    /// Whether nothing is allocated from this block
    pub fn is_empty(&self) -> bool {
        self.used_fragments.is_empty()
    }

    /// Whether `identifier` is a live used fragment spanning exactly `[offset, offset + size)`
    pub fn is_live_fragment(&self, identifier: Identifier, offset: DeviceSize, size: DeviceSize) -> bool {
        match self.fragments.get(identifier) {
            Some(fragment) => {
                fragment.offset == offset
                    && fragment.size == size
                    && self.used_fragments.is_set(identifier.index())
                    && !self.unused_fragments.is_set(identifier.index())
            }
            None => false,
        }
    }

    /// Fragments in address order
    pub fn fragments_in_order(&self) -> Vec<FragmentInfo> {
        let mut ordered = Vec::with_capacity(self.fragments.len());
        let head = self
            .fragments
            .iter()
            .find(|(_, fragment)| !fragment.has_previous());

        let mut cursor = head.map(|(identifier, _)| identifier.index());
        while let Some(index) = cursor {
            // Bail out on cycles instead of looping forever
            if ordered.len() > self.fragments.len() {
                break;
            }
            let (Some(identifier), Some(fragment)) = (
                self.fragments.active_identifier(index),
                self.fragments.get_index(index),
            ) else {
                break;
            };
            ordered.push(FragmentInfo {
                identifier,
                offset: fragment.offset,
                size: fragment.size,
                used: self.used_fragments.is_set(index),
            });
            cursor = fragment.has_next().then_some(fragment.next);
        }
        ordered
    }

    /// Verify the structural invariants of the fragment list
    ///
    /// Checks tiling of `[0, size)`, link symmetry, exclusive set membership,
    /// no adjacent unused fragments and `available_space` bookkeeping.
    pub fn check_invariants(&self) -> MemoryResult<()> {
        let corrupt = |detail: String| Err(MemoryError::CorruptionDetected(detail));

        let heads = self
            .fragments
            .iter()
            .filter(|(_, fragment)| !fragment.has_previous())
            .count();
        if heads != 1 {
            return corrupt(format!("expected one head fragment, found {heads}"));
        }

        let ordered = self.fragments_in_order();
        if ordered.len() != self.fragments.len() {
            return corrupt(format!(
                "walked {} fragments but {} are live",
                ordered.len(),
                self.fragments.len()
            ));
        }

        let mut expected_offset = 0;
        let mut unused_bytes = 0;
        let mut previous_unused = false;
        for (position, info) in ordered.iter().enumerate() {
            let index = info.identifier.index();
            if info.offset != expected_offset {
                return corrupt(format!(
                    "fragment {} starts at {} instead of {}",
                    info.identifier, info.offset, expected_offset
                ));
            }
            if info.size == 0 {
                return corrupt(format!("fragment {} is empty", info.identifier));
            }

            let used = self.used_fragments.is_set(index);
            let unused = self.unused_fragments.is_set(index);
            if used == unused {
                return corrupt(format!(
                    "fragment {} used={} unused={}",
                    info.identifier, used, unused
                ));
            }
            if unused && previous_unused {
                return corrupt(format!(
                    "fragment {} and its predecessor are both unused",
                    info.identifier
                ));
            }

            if position > 0 {
                let expected_previous = ordered[position - 1].identifier.index();
                let linked = self.fragments.get_index(index).map(|f| f.previous);
                if linked != Some(expected_previous) {
                    return corrupt(format!(
                        "fragment {} links back to {:?}, expected {}",
                        info.identifier, linked, expected_previous
                    ));
                }
            }

            if unused {
                unused_bytes += info.size;
            }
            previous_unused = unused;
            expected_offset += info.size;
        }

        if expected_offset != self.size() {
            return corrupt(format!(
                "fragments cover {} of {} bytes",
                expected_offset,
                self.size()
            ));
        }
        if unused_bytes != self.available_space {
            return corrupt(format!(
                "available space {} but unused fragments hold {}",
                self.available_space, unused_bytes
            ));
        }
        if self.used_fragments.count() + self.unused_fragments.count() != self.fragments.len() {
            return corrupt("bit sets track fragments that are not live".to_string());
        }

        Ok(())
    }

    fn fragment_at_mut(&mut self, index: u32) -> MemoryResult<&mut Fragment> {
        debug_assert_ne!(index, NO_FRAGMENT);
        self.fragments
            .get_index_mut(index)
            .ok_or_else(|| MemoryError::CorruptionDetected(format!("dangling fragment link {index}")))
    }
}
