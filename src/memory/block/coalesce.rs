/*!
 * Fragment Coalescing
 * Returning fragments to the unused set and merging neighbours
 */

use super::Block;
use crate::core::types::DeviceSize;
use crate::core::Identifier;
use crate::memory::types::{MemoryError, MemoryResult};
use tracing::trace;

impl Block {
    /// Release the used fragment `identifier`
    ///
    /// `offset` and `size` must describe the whole reserved fragment, padding
    /// included. Stale identifiers, double frees and mismatched ranges are
    /// rejected without touching the block.
    pub(crate) fn free(
        &mut self,
        identifier: Identifier,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> MemoryResult<()> {
        let invalid = |reason| MemoryError::InvalidAllocation { identifier, reason };

        let fragment = *self
            .fragments
            .get(identifier)
            .ok_or_else(|| invalid("stale fragment identifier"))?;
        let index = identifier.index();
        if !self.used_fragments.is_set(index) {
            return Err(invalid("fragment is not in use"));
        }
        if fragment.offset != offset || fragment.size != size {
            return Err(invalid("offset or size does not match the fragment"));
        }

        self.available_space += size;
        self.used_fragments.clear(index);

        let left_unused = fragment.has_previous() && self.unused_fragments.is_set(fragment.previous);
        let right_unused = fragment.has_next() && self.unused_fragments.is_set(fragment.next);

        if left_unused {
            // Fold this fragment, and the right neighbour if unused, into the left one
            let mut merged_size = fragment.size;
            let mut next = fragment.next;
            if right_unused {
                let right = self.retire(fragment.next)?;
                merged_size += right.size;
                next = right.next;
            }
            self.fragments.release(identifier);

            let left = self.fragment_at_mut(fragment.previous)?;
            left.size += merged_size;
            left.next = next;
            if next != super::NO_FRAGMENT {
                self.fragment_at_mut(next)?.previous = fragment.previous;
            }
            trace!(fragment = %identifier, into = fragment.previous, merged_right = right_unused, "fragment merged left");
        } else if right_unused {
            // Absorb the right neighbour and stay as the unused fragment
            let right = self.retire(fragment.next)?;
            let this = self.fragment_at_mut(index)?;
            this.size += right.size;
            this.next = right.next;
            if right.has_next() {
                self.fragment_at_mut(right.next)?.previous = index;
            }
            self.unused_fragments.set(index);
            trace!(fragment = %identifier, "fragment merged right");
        } else {
            self.unused_fragments.set(index);
            trace!(fragment = %identifier, "fragment freed without merge");
        }

        Ok(())
    }

    /// Drop unused fragment `index` from the list storage and unused set
    fn retire(&mut self, index: u32) -> MemoryResult<super::Fragment> {
        debug_assert!(self.unused_fragments.is_set(index));
        self.unused_fragments.clear(index);
        self.fragments
            .release_index(index)
            .ok_or_else(|| MemoryError::CorruptionDetected(format!("unused fragment {index} is not live")))
    }
}
