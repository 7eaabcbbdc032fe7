/*!
 * Fragment Search
 * Placement of new allocations inside a block
 */

use super::fragment::{Fragment, FragmentAllocation};
use super::Block;
use crate::core::types::{align_up, is_aligned, DeviceSize};
use tracing::trace;

/// How a candidate fragment satisfies a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Carve `size + padding` off the front, remainder stays unused
    Split { padding: DeviceSize },
    /// Fragment matches exactly and is already aligned
    Whole,
}

impl Block {
    /// Reserve `size` bytes aligned to `alignment`
    ///
    /// Address-ordered first fit: of all unused fragments that can hold the
    /// request, the one at the lowest offset wins, so holes freed near the
    /// start of the block are refilled before the tail remainder is split.
    /// Returns `None` when no unused fragment can hold the request.
    pub(crate) fn try_allocate(
        &mut self,
        size: DeviceSize,
        alignment: DeviceSize,
    ) -> Option<FragmentAllocation> {
        debug_assert!(size > 0);
        if self.available_space < size {
            return None;
        }

        let (index, placement) = self.find_fit(size, alignment)?;
        let reserved = match placement {
            Placement::Split { padding } => self.split_front(index, size, padding),
            Placement::Whole => self.claim_whole(index),
        };

        if let Some(reserved) = reserved {
            trace!(
                fragment = %reserved.identifier,
                offset = reserved.offset,
                size = reserved.size,
                padding = reserved.padding,
                "fragment reserved"
            );
        }
        reserved
    }

    /// Lowest-addressed unused fragment able to hold the request
    fn find_fit(&self, size: DeviceSize, alignment: DeviceSize) -> Option<(u32, Placement)> {
        self.unused_fragments
            .iter_set()
            .filter_map(|index| {
                let fragment = self.fragments.get_index(index)?;
                let padding = align_up(fragment.offset, alignment)? - fragment.offset;
                let reserved = size.checked_add(padding)?;

                let placement = if fragment.size > reserved {
                    Placement::Split { padding }
                } else if fragment.size == size && is_aligned(fragment.offset, alignment) {
                    Placement::Whole
                } else {
                    return None;
                };
                Some((fragment.offset, index, placement))
            })
            .min_by_key(|(offset, _, _)| *offset)
            .map(|(_, index, placement)| (index, placement))
    }

    /// Split a new used fragment off the front of unused fragment `index`
    fn split_front(
        &mut self,
        index: u32,
        size: DeviceSize,
        padding: DeviceSize,
    ) -> Option<FragmentAllocation> {
        let reserved = size + padding;
        let remainder = *self.fragments.get_index(index)?;

        let identifier = self.fragments.acquire(Fragment {
            offset: remainder.offset,
            size: reserved,
            previous: remainder.previous,
            next: index,
        })?;

        if remainder.has_previous() {
            self.fragments.get_index_mut(remainder.previous)?.next = identifier.index();
        }

        let shrunk = self.fragments.get_index_mut(index)?;
        shrunk.previous = identifier.index();
        shrunk.offset += reserved;
        shrunk.size -= reserved;

        debug_assert!(!self.unused_fragments.is_set(identifier.index()));
        self.used_fragments.set(identifier.index());
        self.available_space -= reserved;

        Some(FragmentAllocation {
            identifier,
            offset: remainder.offset,
            size: reserved,
            padding,
        })
    }

    /// Move unused fragment `index` into the used set unchanged
    fn claim_whole(&mut self, index: u32) -> Option<FragmentAllocation> {
        let identifier = self.fragments.active_identifier(index)?;
        let fragment = *self.fragments.get(identifier)?;

        self.unused_fragments.clear(index);
        self.used_fragments.set(index);
        self.available_space -= fragment.size;

        Some(FragmentAllocation {
            identifier,
            offset: fragment.offset,
            size: fragment.size,
            padding: 0,
        })
    }
}
