/*!
 * Fragment
 * Linked-list node describing a byte range of a block
 */

use crate::core::types::DeviceSize;
use crate::core::Identifier;

/// Link value meaning "no neighbour"
pub(crate) const NO_FRAGMENT: u32 = 0;

/// One used or unused byte range of a block
///
/// Neighbours are linked by identifier index in address order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub offset: DeviceSize,
    pub size: DeviceSize,
    pub(crate) previous: u32,
    pub(crate) next: u32,
}

impl Fragment {
    pub(crate) fn root(size: DeviceSize) -> Self {
        Self {
            offset: 0,
            size,
            previous: NO_FRAGMENT,
            next: NO_FRAGMENT,
        }
    }

    #[inline]
    pub(crate) fn has_previous(&self) -> bool {
        self.previous != NO_FRAGMENT
    }

    #[inline]
    pub(crate) fn has_next(&self) -> bool {
        self.next != NO_FRAGMENT
    }
}

/// Snapshot of a fragment for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentInfo {
    pub identifier: Identifier,
    pub offset: DeviceSize,
    pub size: DeviceSize,
    pub used: bool,
}

/// Fragment reserved by a successful search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FragmentAllocation {
    pub identifier: Identifier,
    /// Start of the reserved fragment, before alignment padding
    pub offset: DeviceSize,
    /// Reserved bytes including padding
    pub size: DeviceSize,
    pub padding: DeviceSize,
}
