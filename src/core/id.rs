/*!
 * Identifier Storage
 * Generation-checked slot table with identifier recycling
 */

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifier
// ============================================================================

/// Recyclable identifier with a generation salt
///
/// Index 0 is never handed out, so it doubles as the "none" link value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    index: u32,
    generation: u32,
}

impl Identifier {
    /// Identifier that never refers to a live slot
    pub const INVALID: Self = Self {
        index: 0,
        generation: 0,
    };

    #[inline]
    pub(crate) const fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation the slot had when this identifier was acquired
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether the identifier could refer to a slot at all
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.index != 0
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

// ============================================================================
// Identifier Storage
// ============================================================================

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Dense slot table keyed by recyclable identifiers
///
/// Released indices go onto a LIFO free list and are handed out again with a
/// bumped generation, so a stale identifier never aliases the new occupant.
///
/// # Performance
/// - O(1) acquire, release and lookup
/// - Slots are never shrunk; memory is bounded by the peak live count
#[derive(Debug)]
pub struct IdentifierStorage<T> {
    slots: Vec<Slot<T>>,
    free_indices: Vec<u32>,
    live: usize,
    max_len: Option<usize>,
}

impl<T> IdentifierStorage<T> {
    /// Create an unbounded storage
    pub fn new() -> Self {
        Self {
            // Slot 0 is the permanent "none" sentinel
            slots: vec![Slot {
                generation: 0,
                value: None,
            }],
            free_indices: Vec::new(),
            live: 0,
            max_len: None,
        }
    }

    /// Create a storage that refuses to hold more than `max_len` live values
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::new()
        }
    }

    /// Number of live values
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Whether another value can be acquired
    #[inline]
    pub fn is_full(&self) -> bool {
        self.max_len.map_or(false, |max| self.live >= max)
    }

    /// Store `value` and return its identifier
    ///
    /// Returns `None` if the storage is full or the index space is exhausted.
    pub fn acquire(&mut self, value: T) -> Option<Identifier> {
        if self.is_full() {
            return None;
        }

        let index = match self.free_indices.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).ok()?;
                self.slots.push(Slot {
                    generation: 1,
                    value: None,
                });
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none());
        slot.value = Some(value);
        self.live += 1;
        Some(Identifier::from_raw_parts(index, slot.generation))
    }

    /// Remove the value behind `identifier`, retiring the identifier
    pub fn release(&mut self, identifier: Identifier) -> Option<T> {
        if !self.contains(identifier) {
            return None;
        }
        self.release_index(identifier.index)
    }

    /// Remove whatever value currently lives at `index`
    pub fn release_index(&mut self, index: u32) -> Option<T> {
        if index == 0 {
            return None;
        }
        let slot = self.slots.get_mut(index as usize)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_indices.push(index);
        self.live -= 1;
        Some(value)
    }

    /// Whether `identifier` refers to a live value of the current generation
    #[inline]
    pub fn contains(&self, identifier: Identifier) -> bool {
        self.get(identifier).is_some()
    }

    pub fn get(&self, identifier: Identifier) -> Option<&T> {
        self.slots
            .get(identifier.index as usize)
            .filter(|slot| identifier.index != 0 && slot.generation == identifier.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Lookup by bare index, ignoring generations
    pub fn get_index(&self, index: u32) -> Option<&T> {
        if index == 0 {
            return None;
        }
        self.slots
            .get(index as usize)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Mutable lookup by bare index, ignoring generations
    pub fn get_index_mut(&mut self, index: u32) -> Option<&mut T> {
        if index == 0 {
            return None;
        }
        self.slots
            .get_mut(index as usize)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Full identifier of the value currently living at `index`
    pub fn active_identifier(&self, index: u32) -> Option<Identifier> {
        if index == 0 {
            return None;
        }
        self.slots
            .get(index as usize)
            .filter(|slot| slot.value.is_some())
            .map(|slot| Identifier::from_raw_parts(index, slot.generation))
    }

    /// Iterate live values in index order
    pub fn iter(&self) -> impl Iterator<Item = (Identifier, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Identifier::from_raw_parts(index as u32, slot.generation), value))
        })
    }

    /// Remove every live value, retiring all identifiers
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.live);
        for (index, slot) in self.slots.iter_mut().enumerate().skip(1) {
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_indices.push(index as u32);
                values.push(value);
            }
        }
        self.live = 0;
        values
    }
}

impl<T> Default for IdentifierStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
