/*!
 * Dynamic Bit Set
 * Growable bit set with set-bit iteration
 */

const WORD_BITS: u32 = u64::BITS;

/// Growable bit set indexed by `u32`
///
/// # Performance
/// - Iteration cost is proportional to the number of words plus set bits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    #[inline]
    fn locate(index: u32) -> (usize, u64) {
        ((index / WORD_BITS) as usize, 1u64 << (index % WORD_BITS))
    }

    pub fn set(&mut self, index: u32) {
        let (word, mask) = Self::locate(index);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= mask;
    }

    pub fn clear(&mut self, index: u32) {
        let (word, mask) = Self::locate(index);
        if let Some(bits) = self.words.get_mut(word) {
            *bits &= !mask;
        }
    }

    #[inline]
    pub fn is_set(&self, index: u32) -> bool {
        let (word, mask) = Self::locate(index);
        self.words.get(word).map_or(false, |bits| bits & mask != 0)
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Iterate set indices in ascending order
    pub fn iter_set(&self) -> SetBits<'_> {
        SetBits {
            words: &self.words,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

/// Iterator over the set indices of a [`BitSet`]
pub struct SetBits<'a> {
    words: &'a [u64],
    word_index: usize,
    current: u64,
}

impl Iterator for SetBits<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros();
                // Clear lowest set bit
                self.current &= self.current - 1;
                return Some(self.word_index as u32 * WORD_BITS + bit);
            }
            self.word_index += 1;
            self.current = *self.words.get(self.word_index)?;
        }
    }
}
