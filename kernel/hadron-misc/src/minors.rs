//! Dynamic minor allocator.
//!
//! One bit per minor in `0..capacity`, packed into `u64` words.
//! Bit = 1 means taken, bit = 0 means free. Dynamic allocation scans from
//! the top of the range downward so the low, traditionally static minors
//! stay free the longest.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

const BITS_PER_WORD: usize = 64;

/// Returned by [`MinorAllocator::allocate_dynamic`] when every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted;

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dynamic minor pool exhausted")
    }
}

/// Bitmap over the dynamic minor range.
#[derive(Debug, Clone)]
pub struct MinorAllocator {
    bitmap: Vec<u64>,
    capacity: usize,
    in_use: usize,
    reserve_zero: bool,
}

impl MinorAllocator {
    /// Creates an allocator for minors `0..capacity`, all free.
    ///
    /// With `reserve_zero`, minor 0 is never handed out by
    /// [`allocate_dynamic`](Self::allocate_dynamic); only a fixed
    /// registration can take it, and releasing it frees it as usual.
    #[must_use]
    pub fn new(capacity: usize, reserve_zero: bool) -> Self {
        Self {
            bitmap: vec![0; capacity.div_ceil(BITS_PER_WORD)],
            capacity,
            in_use: 0,
            reserve_zero,
        }
    }

    /// Returns the pool size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of taken minors.
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Returns `true` if `minor` is inside the managed range.
    pub fn contains(&self, minor: u32) -> bool {
        (minor as usize) < self.capacity
    }

    /// Returns `true` if `minor` is inside the range and marked taken.
    pub fn is_used(&self, minor: u32) -> bool {
        if !self.contains(minor) {
            return false;
        }
        let (word_idx, bit_idx) = split(minor);
        self.bitmap[word_idx] & (1u64 << bit_idx) != 0
    }

    /// Takes the highest free minor.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] when every allocatable minor is taken.
    pub fn allocate_dynamic(&mut self) -> Result<u32, Exhausted> {
        for word_idx in (0..self.bitmap.len()).rev() {
            let free = !self.bitmap[word_idx] & self.valid_mask(word_idx);
            if free == 0 {
                continue;
            }

            // Highest set bit of the free mask is the highest free minor.
            let bit_idx = BITS_PER_WORD - 1 - free.leading_zeros() as usize;
            self.bitmap[word_idx] |= 1u64 << bit_idx;
            self.in_use += 1;

            #[allow(clippy::cast_possible_truncation)]
            return Ok((word_idx * BITS_PER_WORD + bit_idx) as u32);
        }

        Err(Exhausted)
    }

    /// Marks a specific minor taken. Minors outside the range are ignored.
    ///
    /// Used for fixed minors that happen to fall inside the dynamic range.
    /// Marking an already-taken minor is a caller bug; it is not reported.
    pub fn mark_used(&mut self, minor: u32) {
        if !self.contains(minor) {
            return;
        }
        let (word_idx, bit_idx) = split(minor);
        let bit = 1u64 << bit_idx;
        if self.bitmap[word_idx] & bit == 0 {
            self.bitmap[word_idx] |= bit;
            self.in_use += 1;
        }
    }

    /// Returns a minor to the pool.
    ///
    /// Minors outside the range and free minors are no-ops. Returns `true`
    /// if a bit was cleared.
    pub fn release(&mut self, minor: u32) -> bool {
        if !self.contains(minor) {
            return false;
        }
        let (word_idx, bit_idx) = split(minor);
        let bit = 1u64 << bit_idx;
        if self.bitmap[word_idx] & bit == 0 {
            return false;
        }
        self.bitmap[word_idx] &= !bit;
        self.in_use -= 1;
        true
    }

    /// Mask of the bits in `word_idx` that dynamic allocation may hand out.
    fn valid_mask(&self, word_idx: usize) -> u64 {
        let start = word_idx * BITS_PER_WORD;
        let bits = (self.capacity - start).min(BITS_PER_WORD);
        let mask = if bits == BITS_PER_WORD {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        };
        if word_idx == 0 && self.reserve_zero {
            mask & !1
        } else {
            mask
        }
    }
}

fn split(minor: u32) -> (usize, usize) {
    let idx = minor as usize;
    (idx / BITS_PER_WORD, idx % BITS_PER_WORD)
}
