//! MemRegion - Heap Address Range Descriptor
//!
//! A `(start, word_size)` pair. Used to tell side tables the exact range of
//! heap they cover.

use crate::util::{constants::HEAP_WORD_SIZE, words_to_bytes};
use std::fmt;

/// Half-open address range `[start, start + word_size * 8)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemRegion {
    start: usize,
    word_size: usize,
}

impl MemRegion {
    /// Create region from start address and size in words
    pub fn new(start: usize, word_size: usize) -> Self {
        debug_assert!(start % HEAP_WORD_SIZE == 0, "start must be word aligned");
        Self { start, word_size }
    }

    /// Create region from `[start, end)` byte addresses
    pub fn from_bounds(start: usize, end: usize) -> Self {
        debug_assert!(end >= start);
        Self::new(start, (end - start) / HEAP_WORD_SIZE)
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.start + words_to_bytes(self.word_size)
    }

    pub fn word_size(&self) -> usize {
        self.word_size
    }

    pub fn byte_size(&self) -> usize {
        words_to_bytes(self.word_size)
    }

    pub fn is_empty(&self) -> bool {
        self.word_size == 0
    }

    /// Check if address lies inside the region
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end()
    }

    /// Check if `other` lies entirely inside the region
    pub fn contains_region(&self, other: &MemRegion) -> bool {
        other.is_empty() || (other.start >= self.start && other.end() <= self.end())
    }
}

impl fmt::Display for MemRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end())
    }
}
