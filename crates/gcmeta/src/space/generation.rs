//! Tenured Generation - A Growable Contiguous Space Inside a Reservation
//!
//! ```text
//! reserved.start()                                     reserved.end()
//!   │◄──────── committed (space) ────────►│◄──── uncommitted ────►│
//!   bottom                     top       end
//! ```
//!
//! Committed size always moves in whole cards, and the space's offset table
//! is resized with it.

use super::{BlockSize, ContiguousSpace};
use crate::error::{GcMetaError, Result};
use crate::heap::mem_region::MemRegion;
use crate::util::{bytes_to_words, debug::format_bytes, Alignment};

/// TenuredGeneration - old-generation space with a fixed reservation
pub struct TenuredGeneration {
    reserved: MemRegion,
    space: ContiguousSpace,
    card_size: usize,
}

impl TenuredGeneration {
    /// Create a generation reserving `reserved` and committing
    /// `initial_bytes` (rounded up to a card)
    pub fn new(reserved: MemRegion, initial_bytes: usize, card_size: usize) -> Result<Self> {
        let initial = Alignment::align_up(initial_bytes, card_size);
        crate::ensure!(
            initial <= reserved.byte_size(),
            GcMetaError::InvalidArgument(format!(
                "initial size {} exceeds reservation {}",
                format_bytes(initial),
                format_bytes(reserved.byte_size())
            ))
        );

        let space = ContiguousSpace::new(reserved, bytes_to_words(initial), card_size)?;
        log::debug!(
            "tenured generation reserved {} committed {}",
            reserved,
            format_bytes(initial)
        );

        Ok(Self {
            reserved,
            space,
            card_size,
        })
    }

    /// Commit `bytes` more (rounded up to a card)
    ///
    /// # Errors
    /// `OutOfMemory` if the reservation cannot hold the expansion, or if the
    /// offset table cannot grow with it.
    pub fn expand_by(&mut self, bytes: usize) -> Result<()> {
        let delta = Alignment::align_up(bytes, self.card_size);
        let new_end = self
            .space
            .end()
            .checked_add(delta)
            .filter(|&end| end <= self.reserved.end())
            .ok_or(GcMetaError::OutOfMemory {
                requested: delta,
                what: "tenured generation expansion",
            })?;

        self.space.set_end(new_end)?;
        log::debug!(
            "tenured generation expanded by {} to {}",
            format_bytes(delta),
            format_bytes(self.capacity())
        );
        Ok(())
    }

    /// Uncommit `bytes` (rounded down to a card) from the end
    ///
    /// # Errors
    /// `InvalidArgument` if the shrink would cut into allocated blocks.
    pub fn shrink_by(&mut self, bytes: usize) -> Result<()> {
        let delta = Alignment::align_down(bytes, self.card_size);
        if delta == 0 {
            return Ok(());
        }

        let new_end = self.space.end().saturating_sub(delta);
        crate::ensure!(
            new_end >= self.space.top() && new_end >= self.space.bottom(),
            GcMetaError::InvalidArgument(format!(
                "cannot shrink by {}: {} in use",
                format_bytes(delta),
                format_bytes(self.used())
            ))
        );

        self.space.set_end(new_end)?;
        log::debug!(
            "tenured generation shrunk by {} to {}",
            format_bytes(delta),
            format_bytes(self.capacity())
        );
        Ok(())
    }

    pub fn allocate(&self, word_size: usize) -> Option<usize> {
        self.space.allocate(word_size)
    }

    /// Allocate, growing the generation first if the space is full
    pub fn expand_and_allocate(&mut self, word_size: usize) -> Result<usize> {
        if let Some(addr) = self.space.allocate(word_size) {
            return Ok(addr);
        }

        let shortfall = crate::util::words_to_bytes(word_size).saturating_sub(self.space.free());
        self.expand_by(shortfall)?;
        self.space.allocate(word_size).ok_or(GcMetaError::OutOfMemory {
            requested: crate::util::words_to_bytes(word_size),
            what: "tenured allocation",
        })
    }

    pub fn block_start<S: BlockSize + ?Sized>(&self, addr: usize, sizer: &S) -> usize {
        self.space.block_start(addr, sizer)
    }

    /// Committed bytes
    pub fn capacity(&self) -> usize {
        self.space.capacity()
    }

    pub fn used(&self) -> usize {
        self.space.used()
    }

    pub fn reserved(&self) -> MemRegion {
        self.reserved
    }

    pub fn space(&self) -> &ContiguousSpace {
        &self.space
    }

    pub fn space_mut(&mut self) -> &mut ContiguousSpace {
        &mut self.space
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::MB;

    const BASE: usize = 0x8000_0000;

    fn generation() -> TenuredGeneration {
        TenuredGeneration::new(MemRegion::new(BASE, MB), 64 * 1024, 512).unwrap()
    }

    #[test]
    fn test_expand_resizes_offset_table() {
        let mut gen = generation();
        let before = gen.space().offset_table().covered_end();

        gen.expand_by(1000).unwrap();
        assert_eq!(gen.capacity(), 64 * 1024 + 1024);
        assert_eq!(gen.space().offset_table().covered_end(), before + 1024);
    }

    #[test]
    fn test_expand_beyond_reservation_fails() {
        let mut gen = generation();
        let err = gen.expand_by(8 * MB).unwrap_err();
        assert!(matches!(err, GcMetaError::OutOfMemory { .. }));
        assert_eq!(gen.capacity(), 64 * 1024);
    }

    #[test]
    fn test_shrink_refuses_to_cut_allocated_blocks() {
        let mut gen = generation();
        gen.allocate(4096).unwrap();
        assert!(gen.shrink_by(64 * 1024 - 1024).is_err());
        gen.shrink_by(32 * 1024).unwrap();
        assert_eq!(gen.capacity(), 32 * 1024);
    }

    #[test]
    fn test_expand_and_allocate() {
        let mut gen = generation();
        assert!(gen.allocate(16 * 1024).is_none());
        let addr = gen.expand_and_allocate(16 * 1024).unwrap();
        assert_eq!(addr, BASE);
        assert_eq!(gen.used(), 128 * 1024);
        assert_eq!(gen.block_start(BASE + 100_000, &|_: usize| 16 * 1024usize), BASE);
    }
}
