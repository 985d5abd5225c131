//! Contiguous Space - Bump Allocation Backed by a Block-Offset Table
//!
//! ```text
//! bottom                     top                          end
//!   │◄──── allocated blocks ────►│◄──────── free ─────────►│
//! ```
//!
//! Every block handed out by `allocate` or placed by a `Compactor` is recorded
//! in the space's block-offset table, so `block_start` can answer for any
//! address below `top` after a bounded table walk and a short forward scan.

use super::BlockSize;
use crate::card::BlockOffsetTable;
use crate::error::Result;
use crate::heap::mem_region::MemRegion;
use crate::util::{bytes_to_words, words_to_bytes};
use std::sync::atomic::{AtomicUsize, Ordering};

/// ContiguousSpace - `[bottom, end)` with an atomic bump pointer
pub struct ContiguousSpace {
    bottom: usize,
    top: AtomicUsize,
    end: usize,
    bot: BlockOffsetTable,
}

impl ContiguousSpace {
    /// Create a space at the start of `reserved` with `committed_words`
    /// usable words
    pub fn new(reserved: MemRegion, committed_words: usize, card_size: usize) -> Result<Self> {
        let bot = BlockOffsetTable::new(reserved, committed_words, card_size)?;
        let bottom = reserved.start();

        Ok(Self {
            bottom,
            top: AtomicUsize::new(bottom),
            end: bottom + words_to_bytes(committed_words),
            bot,
        })
    }

    /// Bump-allocate `word_size` words
    ///
    /// Lock-free; returns `None` when the space cannot fit the request.
    pub fn allocate(&self, word_size: usize) -> Option<usize> {
        debug_assert!(word_size > 0, "empty allocation");
        let size = words_to_bytes(word_size);
        let mut current_top = self.top.load(Ordering::Relaxed);

        loop {
            let new_top = current_top.checked_add(size)?;
            if new_top > self.end {
                return None;
            }

            match self.top.compare_exchange_weak(
                current_top,
                new_top,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.bot.update_for_block(current_top, new_top);
                    return Some(current_top);
                }
                Err(actual) => current_top = actual,
            }
        }
    }

    /// Start of the block containing `addr`
    ///
    /// Addresses at or above `top` answer `top`.
    pub fn block_start<S: BlockSize + ?Sized>(&self, addr: usize, sizer: &S) -> usize {
        let top = self.top();
        if addr >= top {
            return top;
        }

        crate::assert_context!(
            addr >= self.bottom,
            "{:#x} below space bottom {:#x}",
            addr,
            self.bottom
        );

        let mut cur = self.bot.block_start_reaching_into_card(addr);
        loop {
            let words = sizer.block_size_in_words(cur);
            crate::assert_context!(words > 0, "zero-sized block at {:#x}", cur);
            let next = cur + words_to_bytes(words);
            if next > addr {
                return cur;
            }
            cur = next;
        }
    }

    /// Move `end`, resizing the offset table to match
    ///
    /// # Panics
    /// If `new_end` would cut off allocated blocks.
    pub fn set_end(&mut self, new_end: usize) -> Result<()> {
        crate::assert_context!(
            new_end >= self.top() && new_end >= self.bottom,
            "new end {:#x} below top {:#x}",
            new_end,
            self.top()
        );
        self.bot.resize(bytes_to_words(new_end - self.bottom))?;
        self.end = new_end;
        Ok(())
    }

    /// Drop every block
    pub fn clear(&mut self) {
        *self.top.get_mut() = self.bottom;
    }

    /// Re-place live blocks from the bottom of the space
    pub fn begin_compaction(&mut self) -> Compactor<'_> {
        Compactor {
            compact_top: self.bottom,
            space: self,
        }
    }

    pub fn bottom(&self) -> usize {
        self.bottom
    }

    pub fn top(&self) -> usize {
        self.top.load(Ordering::Acquire)
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn capacity(&self) -> usize {
        self.end - self.bottom
    }

    pub fn used(&self) -> usize {
        self.top() - self.bottom
    }

    pub fn free(&self) -> usize {
        self.end - self.top()
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.bottom && addr < self.end
    }

    pub fn offset_table(&self) -> &BlockOffsetTable {
        &self.bot
    }
}

/// Compactor - places surviving blocks one after another from `bottom`
///
/// Holds the space exclusively, so no allocation can interleave with the
/// compaction. The space's `top` only moves when `finish` is called.
pub struct Compactor<'a> {
    space: &'a mut ContiguousSpace,
    compact_top: usize,
}

impl Compactor<'_> {
    /// Destination for the next surviving block of `word_size` words
    ///
    /// Returns `None` if the block does not fit below `end`.
    pub fn compact_block(&mut self, word_size: usize) -> Option<usize> {
        let dest = self.compact_top;
        let new_top = dest.checked_add(words_to_bytes(word_size))?;
        if new_top > self.space.end {
            return None;
        }

        self.space.bot.update_for_block(dest, new_top);
        self.compact_top = new_top;
        Some(dest)
    }

    /// Where the next block would go
    pub fn compact_top(&self) -> usize {
        self.compact_top
    }

    /// Publish the compacted `top` and return it
    pub fn finish(self) -> usize {
        self.space.top.store(self.compact_top, Ordering::Release);
        log::debug!(
            "compaction finished: {:#x}..{:#x} in use",
            self.space.bottom,
            self.compact_top
        );
        self.compact_top
    }
}
