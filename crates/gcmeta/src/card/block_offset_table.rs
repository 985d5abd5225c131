//! Block-Offset Table - Find the Block Reaching Into a Card
//!
//! ============================================================================
//! OVERVIEW
//! ============================================================================
//!
//! For any address in the covered heap, the table answers "where does the
//! block whose extent covers this card's first word start?" without scanning
//! the heap from the bottom. One byte per card:
//!
//! ```text
//!            blk_start                                        blk_end
//!               │◄──────────────────── block ──────────────────►│
//! ┌─────────────┼────┬────────┬────────┬─ ─ ─ ─┬────────┬───────┼──┐
//! │   card c0   │    │ c0+1   │ c0+2   │       │ c0+16  │ c0+17 │  │
//! └─────────────┴────┴────────┴────────┴─ ─ ─ ─┴────────┴───────┴──┘
//!                      offset   N+0      N+0      N+1      N+1
//!                      (words)  (-1 card)         (-16 cards)
//! ```
//!
//! The first card the block fully enters holds the word distance back to
//! `blk_start`. Every later card holds a back-skip code; code `N + i`
//! (`N = card_size_in_words`) covers distances `[16^i, 16^(i+1) - 1]` from
//! the offset card and means "go back 16^i cards". A lookup therefore needs
//! at most `(BASE - 1) * N_POWERS` back-skips no matter how large the block
//! or the heap is.
//!
//! ============================================================================
//! CONCURRENCY
//! ============================================================================
//!
//! Entries are atomic bytes written with relaxed stores. Writers updating
//! disjoint blocks never touch the same entry, so they may run in parallel
//! through `&self`. Readers rely on the caller publishing a block (and its
//! table update) before any reference to it escapes.
//!
//! Resizing needs `&mut self`: no lookup can be in flight while the committed
//! prefix moves.

use super::constants::{power_to_cards_back, BotConstants, N_POWERS};
use crate::error::{GcMetaError, Result};
use crate::heap::mem_region::MemRegion;
use crate::heap::page;
use crate::heap::virtual_space::VirtualSpace;
use crate::logging::GcEvent;
use crate::util::{pointer_delta, words_to_bytes, Alignment};
use std::sync::atomic::{AtomicU8, Ordering};

/// BlockOffsetTable - one byte per card over a reserved heap range
pub struct BlockOffsetTable {
    /// Reserved heap range the table may ever cover
    reserved: MemRegion,

    /// End of the currently covered heap prefix
    end: usize,

    /// Backing bytes; committed prefix covers `[reserved.start(), end)`
    vs: VirtualSpace,

    consts: BotConstants,

    /// `reserved.start() >> log_card_size`, subtracted from every card number
    bias: usize,
}

impl BlockOffsetTable {
    /// Create a table for `reserved`, initially covering `init_word_size`
    /// words from its start
    ///
    /// # Errors
    /// - `InvalidArgument` for an unsupported card size, an empty reservation,
    ///   or an initial size beyond the reservation
    /// - `AlignmentError` if the reservation does not start on a card
    /// - `VirtualMemoryError` / `OutOfMemory` if the backing bytes cannot be
    ///   reserved or committed
    pub fn new(reserved: MemRegion, init_word_size: usize, card_size: usize) -> Result<Self> {
        if !super::constants::is_valid_card_size(card_size) {
            return Err(GcMetaError::InvalidArgument(format!(
                "unsupported card size {}",
                card_size
            )));
        }

        crate::ensure!(
            !reserved.is_empty(),
            GcMetaError::InvalidArgument("block-offset table needs a non-empty reservation".to_string())
        );

        crate::ensure!(
            Alignment::is_aligned(reserved.start(), card_size),
            GcMetaError::AlignmentError {
                address: reserved.start(),
                alignment: card_size,
            }
        );

        crate::ensure!(
            init_word_size <= reserved.word_size(),
            GcMetaError::InvalidArgument(format!(
                "initial size {} words exceeds reservation of {} words",
                init_word_size,
                reserved.word_size()
            ))
        );

        let consts = BotConstants::new(card_size);
        let vs = VirtualSpace::reserve(Self::compute_size(&consts, reserved.word_size()))?;

        let mut table = Self {
            reserved,
            end: reserved.start(),
            vs,
            consts,
            bias: reserved.start() >> consts.log_card_size(),
        };
        table.resize(init_word_size)?;

        log::trace!(
            "block-offset table: reserved {} ({} bytes), committed {} bytes",
            reserved,
            table.vs.reserved_size(),
            table.vs.committed_size()
        );

        Ok(table)
    }

    /// Bytes of table needed to cover `words` heap words
    fn compute_size(consts: &BotConstants, words: usize) -> usize {
        let slots = words.div_ceil(consts.card_size_in_words());
        page::align_up_to_page(slots)
    }

    /// Grow or shrink the covered prefix to `new_word_size` words
    ///
    /// Growth commits whole pages of table; shrinking releases whole pages
    /// and is a no-op if less than a page would be released.
    ///
    /// # Panics
    /// If `new_word_size` exceeds the reservation.
    ///
    /// # Errors
    /// `OutOfMemory` if the table cannot be expanded. Callers treat this as
    /// fatal.
    pub fn resize(&mut self, new_word_size: usize) -> Result<()> {
        crate::assert_context!(
            new_word_size <= self.reserved.word_size(),
            "resize to {} words beyond reservation of {} words",
            new_word_size,
            self.reserved.word_size()
        );

        let new_size = Self::compute_size(&self.consts, new_word_size);
        let old_size = self.vs.committed_size();
        let new_end = self.reserved.start() + words_to_bytes(new_word_size);

        if new_size > old_size {
            let delta = page::align_up_to_page(new_size - old_size);
            self.vs
                .expand_by(delta)
                .map_err(|_| GcMetaError::OutOfMemory {
                    requested: delta,
                    what: "offset table expansion",
                })?;
        } else {
            let delta = page::align_down_to_page(old_size - new_size);
            if delta == 0 {
                self.end = new_end;
                return Ok(());
            }
            self.vs.shrink_by(delta);
        }
        self.end = new_end;

        log::debug!(
            "block-offset table resized: {} -> {} bytes, covering {:#x}..{:#x}",
            old_size,
            self.vs.committed_size(),
            self.reserved.start(),
            self.end
        );
        crate::logging::log_event(GcEvent::OffsetTableResized {
            old_bytes: old_size,
            new_bytes: self.vs.committed_size(),
            covered_end: self.end,
        });
        Ok(())
    }

    #[inline]
    fn entries(&self) -> &[AtomicU8] {
        self.vs.committed_bytes()
    }

    /// Table index of the card containing `addr`
    #[inline]
    fn index_for(&self, addr: usize) -> usize {
        crate::assert_context!(
            self.reserved.contains(addr),
            "out of bounds access to block offset table: {:#x} not in {}",
            addr,
            self.reserved
        );
        (addr >> self.consts.log_card_size()) - self.bias
    }

    /// First address of the card at table index `index`
    #[inline]
    fn addr_for_index(&self, index: usize) -> usize {
        (index + self.bias) << self.consts.log_card_size()
    }

    /// Whether `[obj_start, obj_end)` reaches past the first card boundary at
    /// or after `obj_start`
    #[inline]
    pub fn is_crossing_card_boundary(&self, obj_start: usize, obj_end: usize) -> bool {
        let cur_card_boundary = Alignment::align_up(obj_start, self.consts.card_size());
        obj_end > cur_card_boundary
    }

    /// Record the block `[blk_start, blk_end)`
    ///
    /// Called once per allocated or compacted block. A no-op unless the block
    /// crosses a card boundary. Blocks recorded concurrently must be
    /// disjoint.
    pub fn update_for_block(&self, blk_start: usize, blk_end: usize) {
        debug_assert!(blk_start <= blk_end, "inverted block {:#x}..{:#x}", blk_start, blk_end);
        crate::assert_context!(
            blk_end <= self.end,
            "block end {:#x} beyond covered end {:#x}",
            blk_end,
            self.end
        );

        if self.is_crossing_card_boundary(blk_start, blk_end) {
            self.update_for_block_work(blk_start, blk_end);
        }
    }

    fn update_for_block_work(&self, blk_start: usize, blk_end: usize) {
        let entries = self.entries();
        let cur_card_boundary = Alignment::align_up(blk_start, self.consts.card_size());
        let offset_index = self.index_for(cur_card_boundary);

        // The first card holds the actual offset.
        let offset = pointer_delta(cur_card_boundary, blk_start);
        debug_assert!(offset < self.consts.card_size_in_words());
        entries[offset_index].store(offset as u8, Ordering::Relaxed);

        let end_index = self.index_for(blk_end - 1);
        debug_assert!(offset_index <= end_index);

        if offset_index != end_index {
            let mut start_index_for_region = offset_index + 1;
            for i in 0..N_POWERS {
                // -1 so that the reach ends in this region and not at the
                // start of the next.
                let reach = offset_index + power_to_cards_back(i + 1) - 1;
                let value = self.consts.back_skip_entry(i);

                fill_range(entries, start_index_for_region, reach.min(end_index), value);
                start_index_for_region = reach + 1;

                if reach >= end_index {
                    break;
                }
            }
            debug_assert!(start_index_for_region > end_index);
        }

        if cfg!(debug_assertions) {
            self.verify_for_block(blk_start, blk_end);
        }
    }

    /// Start of the block covering the first word of `addr`'s card
    ///
    /// The result is at or before the card start; walking forward block by
    /// block from it reaches the block containing `addr`.
    pub fn block_start_reaching_into_card(&self, addr: usize) -> usize {
        self.walk_back(addr).0
    }

    /// Returns the block start and the number of entries read to find it
    fn walk_back(&self, addr: usize) -> (usize, usize) {
        crate::assert_context!(
            addr < self.end,
            "lookup of {:#x} beyond covered end {:#x}",
            addr,
            self.end
        );

        let entries = self.entries();
        let mut index = self.index_for(addr);
        let mut offset = entries[index].load(Ordering::Relaxed);
        let mut reads = 1;

        while !self.consts.is_offset(offset) {
            let n_cards_back = self.consts.entry_to_cards_back(offset);
            index = index.checked_sub(n_cards_back).unwrap_or_else(|| {
                panic!(
                    "back-skip of {} cards from {:#x} leaves the table",
                    n_cards_back, addr
                )
            });
            offset = entries[index].load(Ordering::Relaxed);
            reads += 1;
        }

        (self.addr_for_index(index) - words_to_bytes(offset as usize), reads)
    }

    /// Check the entries written for `[blk_start, blk_end)`
    ///
    /// # Panics
    /// If the offset entry is wrong or a back-skip would overshoot the
    /// block's offset card.
    pub fn verify_for_block(&self, blk_start: usize, blk_end: usize) {
        if !self.is_crossing_card_boundary(blk_start, blk_end) {
            return;
        }

        let entries = self.entries();
        let cur_card_boundary = Alignment::align_up(blk_start, self.consts.card_size());
        let offset_index = self.index_for(cur_card_boundary);
        let end_index = self.index_for(blk_end - 1);

        let offset = entries[offset_index].load(Ordering::Relaxed);
        crate::assert_context!(
            offset as usize == pointer_delta(cur_card_boundary, blk_start),
            "offset entry {} wrong for block {:#x}..{:#x}",
            offset,
            blk_start,
            blk_end
        );

        for index in offset_index + 1..=end_index {
            let entry = entries[index].load(Ordering::Relaxed);
            crate::assert_context!(
                !self.consts.is_offset(entry) && (entry as usize) < self.consts.entry_limit(),
                "entry {} at card {} is not a back-skip code",
                entry,
                index
            );
            let back = self.consts.entry_to_cards_back(entry);
            crate::assert_context!(
                index - offset_index >= back,
                "back-skip of {} cards at card {} overshoots block offset card {}",
                back,
                index,
                offset_index
            );
        }
    }

    /// Raw entry for the card containing `addr` (diagnostics)
    pub fn entry_value(&self, addr: usize) -> u8 {
        self.entries()[self.index_for(addr)].load(Ordering::Relaxed)
    }

    pub fn reserved(&self) -> MemRegion {
        self.reserved
    }

    /// End of the covered heap prefix
    pub fn covered_end(&self) -> usize {
        self.end
    }

    /// Committed table bytes
    pub fn committed_size(&self) -> usize {
        self.vs.committed_size()
    }

    /// Reserved table bytes
    pub fn reserved_size(&self) -> usize {
        self.vs.reserved_size()
    }

    pub fn constants(&self) -> &BotConstants {
        &self.consts
    }
}

#[inline]
fn fill_range(entries: &[AtomicU8], start: usize, end_inclusive: usize, value: u8) {
    for entry in &entries[start..=end_inclusive] {
        entry.store(value, Ordering::Relaxed);
    }
}
