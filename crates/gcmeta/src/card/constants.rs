//! Card Geometry and Block-Offset Encoding Constants
//!
//! The heap is partitioned into cards of `2^log_card_size` bytes. The
//! block-offset table keeps one byte per card:
//!
//! ```text
//! entry value e
//! ─────────────────────────────────────────────────────────────
//! e <  card_size_in_words    block starts e words before the card
//! e >= card_size_in_words    go back Base^(e - card_size_in_words) cards
//! ```
//!
//! All entries are below `card_size_in_words + N_POWERS`, which for the
//! largest card size (1024 bytes, 128 words) is 141 and still fits a byte.

use crate::util::constants::LOG_HEAP_WORD_SIZE;

/// log2 of the back-skip base
pub const LOG_BASE: u32 = 4;

/// Back-skip base: each back-skip code covers `BASE` times more cards than
/// the previous one
pub const BASE: usize = 1 << LOG_BASE;

/// Number of distinct back-skip magnitudes
pub const N_POWERS: usize = 14;

/// Smallest supported card size in bytes
pub const MIN_CARD_SIZE: usize = 128;

/// Largest supported card size in bytes
pub const MAX_CARD_SIZE: usize = 1024;

/// Default card size in bytes
pub const DEFAULT_CARD_SIZE: usize = 512;

/// Check that a card size is a supported power of two
pub fn is_valid_card_size(card_size: usize) -> bool {
    card_size.is_power_of_two() && (MIN_CARD_SIZE..=MAX_CARD_SIZE).contains(&card_size)
}

/// Cards to skip for back-skip power `i`
#[inline]
pub fn power_to_cards_back(i: usize) -> usize {
    debug_assert!(i < N_POWERS + 1, "power {} out of range", i);
    1usize << (LOG_BASE as usize * i)
}

/// Card geometry for one block-offset table
///
/// Computed once from the card size and owned by the table, so tables with
/// different card sizes can coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotConstants {
    log_card_size: u32,
    log_card_size_in_words: u32,
    card_size: usize,
    card_size_in_words: usize,
}

impl BotConstants {
    /// Derive the geometry for `card_size` bytes
    ///
    /// # Panics
    /// If the card size is not supported. Callers validate configuration
    /// before building tables.
    pub fn new(card_size: usize) -> Self {
        assert!(
            is_valid_card_size(card_size),
            "unsupported card size {}",
            card_size
        );

        let log_card_size = card_size.trailing_zeros();
        let log_card_size_in_words = log_card_size - LOG_HEAP_WORD_SIZE;

        Self {
            log_card_size,
            log_card_size_in_words,
            card_size,
            card_size_in_words: 1 << log_card_size_in_words,
        }
    }

    #[inline]
    pub fn log_card_size(&self) -> u32 {
        self.log_card_size
    }

    #[inline]
    pub fn log_card_size_in_words(&self) -> u32 {
        self.log_card_size_in_words
    }

    #[inline]
    pub fn card_size(&self) -> usize {
        self.card_size
    }

    #[inline]
    pub fn card_size_in_words(&self) -> usize {
        self.card_size_in_words
    }

    /// Whether an entry value encodes a word offset
    #[inline]
    pub fn is_offset(&self, entry: u8) -> bool {
        (entry as usize) < self.card_size_in_words
    }

    /// Cards to skip for a back-skip entry value
    #[inline]
    pub fn entry_to_cards_back(&self, entry: u8) -> usize {
        debug_assert!(!self.is_offset(entry), "entry {} is an offset", entry);
        power_to_cards_back(entry as usize - self.card_size_in_words)
    }

    /// Entry value for back-skip power `i`
    #[inline]
    pub fn back_skip_entry(&self, i: usize) -> u8 {
        debug_assert!(i < N_POWERS);
        (self.card_size_in_words + i) as u8
    }

    /// One past the largest valid entry value
    #[inline]
    pub fn entry_limit(&self) -> usize {
        self.card_size_in_words + N_POWERS
    }
}

impl Default for BotConstants {
    fn default() -> Self {
        Self::new(DEFAULT_CARD_SIZE)
    }
}
