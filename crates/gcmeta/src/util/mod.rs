//! Util Module - Shared Utilities
//!
//! Alignment helpers and size constants used throughout gcmeta.

pub mod alignment;
pub mod debug;

pub use alignment::Alignment;

/// Constants for gcmeta
pub mod constants {
    /// 1 Kilobyte
    pub const KB: usize = 1024;
    /// 1 Megabyte
    pub const MB: usize = 1024 * 1024;
    /// 1 Gigabyte
    pub const GB: usize = 1024 * 1024 * 1024;

    /// Size of a heap word in bytes
    pub const HEAP_WORD_SIZE: usize = 8;
    /// log2 of the heap word size
    pub const LOG_HEAP_WORD_SIZE: u32 = 3;
}

/// Convert a word count to bytes
#[inline]
pub fn words_to_bytes(words: usize) -> usize {
    words << constants::LOG_HEAP_WORD_SIZE
}

/// Convert a byte count to words (truncating)
#[inline]
pub fn bytes_to_words(bytes: usize) -> usize {
    bytes >> constants::LOG_HEAP_WORD_SIZE
}

/// Number of words between two word-aligned addresses
#[inline]
pub fn pointer_delta(high: usize, low: usize) -> usize {
    debug_assert!(high >= low, "pointer_delta: {:#x} < {:#x}", high, low);
    bytes_to_words(high - low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_conversions() {
        assert_eq!(words_to_bytes(4), 32);
        assert_eq!(bytes_to_words(32), 4);
        assert_eq!(pointer_delta(0x1040, 0x1000), 8);
    }
}
