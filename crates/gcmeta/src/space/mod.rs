//! Space Module - Contiguous Spaces and the Tenured Generation
//!
//! A contiguous space is a bump-allocated address range whose blocks are
//! recorded in a block-offset table. The tenured generation wraps one such
//! space and grows or shrinks it inside a fixed reservation.
//!
//! The space never looks inside a block: callers describe block sizes
//! through [`BlockSize`].

pub mod contiguous;
pub mod generation;

pub use contiguous::{Compactor, ContiguousSpace};
pub use generation::TenuredGeneration;

/// Size of the block starting at an address
///
/// Implemented by whatever knows the object layout. Closures
/// `Fn(usize) -> usize` work directly.
pub trait BlockSize {
    /// Size in heap words of the block starting at `addr`
    fn block_size_in_words(&self, addr: usize) -> usize;
}

impl<F> BlockSize for F
where
    F: Fn(usize) -> usize,
{
    fn block_size_in_words(&self, addr: usize) -> usize {
        self(addr)
    }
}
