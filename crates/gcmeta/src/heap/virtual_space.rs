//! Virtual Space - Reserved Backing Store With a Committed Prefix
//!
//! ============================================================================
//! OVERVIEW
//! ============================================================================
//!
//! Side tables such as the block-offset table reserve address space for the
//! whole heap they could ever cover, but only the prefix covering the heap
//! actually in use is committed:
//!
//! ```text
//! low()                      high()                          reserved end
//!  │◄──────── committed ──────►│◄──────── reserved only ──────►│
//! ```
//!
//! The reservation is an anonymous `memmap2` mapping. The OS backs its pages
//! lazily on first touch, so committing only moves the high-water mark.
//! Shrinking returns the released tail to the OS with
//! `madvise(MADV_DONTNEED)` on Unix.
//!
//! ============================================================================
//! INVARIANTS
//! ============================================================================
//!
//! - `committed_size <= reserved_size`
//! - both sizes are multiples of the OS page size
//! - bytes beyond `committed_size` are never handed out

use crate::error::{GcMetaError, Result};
use crate::heap::page;
use memmap2::{MmapMut, MmapOptions};
use std::sync::atomic::AtomicU8;

/// VirtualSpace - reserved byte range with a growable committed prefix
pub struct VirtualSpace {
    /// Anonymous mapping covering the whole reservation
    mapping: MmapMut,

    /// Total reserved size in bytes (page aligned)
    reserved_size: usize,

    /// Committed prefix in bytes (page aligned)
    committed_size: usize,
}

impl VirtualSpace {
    /// Reserve address space without committing any of it
    ///
    /// # Errors
    /// - `InvalidArgument` for a zero size
    /// - `VirtualMemoryError` if the mapping could not be created
    pub fn reserve(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(GcMetaError::InvalidArgument(
                "cannot reserve an empty virtual space".to_string(),
            ));
        }

        let reserved_size = page::align_up_to_page(size);
        let mapping = MmapOptions::new()
            .len(reserved_size)
            .map_anon()
            .map_err(|e| {
                GcMetaError::VirtualMemoryError(format!(
                    "failed to reserve {} bytes: {}",
                    reserved_size, e
                ))
            })?;

        Ok(Self {
            mapping,
            reserved_size,
            committed_size: 0,
        })
    }

    /// Grow the committed prefix by `bytes` (page aligned)
    ///
    /// # Errors
    /// - `OutOfMemory` if the reservation cannot hold the expansion
    pub fn expand_by(&mut self, bytes: usize) -> Result<()> {
        debug_assert!(page::is_page_aligned(bytes), "expansion must be page aligned");

        let new_committed = self.committed_size.checked_add(bytes).ok_or(
            GcMetaError::OutOfMemory {
                requested: bytes,
                what: "virtual space expansion",
            },
        )?;

        if new_committed > self.reserved_size {
            return Err(GcMetaError::OutOfMemory {
                requested: bytes,
                what: "virtual space expansion",
            });
        }

        self.committed_size = new_committed;
        Ok(())
    }

    /// Shrink the committed prefix by `bytes` (page aligned), releasing the
    /// tail pages to the OS
    pub fn shrink_by(&mut self, bytes: usize) {
        debug_assert!(page::is_page_aligned(bytes), "shrink must be page aligned");
        assert!(
            bytes <= self.committed_size,
            "cannot shrink by {} bytes, only {} committed",
            bytes,
            self.committed_size
        );

        let new_committed = self.committed_size - bytes;
        if bytes > 0 {
            self.release(new_committed, bytes);
        }
        self.committed_size = new_committed;
    }

    #[cfg(unix)]
    fn release(&mut self, offset: usize, len: usize) {
        // SAFETY: [offset, offset + len) lies inside the mapping, offset is
        // page aligned, and no slice into the released range outlives this
        // call because shrinking needs `&mut self`.
        let rc = unsafe {
            libc::madvise(
                self.mapping.as_mut_ptr().add(offset) as *mut libc::c_void,
                len,
                libc::MADV_DONTNEED,
            )
        };
        if rc != 0 {
            log::warn!(
                "madvise(DONTNEED) failed for {} bytes at offset {}: {}",
                len,
                offset,
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(unix))]
    fn release(&mut self, offset: usize, len: usize) {
        self.mapping[offset..offset + len].fill(0);
    }

    /// Committed prefix viewed as atomic bytes
    ///
    /// Atomic bytes let disjoint ranges be written from several threads
    /// through a shared reference.
    pub fn committed_bytes(&self) -> &[AtomicU8] {
        // SAFETY: AtomicU8 has the same size and alignment as u8, the
        // committed prefix lies inside the mapping, and the mapping lives as
        // long as `self`.
        unsafe {
            std::slice::from_raw_parts(
                self.mapping.as_ptr() as *const AtomicU8,
                self.committed_size,
            )
        }
    }

    /// Base address of the reservation
    pub fn low(&self) -> usize {
        self.mapping.as_ptr() as usize
    }

    /// End of the committed prefix
    pub fn high(&self) -> usize {
        self.low() + self.committed_size
    }

    pub fn committed_size(&self) -> usize {
        self.committed_size
    }

    pub fn reserved_size(&self) -> usize {
        self.reserved_size
    }

    /// Bytes reserved but not committed
    pub fn uncommitted_size(&self) -> usize {
        self.reserved_size - self.committed_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_reserve_commits_nothing() {
        let vs = VirtualSpace::reserve(1 << 20).unwrap();
        assert_eq!(vs.committed_size(), 0);
        assert_eq!(vs.reserved_size(), 1 << 20);
        assert!(vs.committed_bytes().is_empty());
    }

    #[test]
    fn test_expand_and_shrink() {
        let ps = page::get_page_size();
        let mut vs = VirtualSpace::reserve(8 * ps).unwrap();

        vs.expand_by(4 * ps).unwrap();
        assert_eq!(vs.committed_size(), 4 * ps);
        assert_eq!(vs.high() - vs.low(), 4 * ps);

        vs.committed_bytes()[ps].store(7, Ordering::Relaxed);
        assert_eq!(vs.committed_bytes()[ps].load(Ordering::Relaxed), 7);

        vs.shrink_by(2 * ps);
        assert_eq!(vs.committed_size(), 2 * ps);
        assert_eq!(vs.committed_bytes()[ps].load(Ordering::Relaxed), 7);
        assert_eq!(vs.uncommitted_size(), 6 * ps);
    }

    #[test]
    fn test_expand_past_reservation_fails() {
        let ps = page::get_page_size();
        let mut vs = VirtualSpace::reserve(2 * ps).unwrap();
        let err = vs.expand_by(4 * ps).unwrap_err();
        assert!(matches!(err, GcMetaError::OutOfMemory { .. }));
        assert_eq!(vs.committed_size(), 0);
    }

    #[test]
    fn test_zero_reservation_rejected() {
        assert!(VirtualSpace::reserve(0).is_err());
    }
}
