//! Page Helpers - OS Page Granularity
//!
//! Side tables are committed and released in whole OS pages. These helpers
//! query the page size once and round sizes to it.

use std::sync::atomic::{AtomicUsize, Ordering};

/// System page size (cached)
static SYSTEM_PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Get system page size
///
/// Returns actual system page size from OS.
/// Caches result for performance.
pub fn get_page_size() -> usize {
    let cached = SYSTEM_PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }

    let size = page_size::get();
    SYSTEM_PAGE_SIZE.store(size, Ordering::Relaxed);
    size
}

/// Align size to page boundary (round up)
pub fn align_up_to_page(size: usize) -> usize {
    let ps = get_page_size();
    (size + ps - 1) & !(ps - 1)
}

/// Align size to page boundary (round down)
pub fn align_down_to_page(size: usize) -> usize {
    let ps = get_page_size();
    size & !(ps - 1)
}

/// Check if size is page-aligned
pub fn is_page_aligned(size: usize) -> bool {
    size % get_page_size() == 0
}
