//! Heap Region - Unit of Collection Set Selection
//!
//! The heap is divided into equally sized regions. The collection set is a
//! set of regions, and every region carries the metadata the selection and
//! promotion logic reads: used bytes, live bytes, age and affiliation.
//!
//! Region Lifecycle:
//! ```text
//! EmptyUncommitted ◄──► EmptyCommitted ──▶ Regular ──▶ Cset ──▶ Trash
//!                              │              │                   │
//!                              │              └──▶ Pinned         │
//!                              └──▶ Humongous{Start,Cont} ──▶ Trash
//!                              ▲                                  │
//!                              └──────────── recycle ─────────────┘
//! ```
//!
//! Illegal transitions are fatal: they mean the collector's phase logic and
//! the region metadata disagree.
//!
//! # Memory Ordering Model
//!
//! - **top / live data / age:** `Ordering::Relaxed`. Values are published to
//!   other GC threads by the phase barrier that ends marking or selection.
//! - **top CAS in `allocate`:** `SeqCst` on success, `Relaxed` on failure,
//!   retried with the observed value.
//! - **state / affiliation:** `parking_lot::Mutex`, transitions are rare.

use crate::util::{bytes_to_words, constants::HEAP_WORD_SIZE, words_to_bytes};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Region lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// No memory committed
    EmptyUncommitted,
    /// Memory committed, nothing allocated
    EmptyCommitted,
    /// Regular allocation region
    Regular,
    /// First region of a humongous object
    HumongousStart,
    /// Continuation region of a humongous object
    HumongousCont,
    /// Humongous start pinned by a critical section
    PinnedHumongousStart,
    /// Selected for evacuation
    Cset,
    /// Regular region pinned by a critical section
    Pinned,
    /// Selected for evacuation, then pinned
    PinnedCset,
    /// Evacuated or dead, waiting to be recycled
    Trash,
}

/// Which generation a region belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affiliation {
    Free,
    Young,
    Old,
}

/// HeapRegion - one region of the partitioned heap
pub struct HeapRegion {
    index: usize,
    bottom: usize,
    end: usize,

    /// Bump pointer
    top: AtomicUsize,

    /// Live data in words, as computed by marking
    live_data: AtomicUsize,

    /// Number of cycles this region went without allocation
    age: AtomicU32,

    /// Ages discarded by `reset_age`, reported to the census as noise
    youth: AtomicU32,

    state: Mutex<RegionState>,
    affiliation: Mutex<Affiliation>,
}

impl HeapRegion {
    /// Create a committed, empty region covering `[bottom, bottom + size)`
    pub fn new(index: usize, bottom: usize, size: usize) -> Self {
        debug_assert!(bottom % HEAP_WORD_SIZE == 0);
        Self {
            index,
            bottom,
            end: bottom + size,
            top: AtomicUsize::new(bottom),
            live_data: AtomicUsize::new(0),
            age: AtomicU32::new(0),
            youth: AtomicU32::new(0),
            state: Mutex::new(RegionState::EmptyCommitted),
            affiliation: Mutex::new(Affiliation::Free),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bottom(&self) -> usize {
        self.bottom
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn top(&self) -> usize {
        self.top.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> usize {
        self.end - self.bottom
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.bottom && addr < self.end
    }

    // ------------------------------------------------------------------
    // Allocation and accounting
    // ------------------------------------------------------------------

    /// Bump-allocate `size` bytes (rounded up to words)
    ///
    /// Returns `None` if the region cannot fit the request. Allocation resets
    /// the region age.
    pub fn allocate(&self, size: usize) -> Option<usize> {
        let aligned_size = words_to_bytes(size.div_ceil(HEAP_WORD_SIZE));
        let mut current_top = self.top.load(Ordering::Relaxed);

        loop {
            let new_top = current_top.checked_add(aligned_size)?;
            if new_top > self.end {
                return None;
            }

            match self.top.compare_exchange_weak(
                current_top,
                new_top,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.reset_age();
                    return Some(current_top);
                }
                Err(actual) => current_top = actual,
            }
        }
    }

    /// Bytes allocated in this region
    pub fn used(&self) -> usize {
        self.top().saturating_sub(self.bottom)
    }

    /// Bytes still available for allocation
    pub fn free(&self) -> usize {
        self.end.saturating_sub(self.top())
    }

    /// Set live data (bytes) as computed by marking
    pub fn set_live_data(&self, bytes: usize) {
        self.live_data.store(bytes_to_words(bytes), Ordering::Relaxed);
    }

    /// Add marked words to live data
    pub fn increase_live_data_words(&self, words: usize) {
        self.live_data.fetch_add(words, Ordering::Relaxed);
    }

    pub fn clear_live_data(&self) {
        self.live_data.store(0, Ordering::Relaxed);
    }

    pub fn get_live_data_words(&self) -> usize {
        self.live_data.load(Ordering::Relaxed)
    }

    pub fn get_live_data_bytes(&self) -> usize {
        words_to_bytes(self.get_live_data_words())
    }

    pub fn has_live(&self) -> bool {
        self.get_live_data_words() != 0
    }

    /// Bytes allocated but not live
    pub fn garbage(&self) -> usize {
        let used = self.used();
        let live = self.get_live_data_bytes();
        crate::assert_context!(
            live <= used,
            "live data must fit in used space: region {}, live {}, used {}",
            self.index,
            live,
            used
        );
        used - live
    }

    // ------------------------------------------------------------------
    // Age
    // ------------------------------------------------------------------

    pub fn age(&self) -> u32 {
        self.age.load(Ordering::Relaxed)
    }

    pub fn youth(&self) -> u32 {
        self.youth.load(Ordering::Relaxed)
    }

    /// Age the region by one cycle, saturating at the maximum object age
    pub fn increment_age(&self) {
        let age = self.age();
        if age < crate::census::MAX_AGE {
            self.age.store(age + 1, Ordering::Relaxed);
        }
    }

    /// Forget the region's age, remembering it as youth
    pub fn reset_age(&self) {
        let age = self.age.swap(0, Ordering::Relaxed);
        self.youth.fetch_add(age, Ordering::Relaxed);
    }

    // ------------------------------------------------------------------
    // Affiliation
    // ------------------------------------------------------------------

    pub fn affiliation(&self) -> Affiliation {
        *self.affiliation.lock()
    }

    pub fn set_affiliation(&self, affiliation: Affiliation) {
        *self.affiliation.lock() = affiliation;
    }

    pub fn is_young(&self) -> bool {
        self.affiliation() == Affiliation::Young
    }

    pub fn is_old(&self) -> bool {
        self.affiliation() == Affiliation::Old
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    pub fn state(&self) -> RegionState {
        *self.state.lock()
    }

    pub fn is_empty(&self) -> bool {
        matches!(
            self.state(),
            RegionState::EmptyCommitted | RegionState::EmptyUncommitted
        )
    }

    pub fn is_regular(&self) -> bool {
        matches!(self.state(), RegionState::Regular | RegionState::Pinned)
    }

    pub fn is_humongous(&self) -> bool {
        matches!(
            self.state(),
            RegionState::HumongousStart
                | RegionState::HumongousCont
                | RegionState::PinnedHumongousStart
        )
    }

    pub fn is_cset(&self) -> bool {
        matches!(self.state(), RegionState::Cset | RegionState::PinnedCset)
    }

    pub fn is_pinned(&self) -> bool {
        matches!(
            self.state(),
            RegionState::Pinned | RegionState::PinnedCset | RegionState::PinnedHumongousStart
        )
    }

    pub fn is_trash(&self) -> bool {
        self.state() == RegionState::Trash
    }

    /// Holds objects: not empty and not trash
    pub fn is_active(&self) -> bool {
        !self.is_empty() && !self.is_trash()
    }

    /// Start allocating into an empty region for `affiliation`
    pub fn make_regular_allocation(&self, affiliation: Affiliation) {
        let mut state = self.state.lock();
        match *state {
            RegionState::EmptyUncommitted | RegionState::EmptyCommitted => {
                self.set_affiliation(affiliation);
                *state = RegionState::Regular;
            }
            RegionState::Regular | RegionState::Pinned => {}
            other => self.report_illegal_transition(other, "regular allocation"),
        }
    }

    pub fn make_humongous_start(&self, affiliation: Affiliation) {
        let mut state = self.state.lock();
        match *state {
            RegionState::EmptyUncommitted | RegionState::EmptyCommitted => {
                self.set_affiliation(affiliation);
                *state = RegionState::HumongousStart;
            }
            other => self.report_illegal_transition(other, "humongous start allocation"),
        }
    }

    pub fn make_humongous_cont(&self, affiliation: Affiliation) {
        let mut state = self.state.lock();
        match *state {
            RegionState::EmptyUncommitted | RegionState::EmptyCommitted => {
                self.set_affiliation(affiliation);
                *state = RegionState::HumongousCont;
            }
            other => self.report_illegal_transition(other, "humongous continuation allocation"),
        }
    }

    pub fn make_pinned(&self) {
        let mut state = self.state.lock();
        *state = match *state {
            RegionState::Regular | RegionState::Pinned => RegionState::Pinned,
            RegionState::Cset | RegionState::PinnedCset => RegionState::PinnedCset,
            RegionState::HumongousStart | RegionState::PinnedHumongousStart => {
                RegionState::PinnedHumongousStart
            }
            other => self.report_illegal_transition(other, "pinning"),
        };
    }

    pub fn make_unpinned(&self) {
        let mut state = self.state.lock();
        *state = match *state {
            RegionState::Pinned | RegionState::Regular => RegionState::Regular,
            RegionState::PinnedCset | RegionState::Cset => RegionState::Cset,
            RegionState::PinnedHumongousStart | RegionState::HumongousStart => {
                RegionState::HumongousStart
            }
            other => self.report_illegal_transition(other, "unpinning"),
        };
    }

    /// Mark the region as part of the collection set
    pub fn make_cset(&self) {
        let mut state = self.state.lock();
        match *state {
            RegionState::Regular => *state = RegionState::Cset,
            other => self.report_illegal_transition(other, "cset"),
        }
    }

    /// Take a region out of the cset state without evacuating it
    pub fn make_regular_bypass(&self) {
        let mut state = self.state.lock();
        *state = match *state {
            RegionState::Cset => RegionState::Regular,
            RegionState::PinnedCset => RegionState::Pinned,
            other => self.report_illegal_transition(other, "regular bypass"),
        };
    }

    pub fn make_trash(&self) {
        let mut state = self.state.lock();
        match *state {
            RegionState::Cset
            | RegionState::HumongousStart
            | RegionState::HumongousCont
            | RegionState::Regular => *state = RegionState::Trash,
            other => self.report_illegal_transition(other, "trashing"),
        }
    }

    /// Return a trashed region to the empty, free state
    pub fn recycle(&self) {
        let mut state = self.state.lock();
        match *state {
            RegionState::Trash => {
                self.top.store(self.bottom, Ordering::SeqCst);
                self.clear_live_data();
                self.age.store(0, Ordering::Relaxed);
                self.youth.store(0, Ordering::Relaxed);
                self.set_affiliation(Affiliation::Free);
                *state = RegionState::EmptyCommitted;
            }
            other => self.report_illegal_transition(other, "recycling"),
        }
    }

    pub fn make_uncommitted(&self) {
        let mut state = self.state.lock();
        match *state {
            RegionState::EmptyCommitted => *state = RegionState::EmptyUncommitted,
            other => self.report_illegal_transition(other, "uncommitting"),
        }
    }

    // Called with the state lock held, so it must not go through `state()`.
    fn report_illegal_transition(&self, from: RegionState, method: &str) -> ! {
        panic!(
            "Illegal region state transition from {:?} for {}: region #{} at {:#x}",
            from, method, self.index, self.bottom
        );
    }
}

impl fmt::Display for HeapRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{:#x}, {:#x}, {:#x}) {:?} {:?} age={} live={}",
            self.index,
            self.bottom,
            self.top(),
            self.end,
            self.affiliation(),
            self.state(),
            self.age(),
            self.get_live_data_bytes()
        )
    }
}

impl fmt::Debug for HeapRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// RegionTable - all regions of the heap plus region geometry
pub struct RegionTable {
    regions: Vec<HeapRegion>,
    heap_base: usize,
    region_size: usize,
    region_size_bytes_shift: u32,
}

impl RegionTable {
    /// Partition `[heap_base, heap_base + num_regions * region_size)`
    pub fn new(heap_base: usize, region_size: usize, num_regions: usize) -> Self {
        assert!(region_size.is_power_of_two(), "region size must be a power of two");
        assert!(heap_base % region_size == 0, "heap base must be region aligned");

        let regions = (0..num_regions)
            .map(|i| HeapRegion::new(i, heap_base + i * region_size, region_size))
            .collect();

        Self {
            regions,
            heap_base,
            region_size,
            region_size_bytes_shift: region_size.trailing_zeros(),
        }
    }

    pub fn get(&self, index: usize) -> &HeapRegion {
        &self.regions[index]
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HeapRegion> {
        self.regions.iter()
    }

    pub fn heap_base(&self) -> usize {
        self.heap_base
    }

    pub fn heap_end(&self) -> usize {
        self.heap_base + self.regions.len() * self.region_size
    }

    pub fn region_size(&self) -> usize {
        self.region_size
    }

    pub fn region_size_bytes_shift(&self) -> u32 {
        self.region_size_bytes_shift
    }

    /// Index of the region containing `addr`, if it is in the heap
    pub fn region_index_of(&self, addr: usize) -> Option<usize> {
        if addr < self.heap_base || addr >= self.heap_end() {
            return None;
        }
        Some((addr - self.heap_base) >> self.region_size_bytes_shift)
    }
}

impl<'a> IntoIterator for &'a RegionTable {
    type Item = &'a HeapRegion;
    type IntoIter = std::slice::Iter<'a, HeapRegion>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGION_SIZE: usize = 64 * 1024;

    fn create_test_region() -> HeapRegion {
        HeapRegion::new(3, 0x1000_0000, REGION_SIZE)
    }

    #[test]
    fn test_allocate_until_full() {
        let region = create_test_region();
        region.make_regular_allocation(Affiliation::Young);

        let mut allocations = 0;
        while region.allocate(64).is_some() {
            allocations += 1;
        }

        assert_eq!(allocations, REGION_SIZE / 64);
        assert_eq!(region.free(), 0);
        assert_eq!(region.used(), REGION_SIZE);
    }

    #[test]
    fn test_allocate_rounds_to_words() {
        let region = create_test_region();
        let a = region.allocate(3).unwrap();
        let b = region.allocate(8).unwrap();
        assert_eq!(b - a, 8);
    }

    #[test]
    fn test_garbage_is_used_minus_live() {
        let region = create_test_region();
        region.make_regular_allocation(Affiliation::Old);
        region.allocate(4096).unwrap();
        region.set_live_data(1024);

        assert_eq!(region.get_live_data_bytes(), 1024);
        assert_eq!(region.garbage(), 3072);

        region.increase_live_data_words(16);
        assert_eq!(region.garbage(), 3072 - 128);
    }

    #[test]
    fn test_cset_lifecycle() {
        let region = create_test_region();
        assert!(region.is_empty());

        region.make_regular_allocation(Affiliation::Young);
        assert!(region.is_regular());
        assert!(region.is_young());

        region.make_cset();
        assert!(region.is_cset());

        region.make_pinned();
        assert_eq!(region.state(), RegionState::PinnedCset);
        region.make_unpinned();
        assert_eq!(region.state(), RegionState::Cset);

        region.make_trash();
        assert!(region.is_trash());
        assert!(!region.is_active());

        region.recycle();
        assert!(region.is_empty());
        assert_eq!(region.affiliation(), Affiliation::Free);
        assert_eq!(region.used(), 0);
    }

    #[test]
    #[should_panic(expected = "Illegal region state transition")]
    fn test_humongous_cannot_join_cset() {
        let region = create_test_region();
        region.make_humongous_start(Affiliation::Old);
        region.make_cset();
    }

    #[test]
    fn test_humongous_continuation_is_trashed_and_recycled() {
        let region = create_test_region();
        region.make_humongous_cont(Affiliation::Old);
        assert!(region.is_humongous());
        assert!(!region.is_regular());
        assert!(region.is_old());

        region.make_trash();
        region.recycle();
        assert!(region.is_empty());
        assert_eq!(region.affiliation(), Affiliation::Free);
    }

    #[test]
    #[should_panic(expected = "Illegal region state transition")]
    fn test_humongous_continuation_cannot_be_pinned() {
        let region = create_test_region();
        region.make_humongous_cont(Affiliation::Old);
        region.make_pinned();
    }

    #[test]
    fn test_uncommitted_region_is_empty_and_reusable() {
        let region = create_test_region();
        region.make_uncommitted();
        assert_eq!(region.state(), RegionState::EmptyUncommitted);
        assert!(region.is_empty());
        assert!(!region.is_active());

        region.make_regular_allocation(Affiliation::Young);
        assert!(region.is_regular());
    }

    #[test]
    #[should_panic(expected = "Illegal region state transition")]
    fn test_only_empty_regions_uncommit() {
        let region = create_test_region();
        region.make_regular_allocation(Affiliation::Young);
        region.make_uncommitted();
    }

    #[test]
    #[should_panic(expected = "Illegal region state transition")]
    fn test_recycle_requires_trash() {
        let region = create_test_region();
        region.make_regular_allocation(Affiliation::Young);
        region.recycle();
    }

    #[test]
    fn test_age_saturates_and_resets_into_youth() {
        let region = create_test_region();
        for _ in 0..40 {
            region.increment_age();
        }
        assert_eq!(region.age(), crate::census::MAX_AGE);

        region.allocate(8).unwrap();
        assert_eq!(region.age(), 0);
        assert_eq!(region.youth(), crate::census::MAX_AGE);
    }

    #[test]
    fn test_region_table_lookup() {
        let table = RegionTable::new(0x4000_0000, REGION_SIZE, 8);
        assert_eq!(table.len(), 8);
        assert_eq!(table.region_size_bytes_shift(), 16);
        assert_eq!(table.region_index_of(0x4000_0000), Some(0));
        assert_eq!(table.region_index_of(0x4000_0000 + 3 * REGION_SIZE + 17), Some(3));
        assert_eq!(table.region_index_of(table.heap_end()), None);
        assert_eq!(table.region_index_of(0x3FFF_FFFF), None);
        assert_eq!(table.get(5).bottom(), 0x4000_0000 + 5 * REGION_SIZE);
    }
}
