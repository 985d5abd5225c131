//! Collection Set - Regions Chosen for Evacuation This Cycle
//!
//! ## Phases
//!
//! ```text
//!  choose (&mut self)          evacuate (&self)                 clear (&mut self)
//!  ┌───────────────┐   ┌──────────────────────────────┐   ┌─────────────────┐
//!  │ add_region()  │──►│ claim_next() from N workers  │──►│ zero everything │
//!  │ aggregates    │   │ is_in() / is_in_loc()        │   │                 │
//!  └───────────────┘   └──────────────────────────────┘   └─────────────────┘
//! ```
//!
//! Mutation needs exclusive access and evacuation only shared access, so
//! the borrow checker keeps the phases apart. The one shared mutable piece
//! is the claim cursor, advanced by CAS.
//!
//! ## Membership
//!
//! One flag per region. `is_in_loc` tests an address by shifting it down to
//! a region number and subtracting a precomputed bias, so no division or
//! region lookup is needed.

use crate::heap::region::{HeapRegion, RegionTable};
use crate::util::debug::format_bytes;
use crossbeam::utils::CachePadded;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Aggregates of the current collection set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CsetSummary {
    pub region_count: usize,
    pub young_region_count: usize,
    pub old_region_count: usize,
    pub garbage: usize,
    pub used: usize,
    pub live: usize,
    pub old_garbage: usize,
    pub young_bytes_to_evacuate: usize,
    pub young_bytes_to_promote: usize,
    pub old_bytes_to_evacuate: usize,
    pub young_available_bytes_collected: usize,
    pub old_available_bytes_collected: usize,
    pub has_old_regions: bool,
}

/// CollectionSet - membership flags, aggregates and a parallel claim cursor
pub struct CollectionSet {
    regions: Arc<RegionTable>,

    cset_map: Vec<bool>,

    /// `heap_base >> region_size_bytes_shift`
    map_bias: usize,
    region_shift: u32,

    garbage: usize,
    used: usize,
    live: usize,
    region_count: usize,

    old_garbage: usize,
    young_region_count: usize,
    old_region_count: usize,

    young_bytes_to_evacuate: usize,
    young_bytes_to_promote: usize,
    old_bytes_to_evacuate: usize,

    young_available_bytes_collected: usize,
    old_available_bytes_collected: usize,

    has_old_regions: bool,

    /// Old regions picked before young ones, if any
    preselected_regions: Option<Vec<bool>>,

    current_index: CachePadded<AtomicUsize>,
}

impl CollectionSet {
    pub fn new(regions: Arc<RegionTable>) -> Self {
        let region_shift = regions.region_size_bytes_shift();
        let map_bias = regions.heap_base() >> region_shift;
        let num_regions = regions.len();

        Self {
            regions,
            cset_map: vec![false; num_regions],
            map_bias,
            region_shift,
            garbage: 0,
            used: 0,
            live: 0,
            region_count: 0,
            old_garbage: 0,
            young_region_count: 0,
            old_region_count: 0,
            young_bytes_to_evacuate: 0,
            young_bytes_to_promote: 0,
            old_bytes_to_evacuate: 0,
            young_available_bytes_collected: 0,
            old_available_bytes_collected: 0,
            has_old_regions: false,
            preselected_regions: None,
            current_index: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Add region `index` and move it to the cset state
    ///
    /// Young regions at or above `tenuring_threshold` count towards
    /// promotion; `None` means nothing is promoted.
    ///
    /// # Panics
    /// If the region is already in the set, is humongous, or is not in the
    /// regular state.
    pub fn add_region(&mut self, index: usize, tenuring_threshold: Option<u32>) {
        assert!(!self.is_in(index), "Already in collection set: region {}", index);

        let regions = Arc::clone(&self.regions);
        let r = regions.get(index);
        assert!(
            !r.is_humongous(),
            "Only add regular regions to the collection set: {}",
            r
        );

        self.cset_map[index] = true;
        let live = r.get_live_data_bytes();
        let garbage = r.garbage();
        let free = r.free();

        if r.is_young() {
            self.young_region_count += 1;
            self.young_bytes_to_evacuate += live;
            self.young_available_bytes_collected += free;
            if tenuring_threshold.is_some_and(|tt| r.age() >= tt) {
                self.young_bytes_to_promote += live;
            }
        } else if r.is_old() {
            self.old_region_count += 1;
            self.old_bytes_to_evacuate += live;
            self.old_garbage += garbage;
            self.old_available_bytes_collected += free;
        }

        self.region_count += 1;
        self.has_old_regions |= r.is_old();
        self.garbage += garbage;
        self.used += r.used();
        self.live += live;

        r.make_cset();
    }

    /// Empty the set
    pub fn clear(&mut self) {
        debug_assert!(
            self.regions.iter().all(|r| !r.is_cset()),
            "regions still in cset state; trash or restore them first"
        );

        self.cset_map.fill(false);
        self.garbage = 0;
        self.used = 0;
        self.live = 0;
        self.region_count = 0;
        self.old_garbage = 0;
        self.young_region_count = 0;
        self.old_region_count = 0;
        self.young_bytes_to_evacuate = 0;
        self.young_bytes_to_promote = 0;
        self.old_bytes_to_evacuate = 0;
        self.young_available_bytes_collected = 0;
        self.old_available_bytes_collected = 0;
        self.has_old_regions = false;
        *self.current_index.get_mut() = 0;
    }

    /// Claim the next unclaimed region in the set
    ///
    /// Lock-free and safe to call from any number of workers; every region
    /// is handed out exactly once until `clear_current_index`.
    pub fn claim_next(&self) -> Option<&HeapRegion> {
        let num_regions = self.regions.len();
        let mut saved_current = self.current_index.load(Ordering::Acquire);
        let mut index = saved_current;

        while index < num_regions {
            if self.is_in(index) {
                match self.current_index.compare_exchange(
                    saved_current,
                    index + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Some(self.regions.get(index)),
                    Err(cur) => {
                        debug_assert!(cur >= saved_current, "claim cursor moved backwards");
                        index = cur;
                        saved_current = cur;
                    }
                }
            } else {
                index += 1;
            }
        }
        None
    }

    /// Single-threaded iteration over the set
    pub fn next(&mut self) -> Option<&HeapRegion> {
        let num_regions = self.regions.len();
        let start = *self.current_index.get_mut();

        for index in start..num_regions {
            if self.cset_map[index] {
                *self.current_index.get_mut() = index + 1;
                return Some(self.regions.get(index));
            }
        }
        None
    }

    pub fn clear_current_index(&mut self) {
        *self.current_index.get_mut() = 0;
    }

    #[inline]
    pub fn is_in(&self, index: usize) -> bool {
        self.cset_map[index]
    }

    /// Whether `addr` lies in a region of the set
    #[inline]
    pub fn is_in_loc(&self, addr: usize) -> bool {
        let index = (addr >> self.region_shift).wrapping_sub(self.map_bias);
        index < self.cset_map.len() && self.cset_map[index]
    }

    /// Record old regions chosen ahead of the young ones
    ///
    /// # Panics
    /// If a preselection is already established or the flags do not cover
    /// every region.
    pub fn establish_preselected(&mut self, preselected: Vec<bool>) {
        assert!(
            self.preselected_regions.is_none(),
            "preselection already established"
        );
        assert_eq!(preselected.len(), self.regions.len(), "one flag per region");
        self.preselected_regions = Some(preselected);
    }

    pub fn abandon_preselected(&mut self) {
        self.preselected_regions = None;
    }

    /// # Panics
    /// If no preselection is established.
    pub fn is_preselected(&self, index: usize) -> bool {
        match &self.preselected_regions {
            Some(preselected) => preselected[index],
            None => panic!("no preselection established"),
        }
    }

    pub fn has_preselected(&self) -> bool {
        self.preselected_regions.is_some()
    }

    pub fn count(&self) -> usize {
        self.region_count
    }

    pub fn is_empty(&self) -> bool {
        self.region_count == 0
    }

    pub fn has_old_regions(&self) -> bool {
        self.has_old_regions
    }

    pub fn garbage(&self) -> usize {
        self.garbage
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn old_garbage(&self) -> usize {
        self.old_garbage
    }

    pub fn young_region_count(&self) -> usize {
        self.young_region_count
    }

    pub fn old_region_count(&self) -> usize {
        self.old_region_count
    }

    /// Young live bytes that stay young after evacuation
    pub fn young_bytes_reserved_for_evacuation(&self) -> usize {
        self.young_bytes_to_evacuate - self.young_bytes_to_promote
    }

    pub fn young_bytes_to_be_promoted(&self) -> usize {
        self.young_bytes_to_promote
    }

    pub fn old_bytes_reserved_for_evacuation(&self) -> usize {
        self.old_bytes_to_evacuate
    }

    pub fn young_available_bytes_collected(&self) -> usize {
        self.young_available_bytes_collected
    }

    pub fn old_available_bytes_collected(&self) -> usize {
        self.old_available_bytes_collected
    }

    pub fn regions(&self) -> &Arc<RegionTable> {
        &self.regions
    }

    /// Indices of the regions in the set, in heap order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.cset_map
            .iter()
            .enumerate()
            .filter_map(|(i, &in_set)| in_set.then_some(i))
    }

    pub fn summary(&self) -> CsetSummary {
        CsetSummary {
            region_count: self.region_count,
            young_region_count: self.young_region_count,
            old_region_count: self.old_region_count,
            garbage: self.garbage,
            used: self.used,
            live: self.live,
            old_garbage: self.old_garbage,
            young_bytes_to_evacuate: self.young_bytes_to_evacuate,
            young_bytes_to_promote: self.young_bytes_to_promote,
            old_bytes_to_evacuate: self.old_bytes_to_evacuate,
            young_available_bytes_collected: self.young_available_bytes_collected,
            old_available_bytes_collected: self.old_available_bytes_collected,
            has_old_regions: self.has_old_regions,
        }
    }

    /// Log the selection against the heap's total garbage
    pub fn summarize(&self, total_garbage: usize, immediate_garbage: usize, immediate_regions: usize) {
        if !log::log_enabled!(log::Level::Info) {
            return;
        }

        let percent = |part: usize| {
            if total_garbage == 0 {
                0
            } else {
                part * 100 / total_garbage
            }
        };
        let collectable_garbage = self.garbage + immediate_garbage;

        log::info!(
            "Collectable Garbage: {} ({}%), Immediate: {} ({}%), {} regions, CSet: {} ({}%), {} regions",
            format_bytes(collectable_garbage),
            percent(collectable_garbage),
            format_bytes(immediate_garbage),
            percent(immediate_garbage),
            immediate_regions,
            format_bytes(self.garbage),
            percent(self.garbage),
            self.region_count
        );

        if self.young_region_count > 0 {
            log::info!(
                "Young Bytes to Evacuate: {}, to Promote: {}, Available Collected: {}",
                format_bytes(self.young_bytes_reserved_for_evacuation()),
                format_bytes(self.young_bytes_to_promote),
                format_bytes(self.young_available_bytes_collected)
            );
        }

        if self.old_region_count > 0 {
            log::info!(
                "Old Bytes to Evacuate: {}, Old Garbage: {}, Available Collected: {}",
                format_bytes(self.old_bytes_to_evacuate),
                format_bytes(self.old_garbage),
                format_bytes(self.old_available_bytes_collected)
            );
        }
    }
}

impl fmt::Display for CollectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Collection Set: Regions: {}, Garbage: {}, Live: {}, Used: {}",
            self.region_count,
            format_bytes(self.garbage),
            format_bytes(self.live),
            format_bytes(self.used)
        )?;
        for index in self.indices() {
            writeln!(f, "  {}", self.regions.get(index))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::region::Affiliation;

    const HEAP_BASE: usize = 0x1_0000_0000;
    const REGION: usize = 64 * 1024;

    fn table(n: usize) -> Arc<RegionTable> {
        Arc::new(RegionTable::new(HEAP_BASE, REGION, n))
    }

    fn fill(regions: &RegionTable, index: usize, aff: Affiliation, used: usize, live: usize) {
        let r = regions.get(index);
        r.make_regular_allocation(aff);
        r.allocate(used).unwrap();
        r.set_live_data(live);
    }

    #[test]
    fn test_add_young_and_old() {
        let regions = table(8);
        fill(&regions, 1, Affiliation::Young, 40_000, 8_000);
        fill(&regions, 2, Affiliation::Old, 60_000, 10_000);
        for _ in 0..3 {
            regions.get(1).increment_age();
        }

        let mut cset = CollectionSet::new(Arc::clone(&regions));
        cset.add_region(1, Some(3));
        cset.add_region(2, Some(3));

        assert_eq!(cset.count(), 2);
        assert!(cset.has_old_regions());
        assert_eq!(cset.young_region_count(), 1);
        assert_eq!(cset.old_region_count(), 1);
        assert_eq!(cset.live(), 18_000);
        assert_eq!(cset.garbage(), 32_000 + 50_000);
        assert_eq!(cset.used(), 100_000);
        assert_eq!(cset.old_garbage(), 50_000);
        assert_eq!(cset.young_bytes_to_be_promoted(), 8_000);
        assert_eq!(cset.young_bytes_reserved_for_evacuation(), 0);
        assert_eq!(cset.old_bytes_reserved_for_evacuation(), 10_000);
        assert_eq!(cset.young_available_bytes_collected(), REGION - 40_000);
        assert!(regions.get(1).is_cset());
    }

    #[test]
    fn test_no_promotion_without_threshold() {
        let regions = table(4);
        fill(&regions, 0, Affiliation::Young, 1024, 512);
        let mut cset = CollectionSet::new(Arc::clone(&regions));
        cset.add_region(0, None);
        assert_eq!(cset.young_bytes_to_be_promoted(), 0);
        assert_eq!(cset.young_bytes_reserved_for_evacuation(), 512);
    }

    #[test]
    fn test_is_in_loc_uses_region_bounds() {
        let regions = table(4);
        fill(&regions, 2, Affiliation::Young, 1024, 0);
        let mut cset = CollectionSet::new(Arc::clone(&regions));
        cset.add_region(2, None);

        assert!(cset.is_in_loc(HEAP_BASE + 2 * REGION));
        assert!(cset.is_in_loc(HEAP_BASE + 3 * REGION - 8));
        assert!(!cset.is_in_loc(HEAP_BASE + 3 * REGION));
        assert!(!cset.is_in_loc(HEAP_BASE - 8));
        assert!(!cset.is_in_loc(HEAP_BASE + 100 * REGION));
    }

    #[test]
    fn test_serial_next_and_reset() {
        let regions = table(6);
        for i in [1, 3, 4] {
            fill(&regions, i, Affiliation::Young, 1024, 0);
        }
        let mut cset = CollectionSet::new(Arc::clone(&regions));
        for i in [1, 3, 4] {
            cset.add_region(i, None);
        }

        let mut seen = Vec::new();
        while let Some(r) = cset.next() {
            seen.push(r.index());
        }
        assert_eq!(seen, vec![1, 3, 4]);

        cset.clear_current_index();
        assert_eq!(cset.claim_next().map(|r| r.index()), Some(1));
    }

    #[test]
    fn test_clear_after_trash() {
        let regions = table(4);
        fill(&regions, 0, Affiliation::Old, 1024, 0);
        let mut cset = CollectionSet::new(Arc::clone(&regions));
        cset.add_region(0, None);

        regions.get(0).make_trash();
        cset.clear();
        assert!(cset.is_empty());
        assert!(!cset.is_in(0));
        assert_eq!(cset.summary(), CsetSummary::default());
    }

    #[test]
    #[should_panic(expected = "Already in collection set")]
    fn test_double_add_panics() {
        let regions = table(2);
        fill(&regions, 0, Affiliation::Young, 1024, 0);
        let mut cset = CollectionSet::new(regions);
        cset.add_region(0, None);
        cset.add_region(0, None);
    }

    #[test]
    #[should_panic(expected = "Only add regular regions")]
    fn test_humongous_rejected() {
        let regions = table(2);
        regions.get(0).make_humongous_start(Affiliation::Old);
        let mut cset = CollectionSet::new(regions);
        cset.add_region(0, None);
    }

    #[test]
    fn test_preselection() {
        let regions = table(3);
        let mut cset = CollectionSet::new(regions);
        cset.establish_preselected(vec![false, true, false]);
        assert!(cset.is_preselected(1));
        assert!(!cset.is_preselected(2));
        cset.abandon_preselected();
        assert!(!cset.has_preselected());
    }

    #[test]
    fn test_display_lists_regions() {
        let regions = table(3);
        fill(&regions, 1, Affiliation::Young, 2048, 1024);
        let mut cset = CollectionSet::new(regions);
        cset.add_region(1, None);
        let text = cset.to_string();
        assert!(text.starts_with("Collection Set: Regions: 1"));
        assert!(text.contains("#1 "));
    }
}
