//! Shared fixtures for the gcmeta integration tests
//!
//! Heap addresses here are never dereferenced, so any aligned value works as
//! a heap base.

#![allow(dead_code)]

use gcmeta::{
    Affiliation, AgeCensus, BlockOffsetTable, CensusConfig, CensusSource, CollectionSet,
    ContiguousSpace, GcConfig, GenerationalHeap, MemRegion, RegionTable,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Heap base for block-offset table tests (card and page aligned)
pub const HEAP_BASE: usize = 0x10_0000_0000;

pub const CARD_SIZE: usize = 512;

pub const REGION_SIZE: usize = 256 * 1024;

pub const KB: usize = 1024;

/// Seeded RNG so failures reproduce
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// ============================================================================
/// BLOCK LAYOUTS
/// ============================================================================

/// Recorded blocks of a space: start address -> size in words
#[derive(Default)]
pub struct BlockLayout {
    pub blocks: BTreeMap<usize, usize>,
}

impl BlockLayout {
    pub fn record(&mut self, start: usize, words: usize) {
        self.blocks.insert(start, words);
    }

    pub fn size_at(&self, addr: usize) -> usize {
        *self
            .blocks
            .get(&addr)
            .unwrap_or_else(|| panic!("no block starts at {:#x}", addr))
    }

    /// Start of the block containing `addr`, by brute force
    pub fn containing(&self, addr: usize) -> Option<usize> {
        self.blocks
            .range(..=addr)
            .next_back()
            .filter(|(&start, &words)| addr < start + words * 8)
            .map(|(&start, _)| start)
    }
}

/// Random block size: mostly small, sometimes spanning many cards
pub fn random_block_words(rng: &mut StdRng) -> usize {
    match rng.gen_range(0..100) {
        0..=69 => rng.gen_range(1..=32),
        70..=94 => rng.gen_range(33..=1024),
        _ => rng.gen_range(1025..=40_000),
    }
}

/// Fill a fresh space of `words` words with random blocks
pub fn random_space(words: usize, card_size: usize, seed: u64) -> (ContiguousSpace, BlockLayout) {
    let space = ContiguousSpace::new(MemRegion::new(HEAP_BASE, words), words, card_size)
        .expect("space creation should succeed");
    let mut layout = BlockLayout::default();
    let mut rng = rng(seed);

    loop {
        let want = random_block_words(&mut rng);
        let words = want.min(space.free() / 8);
        if words == 0 {
            break;
        }
        let start = space.allocate(words).expect("sized to fit");
        layout.record(start, words);
    }
    (space, layout)
}

/// Table covering `words` heap words from `HEAP_BASE`
pub fn bot_over(words: usize) -> BlockOffsetTable {
    BlockOffsetTable::new(MemRegion::new(HEAP_BASE, words), words, CARD_SIZE)
        .expect("table creation should succeed")
}

/// Number of entries a lookup for `addr` reads
pub fn lookup_reads(bot: &BlockOffsetTable, addr: usize) -> usize {
    let consts = *bot.constants();
    let mut card = addr & !(consts.card_size() - 1);
    let mut reads = 1;
    let mut entry = bot.entry_value(card);
    while !consts.is_offset(entry) {
        card -= consts.entry_to_cards_back(entry) * consts.card_size();
        entry = bot.entry_value(card);
        reads += 1;
    }
    reads
}

/// ============================================================================
/// REGIONS AND HEAPS
/// ============================================================================

pub fn region_table(n: usize) -> Arc<RegionTable> {
    Arc::new(RegionTable::new(0x2_0000_0000, REGION_SIZE, n))
}

/// Put a region into the regular state with the given usage
pub fn populate(regions: &RegionTable, index: usize, aff: Affiliation, used: usize, live: usize) {
    let r = regions.get(index);
    r.make_regular_allocation(aff);
    r.allocate(used).expect("region should fit the allocation");
    r.set_live_data(live);
}

/// Collection set holding every region in `members`
pub fn cset_with(regions: &Arc<RegionTable>, members: &[usize]) -> CollectionSet {
    let mut cset = CollectionSet::new(Arc::clone(regions));
    for &i in members {
        populate(regions, i, Affiliation::Young, 4 * KB, KB);
        cset.add_region(i, None);
    }
    cset
}

pub fn small_heap(workers: usize) -> GenerationalHeap {
    GenerationalHeap::new(GcConfig {
        max_heap_size: 64 * REGION_SIZE,
        region_size: REGION_SIZE,
        gc_threads: Some(workers),
        ..Default::default()
    })
    .expect("heap creation should succeed")
}

/// ============================================================================
/// CENSUS SCENARIOS
/// ============================================================================

pub fn census(config: CensusConfig) -> AgeCensus {
    AgeCensus::new(&config, 1)
}

/// Steady-state cohort populations for a per-age mortality curve
///
/// `pops[0]` is the allocation volume per cycle; `pops[i]` is what survives
/// to age `i`.
pub fn cohort_populations(age0: usize, mortality: &[f64]) -> Vec<usize> {
    let mut pops = vec![age0];
    for i in 1..16 {
        let mr = mortality.get(i - 1).copied().unwrap_or(0.0);
        let prev = pops[i - 1];
        pops.push((prev as f64 * (1.0 - mr)) as usize);
    }
    pops
}

/// Run census cycle `n` (1-based): cohorts `0..n` exist, each at its
/// steady-state population
pub fn run_cycle(census: &mut AgeCensus, n: usize, pops: &[usize]) -> u32 {
    for (age, &pop) in pops.iter().enumerate().take(n.min(16)).skip(1) {
        census.add(age as u32, 0, 0, pop, 0);
    }
    census.update_census(pops[0], CensusSource::WorkerTables);
    census.tenuring_threshold()
}
