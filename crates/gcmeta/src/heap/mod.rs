//! Heap Module - Regions and the Per-Cycle Bookkeeping Around Them
//!
//! The heap is divided into equally sized regions. Each cycle the collector:
//!
//! 1. marks, filling in live data and (optionally) the age census
//! 2. chooses a collection set from the regions with the most garbage
//! 3. evacuates the set in parallel, claiming regions one at a time
//! 4. trashes the evacuated regions and recycles them
//!
//! ```text
//! ┌────────────────────────────── GenerationalHeap ─────────────────────────────┐
//! │  RegionTable (Arc)     CollectionSet             AgeCensus                  │
//! │  ┌───┬───┬───┬───┐     ┌───────────────────┐     ┌───────────────────────┐  │
//! │  │ 0 │ 1 │ 2 │...│ ◄───│ flags, aggregates │     │ ring of age tables    │  │
//! │  └───┴───┴───┴───┘     │ claim cursor      │     │ tenuring thresholds   │  │
//! │                        └───────────────────┘     └───────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The heap owns its collection set and census outright; nothing here is a
//! process-wide singleton.

pub mod mem_region;
pub mod page;
pub mod region;
pub mod virtual_space;

pub use mem_region::MemRegion;
pub use region::{Affiliation, HeapRegion, RegionState, RegionTable};
pub use virtual_space::VirtualSpace;

use crate::census::{AgeCensus, WorkerCensus};
use crate::config::GcConfig;
use crate::cset::{CollectionSet, CsetSummary};
use crate::error::Result;
use crate::logging::{configure_logger, log_event, GcEvent, GcLoggerConfig, LogLevel};
use std::sync::Arc;

/// GenerationalHeap - region table plus the collector's cycle bookkeeping
pub struct GenerationalHeap {
    config: GcConfig,
    regions: Arc<RegionTable>,
    collection_set: CollectionSet,
    age_census: AgeCensus,
}

impl GenerationalHeap {
    /// Create the heap described by `config`
    ///
    /// # Errors
    /// `Configuration` if the configuration does not validate.
    pub fn new(config: GcConfig) -> Result<Self> {
        config.validate()?;

        if config.verbose {
            configure_logger(GcLoggerConfig {
                level: LogLevel::Debug,
                console: true,
                ..Default::default()
            });
        }

        let regions = Arc::new(RegionTable::new(
            config.heap_base,
            config.region_size,
            config.num_regions(),
        ));
        let collection_set = CollectionSet::new(Arc::clone(&regions));
        let age_census = AgeCensus::new(&config.census, config.max_workers());

        log::info!(
            "heap: {} regions of {} at {:#x}, {} workers",
            regions.len(),
            crate::util::debug::format_bytes(config.region_size),
            config.heap_base,
            config.max_workers()
        );

        Ok(Self {
            config,
            regions,
            collection_set,
            age_census,
        })
    }

    /// Age threshold for promotion, or `None` outside generational mode
    pub fn tenuring_threshold(&self) -> Option<u32> {
        if self.config.generational {
            Some(self.age_census.tenuring_threshold())
        } else {
            None
        }
    }

    /// Select this cycle's collection set
    ///
    /// Regions with no live data are trashed on the spot. Of the rest, those
    /// whose garbage exceeds `garbage_threshold_percent` of a region join the
    /// set, preselected regions first, then by descending garbage.
    ///
    /// # Panics
    /// If the previous collection set was not cleared.
    pub fn choose_collection_set(&mut self) -> CsetSummary {
        assert!(
            self.collection_set.is_empty(),
            "previous collection set was not cleared"
        );

        let threshold = self.config.region_size * self.config.garbage_threshold_percent / 100;
        let preselected = self.collection_set.has_preselected();

        let mut total_garbage = 0;
        let mut immediate_garbage = 0;
        let mut immediate_regions = 0;
        let mut candidates = Vec::new();

        for r in self.regions.iter() {
            if !r.is_regular() || r.is_pinned() {
                continue;
            }

            let garbage = r.garbage();
            total_garbage += garbage;

            if !r.has_live() {
                r.make_trash();
                immediate_garbage += garbage;
                immediate_regions += 1;
                continue;
            }

            let first = preselected && self.collection_set.is_preselected(r.index());
            if first || garbage > threshold {
                candidates.push((r.index(), first, garbage));
            }
        }

        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));

        let tenuring_threshold = self.tenuring_threshold();
        for &(index, _, _) in &candidates {
            self.collection_set.add_region(index, tenuring_threshold);
        }
        self.collection_set.abandon_preselected();

        if immediate_regions > 0 {
            log_event(GcEvent::RegionsTrashed {
                count: immediate_regions,
                bytes: immediate_garbage,
            });
        }

        self.collection_set
            .summarize(total_garbage, immediate_garbage, immediate_regions);

        let summary = self.collection_set.summary();
        log_event(GcEvent::CollectionSetChosen {
            regions: summary.region_count,
            old_regions: summary.old_region_count,
            garbage: summary.garbage,
            live: summary.live,
            young_evacuation: self.collection_set.young_bytes_reserved_for_evacuation(),
            old_evacuation: summary.old_bytes_to_evacuate,
            promotion: summary.young_bytes_to_promote,
        });
        summary
    }

    /// Evacuate the collection set on `workers` threads
    ///
    /// Each worker drains `claim_next` and calls `f` with the claimed region
    /// and its own census handle. Returns the number of regions processed.
    ///
    /// # Panics
    /// If `workers` is zero or exceeds the census worker count, or re-raises
    /// a worker's panic.
    pub fn par_evacuate<F>(&mut self, workers: usize, f: F) -> usize
    where
        F: Fn(&HeapRegion, &mut WorkerCensus<'_>) + Sync,
    {
        assert!(workers > 0, "evacuation needs at least one worker");
        assert!(
            workers <= self.age_census.max_workers(),
            "{} evacuation workers but only {} census tables",
            workers,
            self.age_census.max_workers()
        );

        let cset = &self.collection_set;
        let handles = self.age_census.workers();
        let f = &f;

        let processed = crossbeam::scope(|s| {
            let threads: Vec<_> = handles
                .into_iter()
                .take(workers)
                .map(|mut census| {
                    s.spawn(move |_| {
                        let mut n = 0;
                        while let Some(region) = cset.claim_next() {
                            f(region, &mut census);
                            n += 1;
                        }
                        log::trace!("worker {} evacuated {} regions", census.worker_id(), n);
                        n
                    })
                })
                .collect();

            threads
                .into_iter()
                .map(|t| t.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .sum::<usize>()
        })
        .unwrap_or_else(|e| std::panic::resume_unwind(e));

        log::debug!("evacuated {} collection set regions", processed);
        processed
    }

    /// Trash every evacuated region and empty the collection set
    ///
    /// Pinned regions cannot be evacuated; they leave the set and stay in
    /// place. Returns the number of regions trashed.
    pub fn trash_cset_regions(&mut self) -> usize {
        let mut count = 0;
        let mut bytes = 0;

        for index in self.collection_set.indices() {
            let r = self.regions.get(index);
            if r.is_pinned() {
                r.make_regular_bypass();
            } else {
                bytes += r.used();
                r.make_trash();
                count += 1;
            }
        }

        self.collection_set.clear();

        if count > 0 {
            log_event(GcEvent::RegionsTrashed { count, bytes });
        }
        count
    }

    /// Return every trashed region to the free pool
    pub fn recycle_trash(&self) -> usize {
        let mut recycled = 0;
        for r in self.regions.iter().filter(|r| r.is_trash()) {
            r.recycle();
            recycled += 1;
        }
        recycled
    }

    /// Age every young region that survived the cycle
    pub fn age_regions(&self) {
        for r in self.regions.iter() {
            if r.is_young() && r.is_active() && !self.collection_set.is_in(r.index()) {
                r.increment_age();
            }
        }
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn regions(&self) -> &Arc<RegionTable> {
        &self.regions
    }

    pub fn region(&self, index: usize) -> &HeapRegion {
        self.regions.get(index)
    }

    pub fn collection_set(&self) -> &CollectionSet {
        &self.collection_set
    }

    pub fn collection_set_mut(&mut self) -> &mut CollectionSet {
        &mut self.collection_set
    }

    pub fn age_census(&self) -> &AgeCensus {
        &self.age_census
    }

    pub fn age_census_mut(&mut self) -> &mut AgeCensus {
        &mut self.age_census
    }
}
