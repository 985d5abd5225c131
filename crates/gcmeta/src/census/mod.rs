//! Census Module - Object Demographics and the Tenuring Threshold
//!
//! Each GC cycle the collector records how many bytes of each age survived.
//! Comparing a cohort with the same cohort one cycle earlier gives its
//! mortality rate; the tenuring threshold is the youngest age from which
//! every older cohort has stopped dying at a significant rate.
//!
//! ## Cycle
//!
//! ```text
//!   IDLE ──prepare──► ACCUMULATING ──update_census──► MERGING ──► READY
//!    ▲                 (workers add)                 (single thread)  │
//!    └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Snapshots live in a ring of `MAX_SNAPSHOTS` epochs, so the previous cycle's
//! census and threshold are always one slot back.
//!
//! ## Parallel accumulation
//!
//! Workers never share a table. [`AgeCensus::workers`] splits the per-worker
//! tables into exclusive [`WorkerCensus`] handles that can be moved to
//! worker threads; merging needs the census back by `&mut`, which only
//! happens after every handle is dropped.

pub mod age_table;
pub mod noise;

pub use age_table::AgeTable;
pub use noise::NoiseStats;

use crate::config::CensusConfig;
use crate::logging::{log_event, GcEvent};
use serde::Serialize;

/// Largest age an object header can hold
pub const MAX_AGE: u32 = 15;

/// One cohort per representable age
pub const MAX_COHORTS: usize = MAX_AGE as usize + 1;

/// Census snapshots kept in the ring
pub const MAX_SNAPSHOTS: usize = MAX_COHORTS;

/// Where this cycle's populations come from
#[derive(Debug, Clone, Copy)]
pub enum CensusSource<'a> {
    /// Per-worker tables filled during marking
    WorkerTables,
    /// Two tables gathered while evacuating
    Evacuation {
        pv1: &'a AgeTable,
        pv2: &'a AgeTable,
    },
}

/// Fraction of `prev` that did not survive into `cur`
///
/// Never negative: a cohort that grew is treated as immortal.
pub fn mortality_rate(prev: usize, cur: usize) -> f64 {
    if prev <= cur {
        return 0.0;
    }
    1.0 - (cur as f64 / prev as f64)
}

fn record(
    table: &mut AgeTable,
    noise: &mut NoiseStats,
    obj_age: u32,
    region_age: u32,
    region_youth: u32,
    size: usize,
) {
    if obj_age > MAX_AGE {
        noise.skipped += size;
        return;
    }

    let mut age = obj_age;
    if region_age > 0 {
        noise.aged += size;
        age = age.saturating_add(region_age);
        if age > MAX_AGE {
            age = MAX_AGE;
            noise.clamped += size;
        }
    }
    if region_youth > 0 {
        noise.young += size;
    }

    table.add(age, size);
}

/// WorkerCensus - one worker's exclusive view of its census table
pub struct WorkerCensus<'a> {
    worker_id: usize,
    table: &'a mut AgeTable,
    noise: &'a mut NoiseStats,
}

impl WorkerCensus<'_> {
    /// Record `size` bytes of a surviving object
    pub fn add(&mut self, obj_age: u32, region_age: u32, region_youth: u32, size: usize) {
        record(self.table, self.noise, obj_age, region_age, region_youth, size);
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }
}

/// Serialisable view of the current census
#[derive(Debug, Clone, Serialize)]
pub struct CensusSnapshot {
    pub epoch: usize,
    pub tenuring_threshold: u32,
    pub previous_tenuring_threshold: u32,
    pub populations: AgeTable,
    /// `mortality[i]` compares cohort `i` with cohort `i - 1` one epoch
    /// earlier; entry 0 is always 0.0
    pub mortality: Vec<f64>,
    pub noise: NoiseStats,
    pub total: usize,
}

/// AgeCensus - ring of per-epoch age tables and tenuring thresholds
pub struct AgeCensus {
    config: CensusConfig,

    global_age_table: Vec<AgeTable>,
    global_noise: Vec<NoiseStats>,
    tenuring_threshold: [u32; MAX_SNAPSHOTS],

    local_age_table: Vec<AgeTable>,
    local_noise: Vec<NoiseStats>,

    epoch: usize,

    /// Set by `prepare_for_census_update`, cleared when the census is merged
    prepared: bool,

    /// Population seen by every census so far
    total: usize,
}

impl AgeCensus {
    /// Create a census with one local table per worker
    pub fn new(config: &CensusConfig, max_workers: usize) -> Self {
        assert!(max_workers > 0, "census needs at least one worker table");

        Self {
            config: config.clone(),
            global_age_table: vec![AgeTable::new(); MAX_SNAPSHOTS],
            global_noise: vec![NoiseStats::default(); MAX_SNAPSHOTS],
            tenuring_threshold: [MAX_COHORTS as u32; MAX_SNAPSHOTS],
            local_age_table: vec![AgeTable::new(); max_workers],
            local_noise: vec![NoiseStats::default(); max_workers],
            // The first census lands in slot 0.
            epoch: MAX_SNAPSHOTS - 1,
            prepared: false,
            total: 0,
        }
    }

    /// Record `size` bytes of a surviving object on behalf of `worker_id`
    pub fn add(
        &mut self,
        obj_age: u32,
        region_age: u32,
        region_youth: u32,
        size: usize,
        worker_id: usize,
    ) {
        record(
            &mut self.local_age_table[worker_id],
            &mut self.local_noise[worker_id],
            obj_age,
            region_age,
            region_youth,
            size,
        );
    }

    /// Exclusive handle on one worker's table
    pub fn worker(&mut self, worker_id: usize) -> WorkerCensus<'_> {
        WorkerCensus {
            worker_id,
            table: &mut self.local_age_table[worker_id],
            noise: &mut self.local_noise[worker_id],
        }
    }

    /// Exclusive handles on every worker's table, in worker order
    pub fn workers(&mut self) -> Vec<WorkerCensus<'_>> {
        self.local_age_table
            .iter_mut()
            .zip(self.local_noise.iter_mut())
            .enumerate()
            .map(|(worker_id, (table, noise))| WorkerCensus {
                worker_id,
                table,
                noise,
            })
            .collect()
    }

    /// Advance to the next epoch slot and clear it
    ///
    /// A second call before `update_census` does nothing.
    pub fn prepare_for_census_update(&mut self) {
        if self.prepared {
            return;
        }
        self.epoch = (self.epoch + 1) % MAX_SNAPSHOTS;
        self.global_age_table[self.epoch].clear();
        self.global_noise[self.epoch].clear();
        self.prepared = true;
    }

    /// Merge this cycle's populations and compute the next threshold
    ///
    /// `age0_pop` is the volume allocated since the last cycle; it only
    /// applies to worker tables, since evacuation tables already carry
    /// cohort 0.
    ///
    /// # Panics
    /// If the epoch slot is dirty or `source` disagrees with the configured
    /// census mode.
    pub fn update_census(&mut self, age0_pop: usize, source: CensusSource<'_>) {
        self.prepare_for_census_update();

        let epoch = self.epoch;
        assert!(self.global_age_table[epoch].is_clear(), "Dirty decks");
        assert!(self.global_noise[epoch].is_clear(), "Dirty decks");

        match source {
            CensusSource::WorkerTables => {
                assert!(
                    !self.config.census_at_evac,
                    "census is taken at evacuation; worker tables are not used"
                );
                self.global_age_table[epoch].add(0, age0_pop);
                for (table, noise) in self
                    .local_age_table
                    .iter_mut()
                    .zip(self.local_noise.iter_mut())
                {
                    self.global_age_table[epoch].merge(table);
                    self.global_noise[epoch].merge(noise);
                    table.clear();
                    noise.clear();
                }
            }
            CensusSource::Evacuation { pv1, pv2 } => {
                assert!(
                    self.config.census_at_evac,
                    "census is taken at marking; expected worker tables"
                );
                debug_assert!(self.is_clear_local());
                self.global_age_table[epoch].merge(pv1);
                self.global_age_table[epoch].merge(pv2);
            }
        }

        self.update_tenuring_threshold();
        self.update_total();
        self.prepared = false;

        log_event(GcEvent::CensusUpdated {
            epoch,
            tenuring_threshold: self.tenuring_threshold(),
            population: self.global_age_table[epoch].total(),
        });
        self.log_census();
    }

    /// Store this epoch's threshold: fixed when adaptive tenuring is off,
    /// computed from cohort mortality otherwise
    pub fn update_tenuring_threshold(&mut self) {
        let tt = if self.config.adaptive_tenuring {
            self.compute_tenuring_threshold()
        } else {
            self.config.initial_tenuring_threshold
        };
        self.tenuring_threshold[self.epoch] = tt;
    }

    /// Youngest age from which no older cohort still dies significantly
    pub fn compute_tenuring_threshold(&self) -> u32 {
        let min_age = self.config.min_tenuring_age;
        let max_age = self.config.max_tenuring_age;
        if min_age == max_age {
            return max_age;
        }

        let prev_epoch = self.prev_epoch();
        let prev_pv = &self.global_age_table[prev_epoch];
        let cur_pv = &self.global_age_table[self.epoch];

        let mut upper_bound = max_age;
        if self.config.ignore_older_cohorts {
            upper_bound = upper_bound.min(self.previous_tenuring_threshold() + 1);
        }
        upper_bound = upper_bound.min(MAX_AGE);

        let mut tenuring_threshold = upper_bound;
        for i in (min_age.max(1)..=upper_bound).rev() {
            let age = i as usize;
            let prev_pop = prev_pv[age - 1];
            let cur_pop = cur_pv[age];

            if cur_pop > prev_pop && prev_pop > 0 {
                log::warn!(
                    "cohort {} grew from {} to {} bytes; treating as immortal",
                    age,
                    prev_pop,
                    cur_pop
                );
                log_event(GcEvent::CensusAnomaly {
                    reason: format!("cohort {} grew from {} to {} bytes", age, prev_pop, cur_pop),
                });
            }

            let mr = mortality_rate(prev_pop, cur_pop);
            if prev_pop > self.config.cohort_population_threshold
                && mr > self.config.mortality_rate_threshold
            {
                // This cohort still dies fast; everything younger stays.
                return tenuring_threshold;
            }
            tenuring_threshold = i;
        }
        tenuring_threshold
    }

    #[inline]
    fn prev_epoch(&self) -> usize {
        if self.epoch > 0 {
            self.epoch - 1
        } else {
            MAX_SNAPSHOTS - 1
        }
    }

    pub fn tenuring_threshold(&self) -> u32 {
        self.tenuring_threshold[self.epoch]
    }

    pub fn previous_tenuring_threshold(&self) -> u32 {
        self.tenuring_threshold[self.prev_epoch()]
    }

    /// Whether objects of `age` should be promoted
    pub fn is_tenurable(&self, age: u32) -> bool {
        age >= self.tenuring_threshold()
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn global_table(&self, epoch: usize) -> &AgeTable {
        &self.global_age_table[epoch]
    }

    pub fn global_noise(&self, epoch: usize) -> &NoiseStats {
        &self.global_noise[epoch]
    }

    pub fn local_table(&self, worker_id: usize) -> &AgeTable {
        &self.local_age_table[worker_id]
    }

    pub fn max_workers(&self) -> usize {
        self.local_age_table.len()
    }

    /// Forget every snapshot and threshold
    pub fn reset_global(&mut self) {
        for table in &mut self.global_age_table {
            table.clear();
        }
        for noise in &mut self.global_noise {
            noise.clear();
        }
        self.tenuring_threshold = [MAX_COHORTS as u32; MAX_SNAPSHOTS];
        self.epoch = MAX_SNAPSHOTS - 1;
        self.prepared = false;
    }

    /// Drop whatever the workers accumulated this cycle
    pub fn reset_local(&mut self) {
        for table in &mut self.local_age_table {
            table.clear();
        }
        for noise in &mut self.local_noise {
            noise.clear();
        }
    }

    pub fn is_clear_global(&self) -> bool {
        self.global_age_table.iter().all(AgeTable::is_clear)
            && self.global_noise.iter().all(NoiseStats::is_clear)
    }

    pub fn is_clear_local(&self) -> bool {
        self.local_age_table.iter().all(AgeTable::is_clear)
            && self.local_noise.iter().all(NoiseStats::is_clear)
    }

    /// Add the current epoch's population to the running total
    pub fn update_total(&mut self) {
        self.total += self.global_age_table[self.epoch].total();
    }

    /// Population seen by every census so far
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn snapshot(&self) -> CensusSnapshot {
        let prev = &self.global_age_table[self.prev_epoch()];
        let cur = &self.global_age_table[self.epoch];

        let mortality = (0..MAX_COHORTS)
            .map(|age| {
                if age == 0 {
                    0.0
                } else {
                    mortality_rate(prev[age - 1], cur[age])
                }
            })
            .collect();

        CensusSnapshot {
            epoch: self.epoch,
            tenuring_threshold: self.tenuring_threshold(),
            previous_tenuring_threshold: self.previous_tenuring_threshold(),
            populations: cur.clone(),
            mortality,
            noise: self.global_noise[self.epoch],
            total: self.total,
        }
    }

    /// Print the current census table at debug level
    pub fn log_census(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }

        let snapshot = self.snapshot();
        log::debug!(
            "Age table (epoch {}), tenuring threshold {} (previous {}):",
            snapshot.epoch,
            snapshot.tenuring_threshold,
            snapshot.previous_tenuring_threshold
        );
        for (age, &pop) in snapshot.populations.sizes().iter().enumerate() {
            if pop > 0 {
                log::debug!(
                    "- age {:>2}: {:>12} bytes, mortality {:.2}",
                    age,
                    pop,
                    snapshot.mortality[age]
                );
            }
        }
        let n = snapshot.noise;
        log::debug!(
            "  noise: skipped {} aged {} clamped {} young {}",
            n.skipped,
            n.aged,
            n.clamped,
            n.young
        );
    }
}
