//! # gcmeta - Bookkeeping Core for a Generational Garbage Collector
//!
//! gcmeta holds the metadata a region-based generational collector consults
//! every cycle. It does not trace or move objects itself; the collector drives
//! it and describes the heap to it.
//!
//! ## Overview
//!
//! - **Block-Offset Table**: one byte per card; finds the start of the block
//!   covering any card in a bounded number of reads
//! - **Contiguous Spaces**: lock-free bump allocation and compaction that keep
//!   the block-offset table current
//! - **Age Census**: per-cohort survivor populations and the adaptive tenuring
//!   threshold derived from their mortality
//! - **Collection Set**: the regions chosen for evacuation, their aggregates,
//!   and a lock-free claim cursor for parallel evacuation
//!
//! ## Quick Start
//!
//! ```rust
//! use gcmeta::{ContiguousSpace, MemRegion};
//!
//! fn main() -> Result<(), gcmeta::GcMetaError> {
//!     let reserved = MemRegion::new(0x1000_0000, 64 * 1024);
//!     let space = ContiguousSpace::new(reserved, 64 * 1024, 512)?;
//!
//!     let a = space.allocate(100).unwrap();
//!     let b = space.allocate(300).unwrap();
//!
//!     // Every block here is the size it was allocated with.
//!     let sizes = |addr: usize| if addr == a { 100 } else { 300usize };
//!     assert_eq!(space.block_start(b + 1000, &sizes), b);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── GC Cycle ─────────────────────────────┐
//! │                                                                   │
//! │   Mark ──────────► Choose CSet ──────► Evacuate ──────► Cleanup   │
//! │    │ live data        │ add_region()      │ claim_next()   │      │
//! │    │ census.add()     │ tenuring thr.     │ census.add()   │ trash│
//! │    ▼                  ▼                   ▼                ▼      │
//! │  HeapRegion      CollectionSet        WorkerCensus     AgeCensus  │
//! │                                                    update_census  │
//! └───────────────────────────────────────────────────────────────────┘
//!
//! ┌──────────── Tenured / contiguous space ──────────────┐
//! │  allocate() / Compactor ──► BlockOffsetTable         │
//! │  block_start()          ◄── block_start_reaching_... │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example: A Collection Cycle
//!
//! ```rust
//! use gcmeta::{Affiliation, CensusSource, GcConfig, GenerationalHeap};
//!
//! fn main() -> Result<(), gcmeta::GcMetaError> {
//!     let mut heap = GenerationalHeap::new(GcConfig {
//!         max_heap_size: 8 * 1024 * 1024,
//!         region_size: 256 * 1024,
//!         gc_threads: Some(2),
//!         ..Default::default()
//!     })?;
//!
//!     // Pretend marking found a mostly dead young region.
//!     let r = heap.region(3);
//!     r.make_regular_allocation(Affiliation::Young);
//!     r.allocate(200 * 1024).unwrap();
//!     r.set_live_data(16 * 1024);
//!
//!     let summary = heap.choose_collection_set();
//!     assert_eq!(summary.region_count, 1);
//!
//!     heap.par_evacuate(2, |region, census| {
//!         census.add(0, region.age(), region.youth(), region.get_live_data_bytes());
//!     });
//!     heap.age_census_mut().update_census(0, CensusSource::WorkerTables);
//!     heap.trash_cset_regions();
//!     heap.recycle_trash();
//!     Ok(())
//! }
//! ```
//!
//! ## Thread Safety
//!
//! - `BlockOffsetTable::update_for_block` may run concurrently for disjoint
//!   blocks; resizing needs `&mut`
//! - `CollectionSet` is mutated through `&mut` only; `claim_next` works
//!   through `&` from any number of threads
//! - census accumulation runs on per-worker [`WorkerCensus`] handles; merging
//!   needs the census back by `&mut`
//!
//! ## Modules
//!
//! - [`card`]: Card geometry and the block-offset table
//! - [`census`]: Age tables, noise statistics and the tenuring threshold
//! - [`config`]: Configuration parameters and validation
//! - [`cset`]: The collection set
//! - [`error`]: Error types
//! - [`heap`]: Regions, virtual space and the generational heap facade
//! - [`logging`]: Structured cycle events
//! - [`space`]: Contiguous spaces and the tenured generation
//! - [`util`]: Alignment and formatting helpers

// Configuration and errors
pub mod config;
pub mod error;
pub mod logging;

// Metadata structures
pub mod card;
pub mod census;
pub mod cset;
pub mod heap;
pub mod space;

// Utilities
pub mod util;

pub use card::{BlockOffsetTable, BotConstants};
pub use census::{AgeCensus, AgeTable, CensusSnapshot, CensusSource, WorkerCensus};
pub use config::{CensusConfig, GcConfig};
pub use cset::{CollectionSet, CsetSummary};
pub use error::{GcMetaError, Result};
pub use heap::{Affiliation, GenerationalHeap, HeapRegion, MemRegion, RegionState, RegionTable};
pub use space::{BlockSize, Compactor, ContiguousSpace, TenuredGeneration};

/// gcmeta version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
