//! Configuration Module - Collector Bookkeeping Parameters
//!
//! Manages the configuration inputs read by the bookkeeping core:
//! heap geometry (card and region sizes), worker count, and the
//! tenuring parameters consumed by the age census.

use crate::census::MAX_AGE;
use crate::util::constants::{KB, MB};

/// Tenuring parameters for the age census
///
/// # Examples
///
/// ```rust
/// use gcmeta::config::CensusConfig;
///
/// let config = CensusConfig {
///     min_tenuring_age: 2,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CensusConfig {
    /// Derive the tenuring threshold from observed cohort mortality
    ///
    /// When false the threshold is pinned to `initial_tenuring_threshold`.
    /// Default: true
    pub adaptive_tenuring: bool,

    /// Take the census during evacuation instead of marking
    ///
    /// In this mode populations are supplied as two vectors to
    /// `update_census` and per-worker tables are not used.
    /// Default: false
    pub census_at_evac: bool,

    /// Do not look at cohorts older than the previous threshold plus one
    ///
    /// Default: true
    pub ignore_older_cohorts: bool,

    /// Threshold used when adaptive tenuring is disabled
    ///
    /// Default: 7
    pub initial_tenuring_threshold: u32,

    /// Youngest age the adaptive threshold may select
    ///
    /// Default: 1
    pub min_tenuring_age: u32,

    /// Oldest age the adaptive threshold may select
    ///
    /// Default: 15
    pub max_tenuring_age: u32,

    /// Cohorts dying faster than this stay in the young generation
    ///
    /// Default: 0.1
    pub mortality_rate_threshold: f64,

    /// Cohorts at or below this many bytes are statistically insignificant
    ///
    /// Default: 4KB
    pub cohort_population_threshold: usize,
}

impl Default for CensusConfig {
    fn default() -> Self {
        CensusConfig {
            adaptive_tenuring: true,
            census_at_evac: false,
            ignore_older_cohorts: true,
            initial_tenuring_threshold: 7,
            min_tenuring_age: 1,
            max_tenuring_age: 15,
            mortality_rate_threshold: 0.1,
            cohort_population_threshold: 4 * KB,
        }
    }
}

impl CensusConfig {
    /// Validate tenuring bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_tenuring_age == 0 {
            return Err(ConfigError::InvalidTenuringAge(
                "min_tenuring_age must be >= 1".to_string(),
            ));
        }

        if self.max_tenuring_age > MAX_AGE {
            return Err(ConfigError::InvalidTenuringAge(format!(
                "max_tenuring_age must be <= {}",
                MAX_AGE
            )));
        }

        if self.min_tenuring_age > self.max_tenuring_age {
            return Err(ConfigError::InvalidTenuringAge(
                "min_tenuring_age cannot exceed max_tenuring_age".to_string(),
            ));
        }

        if self.initial_tenuring_threshold > MAX_AGE + 1 {
            return Err(ConfigError::InvalidTenuringAge(format!(
                "initial_tenuring_threshold must be <= {}",
                MAX_AGE + 1
            )));
        }

        if !(0.0..=1.0).contains(&self.mortality_rate_threshold) {
            return Err(ConfigError::InvalidThreshold(
                "mortality_rate_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Main configuration for the bookkeeping core
///
/// # Examples
///
/// ```rust
/// use gcmeta::GcConfig;
///
/// let config = GcConfig {
///     max_heap_size: 64 * 1024 * 1024,
///     region_size: 256 * 1024,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// assert_eq!(config.num_regions(), 256);
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Base address of the region-partitioned heap
    ///
    /// Must be aligned to `region_size`.
    /// Default: 0x1_0000_0000
    pub heap_base: usize,

    /// Maximum heap size in bytes
    ///
    /// Default: 256MB
    pub max_heap_size: usize,

    /// Heap region size in bytes (power of two)
    ///
    /// Default: 2MB
    pub region_size: usize,

    /// Card size in bytes for the block-offset table
    ///
    /// One of 128, 256, 512, 1024.
    /// Default: 512
    pub card_size: usize,

    /// Number of GC worker threads
    ///
    /// Sizes the per-worker census tables and the evacuation pool.
    /// If None, auto-detects: min(4, num_cpus / 2)
    pub gc_threads: Option<usize>,

    /// Enable generational mode
    ///
    /// Without it nothing is promoted and the census is not consulted by the
    /// collection set.
    /// Default: true
    pub generational: bool,

    /// Regions with more garbage than this percentage of the region size
    /// are collection set candidates
    ///
    /// Default: 25
    pub garbage_threshold_percent: usize,

    /// Enable verbose GC logging
    ///
    /// Default: false
    pub verbose: bool,

    /// Tenuring parameters
    pub census: CensusConfig,
}

impl Default for GcConfig {
    fn default() -> Self {
        let num_cpus = num_cpus::get();

        GcConfig {
            heap_base: 0x1_0000_0000,
            max_heap_size: 256 * MB,
            region_size: 2 * MB,
            card_size: 512,
            gc_threads: Some((num_cpus / 2).clamp(1, 4)),
            generational: true,
            garbage_threshold_percent: 25,
            verbose: false,
            census: CensusConfig::default(),
        }
    }
}

impl GcConfig {
    /// Validate configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use gcmeta::GcConfig;
    ///
    /// let config = GcConfig {
    ///     card_size: 300,  // Invalid!
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !crate::card::constants::is_valid_card_size(self.card_size) {
            return Err(ConfigError::InvalidCardSize(format!(
                "card_size must be one of 128, 256, 512, 1024 (got {})",
                self.card_size
            )));
        }

        if !self.region_size.is_power_of_two() || self.region_size < 4 * KB {
            return Err(ConfigError::InvalidRegionSize(
                "region_size must be a power of two and at least 4KB".to_string(),
            ));
        }

        if self.region_size < self.card_size {
            return Err(ConfigError::InvalidRegionSize(
                "region_size must be >= card_size".to_string(),
            ));
        }

        if self.max_heap_size == 0 || self.max_heap_size % self.region_size != 0 {
            return Err(ConfigError::InvalidHeapSize(
                "max_heap_size must be a non-zero multiple of region_size".to_string(),
            ));
        }

        if self.heap_base == 0 || self.heap_base % self.region_size != 0 {
            return Err(ConfigError::InvalidHeapSize(
                "heap_base must be non-zero and aligned to region_size".to_string(),
            ));
        }

        if self.heap_base.checked_add(self.max_heap_size).is_none() {
            return Err(ConfigError::InvalidHeapSize(
                "heap_base + max_heap_size overflows".to_string(),
            ));
        }

        if let Some(threads) = self.gc_threads {
            if threads == 0 {
                return Err(ConfigError::InvalidGcThreads(
                    "gc_threads must be > 0".to_string(),
                ));
            }
        }

        if self.garbage_threshold_percent > 100 {
            return Err(ConfigError::InvalidThreshold(
                "garbage_threshold_percent must be <= 100".to_string(),
            ));
        }

        self.census.validate()
    }

    /// Number of heap regions
    pub fn num_regions(&self) -> usize {
        self.max_heap_size / self.region_size
    }

    /// Number of GC workers, resolving auto-detection
    pub fn max_workers(&self) -> usize {
        self.gc_threads
            .unwrap_or_else(|| (num_cpus::get() / 2).clamp(1, 4))
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - GCMETA_MAX_HEAP
    /// - GCMETA_REGION_SIZE
    /// - GCMETA_CARD_SIZE
    /// - GCMETA_GC_THREADS
    /// - GCMETA_ADAPTIVE_TENURING
    /// - GCMETA_CENSUS_AT_EVAC
    /// - GCMETA_VERBOSE
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(size) = env_parse::<usize>("GCMETA_MAX_HEAP") {
            config.max_heap_size = size;
        }

        if let Some(size) = env_parse::<usize>("GCMETA_REGION_SIZE") {
            config.region_size = size;
        }

        if let Some(size) = env_parse::<usize>("GCMETA_CARD_SIZE") {
            config.card_size = size;
        }

        if let Some(threads) = env_parse::<usize>("GCMETA_GC_THREADS") {
            config.gc_threads = Some(threads);
        }

        if let Some(flag) = env_flag("GCMETA_ADAPTIVE_TENURING") {
            config.census.adaptive_tenuring = flag;
        }

        if let Some(flag) = env_flag("GCMETA_CENSUS_AT_EVAC") {
            config.census.census_at_evac = flag;
        }

        if let Some(flag) = env_flag("GCMETA_VERBOSE") {
            config.verbose = flag;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.parse::<T>().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|val| val == "1" || val.eq_ignore_ascii_case("true"))
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid heap size: {0}")]
    InvalidHeapSize(String),

    #[error("Invalid card size: {0}")]
    InvalidCardSize(String),

    #[error("Invalid region size: {0}")]
    InvalidRegionSize(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid tenuring age: {0}")]
    InvalidTenuringAge(String),

    #[error("Invalid GC threads: {0}")]
    InvalidGcThreads(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GcConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.generational);
        assert_eq!(config.card_size, 512);
        assert_eq!(config.num_regions(), 128);
    }

    #[test]
    fn test_invalid_card_size() {
        let config = GcConfig {
            card_size: 2048,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCardSize(_))
        ));
    }

    #[test]
    fn test_heap_not_multiple_of_region() {
        let config = GcConfig {
            max_heap_size: 3 * MB,
            region_size: 2 * MB,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_tenuring_bounds() {
        let census = CensusConfig {
            min_tenuring_age: 8,
            max_tenuring_age: 4,
            ..Default::default()
        };
        assert!(census.validate().is_err());

        let census = CensusConfig {
            max_tenuring_age: 16,
            ..Default::default()
        };
        assert!(census.validate().is_err());

        let census = CensusConfig {
            min_tenuring_age: 0,
            ..Default::default()
        };
        assert!(census.validate().is_err());
    }

    #[test]
    fn test_invalid_mortality_threshold() {
        let config = GcConfig {
            census: CensusConfig {
                mortality_rate_threshold: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
