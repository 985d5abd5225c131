//! GC Bookkeeping Events
//!
//! Structured events for the decisions the bookkeeping core makes each cycle:
//! - Census results and the tenuring threshold they produce
//! - Collection set selection
//! - Side table resizing
//! - Regions reclaimed as trash
//!
//! Per-operation diagnostics go through the `log` facade directly. Events are
//! the coarse, cycle-level record and can be printed as text or JSON.
//!
//! Log Levels:
//! - WARN: Unusual conditions
//! - INFO: Cycle-level decisions
//! - DEBUG: Table maintenance

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Log level for GC events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// GC event types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GcEvent {
    /// Census merged and a new tenuring threshold computed
    CensusUpdated {
        epoch: usize,
        tenuring_threshold: u32,
        population: usize,
    },

    /// Collection set chosen for this cycle
    CollectionSetChosen {
        regions: usize,
        old_regions: usize,
        garbage: usize,
        live: usize,
        young_evacuation: usize,
        old_evacuation: usize,
        promotion: usize,
    },

    /// Block-offset table committed size changed
    OffsetTableResized {
        old_bytes: usize,
        new_bytes: usize,
        covered_end: usize,
    },

    /// Regions moved to trash
    RegionsTrashed { count: usize, bytes: usize },

    /// Census population did not add up
    CensusAnomaly { reason: String },
}

/// GC Logger configuration
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Enable console output
    pub console: bool,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,

    /// Events kept in memory; oldest are dropped first
    pub max_events: usize,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            json: false,
            timestamps: true,
            max_events: 1024,
        }
    }
}

/// GC Logger - records and prints bookkeeping events
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<Vec<(Instant, GcEvent)>>,
    enabled: AtomicBool,
}

impl GcLogger {
    pub fn new(config: GcLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Log a GC event
    pub fn log(&self, event: GcEvent) {
        if !self.is_enabled() {
            return;
        }

        if Self::event_level(&event) > self.config.level {
            return;
        }

        if self.config.console {
            self.output_console(&event);
        }

        let mut events = self.events.lock();
        if events.len() >= self.config.max_events && !events.is_empty() {
            events.remove(0);
        }
        events.push((Instant::now(), event));
    }

    fn event_level(event: &GcEvent) -> LogLevel {
        match event {
            GcEvent::CensusAnomaly { .. } => LogLevel::Warn,
            GcEvent::CensusUpdated { .. }
            | GcEvent::CollectionSetChosen { .. }
            | GcEvent::RegionsTrashed { .. } => LogLevel::Info,
            GcEvent::OffsetTableResized { .. } => LogLevel::Debug,
        }
    }

    fn output_console(&self, event: &GcEvent) {
        if self.config.timestamps {
            let now = chrono::Local::now();
            print!("[{}] ", now.format("%Y-%m-%d %H:%M:%S%.3f"));
        }

        if self.config.json {
            if let Ok(json) = serde_json::to_string(event) {
                println!("{}", json);
            }
        } else {
            println!("{}", Self::format_human(event));
        }
    }

    /// Human-readable rendering of an event
    pub fn format_human(event: &GcEvent) -> String {
        match event {
            GcEvent::CensusUpdated {
                epoch,
                tenuring_threshold,
                population,
            } => format!(
                "[GC] Census epoch {}: {} bytes, tenuring threshold {}",
                epoch, population, tenuring_threshold
            ),
            GcEvent::CollectionSetChosen {
                regions,
                old_regions,
                garbage,
                live,
                young_evacuation,
                old_evacuation,
                promotion,
            } => format!(
                "[GC] Collection set: {} regions ({} old), garbage {} bytes, live {} bytes, \
                 evacuate {}/{} young/old, promote {}",
                regions, old_regions, garbage, live, young_evacuation, old_evacuation, promotion
            ),
            GcEvent::OffsetTableResized {
                old_bytes,
                new_bytes,
                covered_end,
            } => format!(
                "[GC] Offset table: {} -> {} bytes (covers up to {:#x})",
                old_bytes, new_bytes, covered_end
            ),
            GcEvent::RegionsTrashed { count, bytes } => {
                format!("[GC] Trashed {} regions ({} bytes)", count, bytes)
            },
            GcEvent::CensusAnomaly { reason } => format!("[GC] Census anomaly: {}", reason),
        }
    }

    pub fn get_events(&self) -> Vec<(Instant, GcEvent)> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(GcLoggerConfig::default())
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<GcLogger> = Mutex::new(GcLogger::default());
}

/// Log a GC event to the global logger
pub fn log_event(event: GcEvent) {
    GLOBAL_LOGGER.lock().log(event);
}

/// Replace the global logger configuration, dropping recorded events
pub fn configure_logger(config: GcLoggerConfig) {
    *GLOBAL_LOGGER.lock() = GcLogger::new(config);
}

/// Global logger event count
pub fn get_event_count() -> usize {
    GLOBAL_LOGGER.lock().event_count()
}
