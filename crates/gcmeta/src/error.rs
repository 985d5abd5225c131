//! Error Module - gcmeta Error Types
//!
//! Defines the recoverable error types used in gcmeta.
//!
//! Only construction, configuration and memory-commit paths return errors.
//! Protocol violations by the calling collector (a dirty census slot, a region
//! added to the collection set twice, a resize beyond the reservation) are
//! not errors: they panic.
//!
//! # Error Categories
//!
//! ## Memory Errors
//! - `OutOfMemory` - Side table could not be committed
//! - `VirtualMemoryError` - Reservation or OS call failed
//! - `AlignmentError` - Misaligned heap or block address
//!
//! ## Configuration Errors
//! - `Configuration` - Invalid configuration
//! - `InvalidArgument` - Invalid function argument

use thiserror::Error;

/// Main error type for all gcmeta operations
///
/// # Examples
///
/// ```rust
/// use gcmeta::error::GcMetaError;
///
/// fn handle_error(err: GcMetaError) {
///     match err {
///         GcMetaError::OutOfMemory { requested, what } => {
///             eprintln!("could not commit {} bytes for {}", requested, what);
///         }
///         _ => eprintln!("other error: {}", err),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum GcMetaError {
    /// Commit of backing memory failed
    ///
    /// **When returned:** expanding a side table (e.g. the block-offset table)
    /// beyond what the reservation can provide
    ///
    /// **Recovery strategy:** none in practice, the collector cannot make
    /// progress without its tables
    #[error("Out of memory: could not commit {requested} bytes for {what}")]
    OutOfMemory { requested: usize, what: &'static str },

    /// Virtual memory error
    ///
    /// **When returned:** OS virtual memory API call failed
    #[error("Virtual memory error: {0}")]
    VirtualMemoryError(String),

    /// Configuration error
    ///
    /// **When returned:** invalid configuration detected at construction
    #[error("Configuration error: {0}")]
    Configuration(#[from] crate::config::ConfigError),

    /// Invalid argument
    ///
    /// **Example scenarios:**
    /// - Card size not a power of two
    /// - Empty memory region
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Alignment error
    ///
    /// **Example scenario:** reserved heap base not aligned to the card size
    #[error("Alignment error: address {address:#x} is not aligned to {alignment} bytes")]
    AlignmentError { address: usize, alignment: usize },
}

impl GcMetaError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GcMetaError::InvalidArgument(_) | GcMetaError::Configuration(_))
    }
}

/// Result type alias for gcmeta operations
pub type Result<T> = std::result::Result<T, GcMetaError>;

/// Assertion with context, for invariants whose violation means the GC
/// metadata is corrupt.
#[macro_export]
macro_rules! assert_context {
    ($cond:expr, $context:expr) => {
        if !$cond {
            panic!("Assertion failed at {}: {}", stringify!($cond), $context);
        }
    };
    ($cond:expr, $context:expr, $($arg:tt)*) => {
        if !$cond {
            panic!("Assertion failed at {}: {}", stringify!($cond), format!($context, $($arg)*));
        }
    };
}

/// Ensure condition is true, otherwise return error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = GcMetaError::InvalidArgument("card size".to_string());
        assert!(err.is_recoverable());

        let err = GcMetaError::OutOfMemory {
            requested: 4096,
            what: "offset table expansion",
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = GcMetaError::AlignmentError {
            address: 0x1001,
            alignment: 512,
        };
        assert_eq!(
            err.to_string(),
            "Alignment error: address 0x1001 is not aligned to 512 bytes"
        );
    }

    #[test]
    #[should_panic(expected = "Assertion failed")]
    fn test_assert_context_panics() {
        assert_context!(1 + 1 == 3, "arithmetic is broken: {}", 42);
    }
}
