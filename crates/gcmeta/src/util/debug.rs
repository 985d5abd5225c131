//! Debug Utilities
//!
//! Formatting helpers for diagnostics output.

/// Format a byte count with the largest binary unit that keeps it exact
pub fn format_bytes(bytes: usize) -> String {
    use super::constants::{GB, KB, MB};

    if bytes >= GB && bytes % GB == 0 {
        format!("{}G", bytes / GB)
    } else if bytes >= MB && bytes % MB == 0 {
        format!("{}M", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}K", bytes / KB)
    } else {
        format!("{}B", bytes)
    }
}
