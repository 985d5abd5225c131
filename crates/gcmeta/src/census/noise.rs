//! Census Noise - Bytes Whose Recorded Age Is Unreliable
//!
//! Region ageing is stochastic, so the age attributed to an object is only an
//! estimate. These counters measure how much of the census that affects.

use serde::Serialize;

/// NoiseStats - census bytes by kind of age distortion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NoiseStats {
    /// Objects too old to be tracked
    pub skipped: usize,
    /// Objects whose age was raised by their region's age
    pub aged: usize,
    /// Objects whose combined age was clamped to the last cohort
    pub clamped: usize,
    /// Objects in regions whose age was reset by allocation
    pub young: usize,
}

impl NoiseStats {
    pub fn merge(&mut self, other: &NoiseStats) {
        self.skipped += other.skipped;
        self.aged += other.aged;
        self.clamped += other.clamped;
        self.young += other.young;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_clear(&self) -> bool {
        *self == Self::default()
    }
}
