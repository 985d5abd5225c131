//! Age Table - Population Histogram by Object Age

use super::MAX_COHORTS;
use serde::Serialize;
use std::ops::Index;

/// AgeTable - bytes per cohort, indexed by age
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgeTable {
    sizes: [usize; MAX_COHORTS],
}

impl AgeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sizes(sizes: [usize; MAX_COHORTS]) -> Self {
        Self { sizes }
    }

    /// Add `size` bytes to cohort `age`
    ///
    /// # Panics
    /// If `age` is not below `MAX_COHORTS`.
    #[inline]
    pub fn add(&mut self, age: u32, size: usize) {
        let age = age as usize;
        crate::assert_context!(age < MAX_COHORTS, "cohort {} out of range", age);
        self.sizes[age] += size;
    }

    pub fn merge(&mut self, other: &AgeTable) {
        for (dst, src) in self.sizes.iter_mut().zip(other.sizes.iter()) {
            *dst += *src;
        }
    }

    pub fn clear(&mut self) {
        self.sizes = [0; MAX_COHORTS];
    }

    pub fn is_clear(&self) -> bool {
        self.sizes.iter().all(|&s| s == 0)
    }

    pub fn total(&self) -> usize {
        self.sizes.iter().sum()
    }

    pub fn sizes(&self) -> &[usize; MAX_COHORTS] {
        &self.sizes
    }
}

impl Index<usize> for AgeTable {
    type Output = usize;

    fn index(&self, age: usize) -> &usize {
        &self.sizes[age]
    }
}
