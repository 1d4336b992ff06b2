//! Construction and refit options.

use crate::error::{HierarchyError, Result};

const DEFAULT_LEAF_CAPACITY: usize = 4;
const DEFAULT_LOOSENING_THRESHOLD: f64 = 2.0;
const DEFAULT_PARALLEL_THRESHOLD: usize = 1024;

/// Options recognized when building a hierarchy.
///
/// ```
/// use tetra_aabb::HierarchyConfig;
///
/// let config = HierarchyConfig::default()
///     .with_leaf_capacity(1)
///     .with_looseness_sample_interval(16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HierarchyConfig {
    /// Maximum number of primitives stored in one leaf.
    pub leaf_capacity: usize,
    /// Refit-to-rebuild volume ratio above which a rebuild is advised.
    pub loosening_threshold: f64,
    /// Sample looseness every this many refits. Zero disables sampling.
    pub looseness_sample_interval: usize,
    /// Subtree size (build) or batch size (queries, refit) at which work is
    /// split across the rayon pool.
    pub parallel_threshold: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            leaf_capacity: DEFAULT_LEAF_CAPACITY,
            loosening_threshold: DEFAULT_LOOSENING_THRESHOLD,
            looseness_sample_interval: 0,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl HierarchyConfig {
    /// Sets the leaf capacity.
    #[must_use]
    pub fn with_leaf_capacity(mut self, leaf_capacity: usize) -> Self {
        self.leaf_capacity = leaf_capacity;
        self
    }

    /// Sets the looseness ratio that triggers rebuild advice.
    #[must_use]
    pub fn with_loosening_threshold(mut self, loosening_threshold: f64) -> Self {
        self.loosening_threshold = loosening_threshold;
        self
    }

    /// Sets how often refit samples looseness.
    #[must_use]
    pub fn with_looseness_sample_interval(mut self, interval: usize) -> Self {
        self.looseness_sample_interval = interval;
        self
    }

    /// Sets the parallel work threshold.
    #[must_use]
    pub fn with_parallel_threshold(mut self, parallel_threshold: usize) -> Self {
        self.parallel_threshold = parallel_threshold;
        self
    }

    /// Checks every option against its accepted range.
    ///
    /// # Errors
    /// Returns [`HierarchyError::InvalidConfig`] when `leaf_capacity` is zero or
    /// `loosening_threshold` is not a finite value of at least 1.
    pub fn validate(&self) -> Result<()> {
        if self.leaf_capacity == 0 {
            return Err(HierarchyError::InvalidConfig(
                "leaf capacity must be at least 1".into(),
            ));
        }
        if !self.loosening_threshold.is_finite() || self.loosening_threshold < 1.0 {
            return Err(HierarchyError::InvalidConfig(format!(
                "loosening threshold must be finite and >= 1, got {}",
                self.loosening_threshold
            )));
        }
        Ok(())
    }
}
