//! Pipeline configuration.

use serde::{Deserialize, Serialize};

/// Stopping-rule knobs for the detection pass loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// Minimum number of passes before the stopping rule applies.
    pub min_passes: u32,
    /// Hard cap on passes; guarantees termination regardless of data.
    pub max_passes: u32,
    /// S/N level separating statistically meaningful detections from
    /// marginal ones.
    pub snr_floor: f64,
    /// Stop when the current pass's above-floor count falls below this
    /// fraction of the first pass's.
    pub min_bright_fraction: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            min_passes: 2,
            max_passes: 4,
            snr_floor: 5.0,
            min_bright_fraction: 0.25,
        }
    }
}

/// Configuration for one chip's reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReductionConfig {
    /// Detection threshold for pass 1, in sigma. Shallower than the later
    /// passes: the first pass anchors the PSF-model fit before deeper
    /// passes run.
    pub first_pass_threshold: f64,
    /// Detection threshold for passes 2 and later, in sigma.
    pub later_pass_threshold: f64,
    /// Cross-pass matching tolerance in pixels (boundary inclusive).
    pub match_tolerance: f64,
    /// Stopping-rule knobs.
    pub convergence: ConvergenceConfig,
    /// Number of PSF calibration stars to select on pass 1.
    pub psf_star_count: usize,
    /// Keep only sources confirmed by both methods whenever the PSF
    /// catalog is smaller than the shape-based one.
    pub both_required: bool,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            first_pass_threshold: 1.7,
            later_pass_threshold: 1.1,
            match_tolerance: 2.0,
            convergence: ConvergenceConfig::default(),
            psf_star_count: 100,
            both_required: true,
        }
    }
}

impl ReductionConfig {
    /// Validate internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.match_tolerance <= 0.0 {
            return Err(format!(
                "match_tolerance must be positive, got {}",
                self.match_tolerance
            ));
        }
        if self.first_pass_threshold <= 0.0 || self.later_pass_threshold <= 0.0 {
            return Err("detection thresholds must be positive".to_string());
        }
        if self.convergence.min_passes == 0 {
            return Err("min_passes must be at least 1".to_string());
        }
        if self.convergence.max_passes < self.convergence.min_passes {
            return Err(format!(
                "max_passes ({}) must be >= min_passes ({})",
                self.convergence.max_passes, self.convergence.min_passes
            ));
        }
        if !(0.0..=1.0).contains(&self.convergence.min_bright_fraction) {
            return Err(format!(
                "min_bright_fraction must be in [0, 1], got {}",
                self.convergence.min_bright_fraction
            ));
        }
        if self.psf_star_count == 0 {
            return Err("psf_star_count must be at least 1".to_string());
        }
        Ok(())
    }

    /// Detection threshold for the given pass.
    pub fn threshold_for_pass(&self, pass: u32) -> f64 {
        if pass == 1 {
            self.first_pass_threshold
        } else {
            self.later_pass_threshold
        }
    }
}
