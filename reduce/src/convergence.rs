//! Convergence evaluation for the detection pass loop.
//!
//! Passes run at progressively shallower thresholds to recover faint
//! sources; the loop must halt once additional passes stop contributing
//! statistically meaningful detections, bounded by a hard pass cap so
//! termination is guaranteed regardless of data. This evaluator is the only
//! place continuation is decided; no other component may short-circuit the
//! loop.

use std::fmt;

use catalog::{CombinedCatalog, SnrSummary};

use crate::config::ConvergenceConfig;

/// Why the pass loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The hard cap on passes was reached.
    PassCap,
    /// The median S/N of the current pass's detections fell to or below
    /// the floor.
    FaintMedianSnr,
    /// The current pass's above-floor detection count collapsed below the
    /// configured fraction of the first pass's.
    BrightCountCollapse,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::PassCap => write!(f, "pass cap reached"),
            StopReason::FaintMedianSnr => write!(f, "median S/N at or below floor"),
            StopReason::BrightCountCollapse => write!(f, "bright detection count collapsed"),
        }
    }
}

/// Outcome of one convergence evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Schedule another detection pass.
    Continue,
    /// Stop the loop and finalize the chip.
    Stop(StopReason),
}

/// Summary statistics driving the stopping rule.
///
/// Recomputed from the combined catalog after each pass; never persisted.
/// The first-pass baseline covers every pass-1 row regardless of later
/// status reclassification, because the baseline is what pass 1 found at
/// the time.
#[derive(Debug, Clone)]
pub struct ConvergenceState {
    /// Index of the most recent accumulated pass.
    pub pass: u32,
    /// Summary of the most recent pass's detections.
    pub current: SnrSummary,
    /// Summary of the first pass's detections.
    pub first: SnrSummary,
}

impl ConvergenceState {
    /// Build the state from the combined catalog after a pass.
    pub fn from_catalog(combined: &CombinedCatalog, config: &ConvergenceConfig) -> Self {
        let pass = combined.passes();
        let snrs_of = |p: u32| -> Vec<f64> { combined.of_pass(p).map(|d| d.snr()).collect() };
        Self {
            pass,
            current: SnrSummary::from_snrs(&snrs_of(pass), config.snr_floor),
            first: SnrSummary::from_snrs(&snrs_of(1), config.snr_floor),
        }
    }

    /// Apply the stopping rule.
    ///
    /// Stop once `pass >= min_passes` and at least one of: the pass cap is
    /// reached; the median S/N of the current pass's detections is at or
    /// below the floor (an empty pass counts as converged); the current
    /// pass's above-floor count is below `min_bright_fraction` of the
    /// first pass's.
    pub fn evaluate(&self, config: &ConvergenceConfig) -> Decision {
        if self.pass < config.min_passes {
            return Decision::Continue;
        }
        if self.pass >= config.max_passes {
            return Decision::Stop(StopReason::PassCap);
        }
        match self.current.median_snr {
            None => return Decision::Stop(StopReason::FaintMedianSnr),
            Some(median) if median <= config.snr_floor => {
                return Decision::Stop(StopReason::FaintMedianSnr)
            }
            Some(_) => {}
        }
        let bright_floor = config.min_bright_fraction * self.first.bright_count as f64;
        if (self.current.bright_count as f64) < bright_floor {
            return Decision::Stop(StopReason::BrightCountCollapse);
        }
        Decision::Continue
    }

    /// One-line summary for the pass log.
    pub fn log_line(&self) -> String {
        format!(
            "pass {}: {} detections, median S/N {}, bright {}/{} (first pass)",
            self.pass,
            self.current.count,
            self.current
                .median_snr
                .map(|m| format!("{m:.2}"))
                .unwrap_or_else(|| "n/a".to_string()),
            self.current.bright_count,
            self.first.bright_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{Detection, DetectionStatus, PassCatalog};

    fn config() -> ConvergenceConfig {
        ConvergenceConfig::default()
    }

    fn state(pass: u32, current: SnrSummary, first: SnrSummary) -> ConvergenceState {
        ConvergenceState {
            pass,
            current,
            first,
        }
    }

    fn summary(count: usize, median_snr: f64, bright_count: usize) -> SnrSummary {
        SnrSummary {
            count,
            median_snr: Some(median_snr),
            bright_count,
        }
    }

    #[test]
    fn test_never_stops_before_min_passes() {
        // Pass 1 statistics that satisfy every stop condition.
        let s = state(1, summary(0, 0.0, 0), summary(0, 0.0, 0));
        assert_eq!(s.evaluate(&config()), Decision::Continue);
    }

    #[test]
    fn test_pass_cap_stops() {
        let s = state(4, summary(500, 40.0, 400), summary(500, 40.0, 400));
        assert_eq!(s.evaluate(&config()), Decision::Stop(StopReason::PassCap));
    }

    #[test]
    fn test_faint_median_stops() {
        let s = state(2, summary(50, 4.9, 30), summary(100, 20.0, 80));
        assert_eq!(
            s.evaluate(&config()),
            Decision::Stop(StopReason::FaintMedianSnr)
        );
    }

    #[test]
    fn test_bright_collapse_stops() {
        // Median S/N still healthy but only 4 bright vs 20 on pass 1.
        let s = state(2, summary(30, 8.0, 4), summary(100, 20.0, 20));
        assert_eq!(
            s.evaluate(&config()),
            Decision::Stop(StopReason::BrightCountCollapse)
        );
    }

    #[test]
    fn test_healthy_pass_continues() {
        let s = state(2, summary(80, 9.0, 10), summary(100, 20.0, 20));
        assert_eq!(s.evaluate(&config()), Decision::Continue);
    }

    #[test]
    fn test_empty_pass_stops() {
        let s = state(
            2,
            SnrSummary {
                count: 0,
                median_snr: None,
                bright_count: 0,
            },
            summary(100, 20.0, 20),
        );
        assert_eq!(
            s.evaluate(&config()),
            Decision::Stop(StopReason::FaintMedianSnr)
        );
    }

    fn det(x: f64, y: f64, mag_err: f64) -> Detection {
        Detection {
            id: 0,
            x,
            y,
            mag: 18.0,
            mag_err,
            pass: 0,
            status: DetectionStatus::Unique,
        }
    }

    /// Two-pass convergence scenario: pass 1 yields 100 detections (20 at
    /// S/N >= 5); pass 2 yields 40 rows, 20 of them re-detections (so 20
    /// pass-1 rows are superseded) and only 3 at S/N >= 5. The loop stops
    /// after pass 2 with 140 rows total, 120 of them active.
    #[test]
    fn test_two_pass_scenario_stops_after_pass_two() {
        let mut pass1 = Vec::new();
        for i in 0..100 {
            // First 20 sources bright (S/N 10), the rest marginal (S/N 4).
            let mag_err = if i < 20 { 0.1 } else { 0.25 };
            pass1.push(det(10.0 * i as f64, 10.0, mag_err));
        }
        let mut pass2 = Vec::new();
        for i in 0..20 {
            // Re-detections of 20 pass-1 sources, within tolerance.
            let mag_err = if i < 3 { 0.1 } else { 0.25 };
            pass2.push(det(10.0 * i as f64 + 0.5, 10.3, mag_err));
        }
        for i in 0..20 {
            // Brand-new faint sources, far from everything else.
            pass2.push(det(10.0 * i as f64, 500.0, 0.25));
        }

        let combined = CombinedCatalog::new()
            .accumulate(&PassCatalog::new(1, 1.7, pass1), 2.0)
            .accumulate(&PassCatalog::new(2, 1.1, pass2), 2.0);

        assert_eq!(combined.len(), 140);
        let superseded = combined
            .rows()
            .iter()
            .filter(|d| d.status == DetectionStatus::Superseded)
            .count();
        assert_eq!(superseded, 20);
        assert_eq!(combined.active().count(), 120);

        let state = ConvergenceState::from_catalog(&combined, &config());
        assert_eq!(state.first.bright_count, 20);
        assert_eq!(state.current.count, 40);
        assert_eq!(state.current.bright_count, 3);
        assert!(matches!(state.evaluate(&config()), Decision::Stop(_)));
    }
}
