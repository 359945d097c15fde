//! Small statistics helpers for catalog summaries.

use thiserror::Error;

/// Errors from statistics computations.
#[derive(Error, Debug)]
pub enum StatsError {
    /// No finite values remained after NaN filtering.
    #[error("insufficient data points to compute median: {total} total values, 0 valid")]
    NoValidValues {
        /// Number of values supplied, including NaNs.
        total: usize,
    },
}

/// Median of a slice of values, filtering out NaNs but keeping infinities.
///
/// For even-length data returns the average of the two middle values.
pub fn median(values: &[f64]) -> Result<f64, StatsError> {
    let mut valid: Vec<f64> = values.iter().filter(|v| !v.is_nan()).copied().collect();
    if valid.is_empty() {
        return Err(StatsError::NoValidValues {
            total: values.len(),
        });
    }

    valid.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = valid.len() / 2;
    if valid.len() % 2 == 0 {
        Ok((valid[mid - 1] + valid[mid]) / 2.0)
    } else {
        Ok(valid[mid])
    }
}

/// Count and signal-to-noise summary of one pass's detections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnrSummary {
    /// Number of detections summarized.
    pub count: usize,
    /// Median S/N, or None for an empty pass.
    pub median_snr: Option<f64>,
    /// Number of detections at or above the S/N threshold the summary was
    /// built with.
    pub bright_count: usize,
}

impl SnrSummary {
    /// Summarize a set of S/N values against a brightness threshold.
    pub fn from_snrs(snrs: &[f64], bright_threshold: f64) -> Self {
        let bright_count = snrs.iter().filter(|&&s| s >= bright_threshold).count();
        Self {
            count: snrs.len(),
            median_snr: median(snrs).ok(),
            bright_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd_and_even() {
        assert_relative_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_relative_eq!(median(&[4.0, 1.0, 2.0, 3.0]).unwrap(), 2.5);
    }

    #[test]
    fn test_median_filters_nan() {
        assert_relative_eq!(median(&[f64::NAN, 1.0, 3.0]).unwrap(), 2.0);
    }

    #[test]
    fn test_median_all_nan_is_error() {
        assert!(median(&[f64::NAN, f64::NAN]).is_err());
        assert!(median(&[]).is_err());
    }

    #[test]
    fn test_snr_summary_counts_bright_sources() {
        let summary = SnrSummary::from_snrs(&[10.0, 6.0, 4.0, 2.0], 5.0);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.bright_count, 2);
        assert_relative_eq!(summary.median_snr.unwrap(), 5.0);
    }

    #[test]
    fn test_snr_summary_empty_pass() {
        let summary = SnrSummary::from_snrs(&[], 5.0);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.bright_count, 0);
        assert!(summary.median_snr.is_none());
    }
}
