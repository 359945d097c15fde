//! Raw output of one detection pass.

use serde::{Deserialize, Serialize};

use crate::detection::Detection;

/// The raw catalog produced by one detection pass.
///
/// Immutable once produced by the detection engine: the accumulator copies
/// its rows into the combined catalog rather than editing it. Identifiers
/// are sequential within the pass starting from the offset the engine was
/// given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassCatalog {
    /// Pass index this catalog came from (1-based).
    pub pass: u32,
    /// Detection threshold the pass was run at, in sigma above background.
    pub threshold: f64,
    /// Estimated limiting magnitude of the pass: the faintest detection
    /// with S/N >= 5, or NaN when no detection reaches that.
    pub mag_limit: f64,
    /// Detections in engine output order.
    pub detections: Vec<Detection>,
}

impl PassCatalog {
    /// Build a pass catalog, deriving the magnitude-limit estimate.
    pub fn new(pass: u32, threshold: f64, detections: Vec<Detection>) -> Self {
        let mag_limit = detections
            .iter()
            .filter(|d| d.snr() >= 5.0)
            .map(|d| d.mag)
            .fold(f64::NAN, f64::max);
        Self {
            pass,
            threshold,
            mag_limit,
            detections,
        }
    }

    /// Number of detections in the pass.
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Whether the pass found nothing.
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
