//! Per-source detection records and their cross-pass status.

use serde::{Deserialize, Serialize};

/// Identifier of a source within one chip's catalogs.
///
/// Assigned sequentially by the detection engine within a pass and re-keyed
/// with a running offset when the pass is accumulated, so identifiers stay
/// unique across all passes of a chip. The PSF-fit catalog shares these
/// identifiers when it was seeded from the shape-based catalog.
pub type SourceId = u64;

/// Cross-pass resolution status of a detection.
///
/// The combined catalog never deletes rows; a source re-detected in a later
/// pass keeps both copies, with the stale one reclassified to `Superseded`.
/// At most one `Unique` or `Confirmed` row exists per physical source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionStatus {
    /// Detected in exactly one pass so far.
    Unique,
    /// Re-detected in a later pass; this row is the stale copy and is
    /// excluded from all downstream use.
    Superseded,
    /// The retained copy of a re-detected source.
    Confirmed,
}

impl DetectionStatus {
    /// Whether rows with this status participate in downstream computations.
    pub fn is_active(self) -> bool {
        !matches!(self, DetectionStatus::Superseded)
    }
}

/// One shape/aperture-based source measurement from a detection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Source identifier, unique within the chip once accumulated.
    pub id: SourceId,
    /// Centroid x-coordinate in image-plane pixels.
    pub x: f64,
    /// Centroid y-coordinate in image-plane pixels.
    pub y: f64,
    /// Shape/flux-derived instrumental magnitude.
    pub mag: f64,
    /// Magnitude uncertainty.
    pub mag_err: f64,
    /// Index of the detection pass this row came from (1-based).
    pub pass: u32,
    /// Cross-pass resolution status.
    pub status: DetectionStatus,
}

impl Detection {
    /// Signal-to-noise ratio of this measurement, defined as `1 / mag_err`.
    ///
    /// Returns infinity for a zero reported error; the statistics helpers
    /// tolerate that the same way they tolerate any other extreme value.
    pub fn snr(&self) -> f64 {
        1.0 / self.mag_err
    }

    /// Whether this row participates in downstream computations.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(status: DetectionStatus) -> Detection {
        Detection {
            id: 1,
            x: 10.0,
            y: 20.0,
            mag: 18.0,
            mag_err: 0.04,
            pass: 1,
            status,
        }
    }

    #[test]
    fn test_snr_is_inverse_mag_err() {
        let d = det(DetectionStatus::Unique);
        assert!((d.snr() - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_superseded_is_inactive() {
        assert!(det(DetectionStatus::Unique).is_active());
        assert!(det(DetectionStatus::Confirmed).is_active());
        assert!(!det(DetectionStatus::Superseded).is_active());
    }
}
