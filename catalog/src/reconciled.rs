//! Final reconciled output rows.

use serde::{Deserialize, Serialize};

use crate::detection::{Detection, DetectionStatus, SourceId};

/// One row of the final calibrated catalog: the union of the shape-based
/// and PSF-fit measurements for a single physical source.
///
/// Created once at reconciliation time and never mutated. PSF fields use
/// sentinel values when the source has no PSF-fit counterpart: `NAN` for
/// measurements and `-1` for the independent PSF identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciledRecord {
    /// Stable per-source identifier, from the shape-based catalog.
    pub id: SourceId,
    /// Shape-based centroid x-coordinate in pixels.
    pub x: f64,
    /// Shape-based centroid y-coordinate in pixels.
    pub y: f64,
    /// Shape/aperture magnitude.
    pub mag: f64,
    /// Shape/aperture magnitude uncertainty.
    pub mag_err: f64,
    /// Detection pass the source was found in.
    pub pass: u32,
    /// Cross-pass status of the retained shape-based row.
    pub status: DetectionStatus,
    /// Identifier of the matched PSF source when the PSF catalog used its
    /// own identifiers; `-1` when joined by shared id or unmatched.
    pub psf_id: i64,
    /// Fitted PSF x-coordinate, NaN when unmatched.
    pub x_psf: f64,
    /// Fitted PSF y-coordinate, NaN when unmatched.
    pub y_psf: f64,
    /// Aperture-corrected PSF magnitude, NaN when unmatched.
    pub mag_psf: f64,
    /// PSF magnitude uncertainty, NaN when unmatched.
    pub mag_err_psf: f64,
    /// Local sky estimate from the fit, NaN when unmatched.
    pub sky: f64,
    /// PSF fit iteration count, NaN when unmatched.
    pub niter: f64,
    /// Chi statistic of the fit, NaN when unmatched.
    pub chi: f64,
    /// Sharpness statistic of the fit, NaN when unmatched.
    pub sharp: f64,
    /// Right ascension in degrees.
    pub ra: f64,
    /// Declination in degrees.
    pub dec: f64,
}

impl ReconciledRecord {
    /// Start a record from the shape-based detection alone, with all PSF
    /// fields at their sentinel values and world coordinates unset.
    pub fn from_detection(det: &Detection) -> Self {
        Self {
            id: det.id,
            x: det.x,
            y: det.y,
            mag: det.mag,
            mag_err: det.mag_err,
            pass: det.pass,
            status: det.status,
            psf_id: -1,
            x_psf: f64::NAN,
            y_psf: f64::NAN,
            mag_psf: f64::NAN,
            mag_err_psf: f64::NAN,
            sky: f64::NAN,
            niter: f64::NAN,
            chi: f64::NAN,
            sharp: f64::NAN,
            ra: f64::NAN,
            dec: f64::NAN,
        }
    }

    /// Whether PSF-fit information was reconciled into this record.
    pub fn has_psf(&self) -> bool {
        !self.mag_psf.is_nan()
    }
}
