//! PSF-fit catalog produced by the model-fitting photometry method.

use serde::{Deserialize, Serialize};

use crate::detection::SourceId;

/// How PSF-fit sources correspond to shape-based detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsfKeying {
    /// The fit was seeded from the shape-based catalog, so both catalogs
    /// share source identifiers and reconciliation joins by id.
    SharedIds,
    /// The fit produced its own detection list; identifiers are private to
    /// the PSF catalog and reconciliation joins by nearest coordinate.
    Independent,
}

/// One source measured by PSF fitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsfSource {
    /// Source identifier. Shared with the shape-based catalog under
    /// [`PsfKeying::SharedIds`], otherwise private to the PSF catalog.
    pub id: SourceId,
    /// Fitted x-coordinate in image-plane pixels.
    pub x: f64,
    /// Fitted y-coordinate in image-plane pixels.
    pub y: f64,
    /// Instrumental PSF magnitude, before aperture correction.
    pub mag: f64,
    /// Magnitude uncertainty from the fit.
    pub mag_err: f64,
    /// Local sky estimate at the source.
    pub sky: f64,
    /// Number of fit iterations used.
    pub niter: u32,
    /// Chi statistic of the fit.
    pub chi: f64,
    /// Sharpness statistic of the fit.
    pub sharp: f64,
}

/// The PSF-fit catalog for one chip.
///
/// Each detection pass's companion fit re-measures the full active source
/// set, so the latest fit supersedes the previous one and the catalog
/// always covers every surviving position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsfCatalog {
    /// Identifier correspondence with the shape-based catalog.
    pub keying: PsfKeying,
    /// Fitted sources in accumulation order.
    pub sources: Vec<PsfSource>,
}

impl PsfCatalog {
    /// An empty catalog with the given keying.
    pub fn new(keying: PsfKeying) -> Self {
        Self {
            keying,
            sources: Vec::new(),
        }
    }

    /// A catalog holding one fit's complete output.
    pub fn from_sources(keying: PsfKeying, sources: Vec<PsfSource>) -> Self {
        Self { keying, sources }
    }

    /// Number of fitted sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no fit has contributed any source yet.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
