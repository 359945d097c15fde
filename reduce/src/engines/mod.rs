//! External collaborator boundary: detection, PSF fitting, aperture
//! correction, and astrometry.
//!
//! The pipeline core never implements photometry itself; it drives these
//! narrow trait contracts. Production deployments wrap the external
//! engines behind them; [`synthetic`] provides deterministic in-process
//! implementations for tests and the demo binary.
//!
//! Engine failures are deterministic for fixed inputs, so the pipeline
//! never retries a failed call.

pub mod synthetic;
pub mod wcs;

use ndarray::Array2;
use thiserror::Error;

use catalog::{Detection, PassCatalog, PsfSource};

use crate::chip::ChipMeta;

/// Failure reported by an external engine invocation.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct EngineFailure(pub String);

/// One chip's pixel data as consumed by the engines.
///
/// Bundles the flux image with its inverse-variance weight map and
/// bad-pixel mask. All three share dimensions (rows, columns).
#[derive(Debug, Clone)]
pub struct ChipImage {
    /// Flux image in detector counts.
    pub data: Array2<f64>,
    /// Inverse-variance weight map; zero marks unusable pixels.
    pub weight: Array2<f64>,
    /// Bad-pixel mask; nonzero marks a defective or saturated pixel.
    pub mask: Array2<u8>,
}

impl ChipImage {
    /// Derive the weight map and bad-pixel mask from a flux image and the
    /// chip's noise model.
    ///
    /// Per-pixel noise is `sqrt(max(flux, 0) / gain + rdnoise^2)`, floored
    /// at one count; pixels above the saturation level get zero weight and
    /// a mask flag.
    pub fn from_flux(data: Array2<f64>, meta: &ChipMeta) -> Self {
        let mut weight = Array2::<f64>::zeros(data.raw_dim());
        let mut mask = Array2::<u8>::zeros(data.raw_dim());

        ndarray::Zip::from(&data)
            .and(&mut weight)
            .and(&mut mask)
            .for_each(|&flux, w, m| {
                if flux > meta.saturation {
                    *w = 0.0;
                    *m = 1;
                } else {
                    let noise = (flux.max(0.0) / meta.gain + meta.read_noise * meta.read_noise)
                        .sqrt()
                        .max(1.0);
                    *w = 1.0 / (noise * noise);
                }
            });

        Self { data, weight, mask }
    }

    /// Image dimensions as (rows, columns).
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Replace the flux plane, keeping the weight map and mask.
    ///
    /// Used when a PSF fit hands back the source-subtracted residual for
    /// the next detection pass.
    pub fn with_data(&self, data: Array2<f64>) -> Self {
        Self {
            data,
            weight: self.weight.clone(),
            mask: self.mask.clone(),
        }
    }
}

/// Parameters for one detection pass.
#[derive(Debug, Clone, Copy)]
pub struct PassParams {
    /// Pass index (1-based).
    pub pass: u32,
    /// Detection threshold in sigma above background.
    pub threshold: f64,
}

/// Opaque summary of the PSF model fitted on pass 1.
#[derive(Debug, Clone)]
pub struct PsfModel {
    /// Full width at half maximum of the fitted profile, in pixels.
    pub fwhm: f64,
    /// Number of calibration stars the fit retained.
    pub nstars: usize,
    /// Goodness-of-fit statistic of the model.
    pub chi: f64,
}

/// Result of one companion PSF-fit pass.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Fitted sources, keyed by the seed identifiers.
    pub sources: Vec<PsfSource>,
    /// Flux image with the fitted sources subtracted; input for the next
    /// detection pass.
    pub residual: Array2<f64>,
}

/// Shape/aperture detection and photometry engine.
pub trait DetectionEngine {
    /// Run one detection pass over the image at the given threshold.
    fn run_pass(&self, image: &ChipImage, params: &PassParams)
        -> Result<PassCatalog, EngineFailure>;
}

/// PSF model building and model-fitting photometry engine.
pub trait PsfEngine {
    /// Derive the chip's PSF model from calibration stars. Invoked once
    /// per chip, on pass 1.
    fn build_model(
        &self,
        image: &ChipImage,
        calibration: &[Detection],
    ) -> Result<PsfModel, EngineFailure>;

    /// Fit the model at the seed positions and measure PSF magnitudes.
    fn fit_and_measure(
        &self,
        image: &ChipImage,
        seeds: &[Detection],
        model: &PsfModel,
    ) -> Result<FitOutcome, EngineFailure>;
}

/// Estimator of the scalar aperture correction aligning PSF magnitudes to
/// the calibrated photometric scale. Consumed once per chip before
/// reconciliation.
pub trait ApertureCorrector {
    /// Estimate the correction in magnitudes.
    fn estimate(&self, model: &PsfModel, calibration: &[Detection]) -> Result<f64, EngineFailure>;
}

/// The chip's astrometric solution.
pub trait AstrometricSolver {
    /// Convert a pixel position to world coordinates (ra, dec) in degrees.
    fn pixel_to_world(&self, x: f64, y: f64) -> (f64, f64);
}

// A shared engine can serve several chips; per-chip tasks then hold plain
// references.
impl<T: DetectionEngine + ?Sized> DetectionEngine for &T {
    fn run_pass(
        &self,
        image: &ChipImage,
        params: &PassParams,
    ) -> Result<PassCatalog, EngineFailure> {
        (**self).run_pass(image, params)
    }
}

impl<T: PsfEngine + ?Sized> PsfEngine for &T {
    fn build_model(
        &self,
        image: &ChipImage,
        calibration: &[Detection],
    ) -> Result<PsfModel, EngineFailure> {
        (**self).build_model(image, calibration)
    }

    fn fit_and_measure(
        &self,
        image: &ChipImage,
        seeds: &[Detection],
        model: &PsfModel,
    ) -> Result<FitOutcome, EngineFailure> {
        (**self).fit_and_measure(image, seeds, model)
    }
}

impl<T: ApertureCorrector + ?Sized> ApertureCorrector for &T {
    fn estimate(&self, model: &PsfModel, calibration: &[Detection]) -> Result<f64, EngineFailure> {
        (**self).estimate(model, calibration)
    }
}

impl<T: AstrometricSolver + ?Sized> AstrometricSolver for &T {
    fn pixel_to_world(&self, x: f64, y: f64) -> (f64, f64) {
        (**self).pixel_to_world(x, y)
    }
}
