//! Deterministic synthetic collaborators.
//!
//! A synthetic star field stands in for the external detection and
//! photometry engines, so the full pipeline can run end to end with no
//! external processes: the integration tests and the demo binary both
//! drive it. All randomness is seeded `ChaCha8Rng`, so a given seed
//! reproduces the same exposure bit for bit.
//!
//! The detection engine replays the truth table rather than measuring
//! pixels: each pass reaches a magnitude limit that deepens with falling
//! threshold and pass index (the residual images really do lose their
//! fitted sources, but the replay is what keeps the tests deterministic).
//! A small deterministic subset of earlier sources is re-detected each
//! pass to exercise cross-pass supersession.

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use catalog::{Detection, DetectionStatus, PassCatalog, PsfSource};

use super::{
    ApertureCorrector, ChipImage, DetectionEngine, EngineFailure, FitOutcome, PassParams,
    PsfEngine, PsfModel,
};
use crate::chip::ChipMeta;

/// Photometric zero point used to convert magnitudes to counts.
const ZERO_POINT: f64 = 25.0;
/// Sky background level in counts.
const BACKGROUND: f64 = 100.0;
/// FWHM of the rendered Gaussian PSF in pixels.
const PSF_FWHM: f64 = 3.2;

/// One truth source of the synthetic field.
#[derive(Debug, Clone)]
pub struct SyntheticStar {
    /// True x position in pixels.
    pub x: f64,
    /// True y position in pixels.
    pub y: f64,
    /// True magnitude.
    pub mag: f64,
}

/// A synthetic star field for one chip.
#[derive(Debug, Clone)]
pub struct SyntheticField {
    /// Truth sources, brightest first.
    pub stars: Vec<SyntheticStar>,
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
    /// Magnitude at which a measured source has S/N 5.
    pub m5: f64,
    /// Base seed for all derived randomness.
    pub seed: u64,
}

impl SyntheticField {
    /// Generate a field of `n_stars` sources with magnitudes uniform in
    /// [14, 22], positions clear of the chip edges.
    pub fn generate(width: usize, height: usize, n_stars: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let margin = 8.0;
        let mut stars: Vec<SyntheticStar> = (0..n_stars)
            .map(|_| SyntheticStar {
                x: rng.gen_range(margin..(width as f64 - margin)),
                y: rng.gen_range(margin..(height as f64 - margin)),
                mag: rng.gen_range(14.0..22.0),
            })
            .collect();
        stars.sort_by(|a, b| a.mag.partial_cmp(&b.mag).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            stars,
            width,
            height,
            m5: 20.5,
            seed,
        }
    }

    /// Render the field into a chip image: Gaussian profiles over a flat
    /// sky background with seeded pixel noise.
    pub fn render(&self, meta: &ChipMeta) -> ChipImage {
        let mut data = Array2::<f64>::from_elem((self.height, self.width), BACKGROUND);
        for star in &self.stars {
            let flux = mag_to_flux(star.mag);
            add_gaussian(&mut data, star.x, star.y, flux);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(1));
        for pixel in data.iter_mut() {
            *pixel += rng.gen_range(-3.0..3.0);
        }
        ChipImage::from_flux(data, meta)
    }

    /// Measured S/N of a source at the given magnitude.
    fn snr(&self, mag: f64) -> f64 {
        5.0 * 10f64.powf(0.4 * (self.m5 - mag))
    }

    /// Magnitude limit reached by one detection pass.
    ///
    /// Falling thresholds reach deeper, and each pass digs further into
    /// the source-subtracted residual.
    fn pass_limit(&self, params: &PassParams) -> f64 {
        let ceiling = self.stars.last().map(|s| s.mag).unwrap_or(22.0);
        (self.m5 - 1.2 * params.threshold + 0.45 * (params.pass as f64 - 1.0)).min(ceiling)
    }
}

fn mag_to_flux(mag: f64) -> f64 {
    10f64.powf(0.4 * (ZERO_POINT - mag))
}

/// Add a Gaussian profile of total `flux` at (`x0`, `y0`).
fn add_gaussian(data: &mut Array2<f64>, x0: f64, y0: f64, flux: f64) {
    let sigma = PSF_FWHM / 2.355;
    let peak = flux / (2.0 * std::f64::consts::PI * sigma * sigma);
    let radius = (4.0 * sigma).ceil() as isize;
    let (height, width) = data.dim();

    let x_min = (x0 as isize - radius).max(0) as usize;
    let x_max = ((x0 as isize + radius + 1).min(width as isize)) as usize;
    let y_min = (y0 as isize - radius).max(0) as usize;
    let y_max = ((y0 as isize + radius + 1).min(height as isize)) as usize;

    for y in y_min..y_max {
        for x in x_min..x_max {
            let dx = x as f64 - x0;
            let dy = y as f64 - y0;
            let r2 = dx * dx + dy * dy;
            data[[y, x]] += peak * (-r2 / (2.0 * sigma * sigma)).exp();
        }
    }
}

/// Subtract a Gaussian profile, clamping pixels at zero.
fn subtract_gaussian(data: &mut Array2<f64>, x0: f64, y0: f64, flux: f64) {
    let mut negated = Array2::zeros(data.raw_dim());
    add_gaussian(&mut negated, x0, y0, flux);
    for (pixel, sub) in data.iter_mut().zip(negated.iter()) {
        *pixel = (*pixel - sub).max(0.0);
    }
}

/// Shape/aperture detection engine over a synthetic field.
#[derive(Debug, Clone)]
pub struct SyntheticDetection {
    field: SyntheticField,
    /// Centroid jitter applied per detection, in pixels.
    pub jitter: f64,
    /// Every `redetect_every`-th previously-reachable star is re-detected
    /// on passes after the first.
    pub redetect_every: usize,
}

impl SyntheticDetection {
    /// Detection engine over the given truth field.
    pub fn new(field: SyntheticField) -> Self {
        Self {
            field,
            jitter: 0.25,
            redetect_every: 7,
        }
    }

    fn measure(&self, star: &SyntheticStar, rng: &mut ChaCha8Rng) -> Detection {
        let snr = self.field.snr(star.mag).max(0.2);
        let mag_err = (1.0857 / snr).max(0.001);
        Detection {
            id: 0,
            x: star.x + rng.gen_range(-self.jitter..self.jitter),
            y: star.y + rng.gen_range(-self.jitter..self.jitter),
            mag: star.mag + rng.gen_range(-0.5..0.5) * mag_err,
            mag_err,
            pass: 0,
            status: DetectionStatus::Unique,
        }
    }
}

impl DetectionEngine for SyntheticDetection {
    fn run_pass(
        &self,
        image: &ChipImage,
        params: &PassParams,
    ) -> Result<PassCatalog, EngineFailure> {
        let (height, width) = image.dim();
        if height != self.field.height || width != self.field.width {
            return Err(EngineFailure(format!(
                "image dimensions {width}x{height} do not match field {}x{}",
                self.field.width, self.field.height
            )));
        }

        let mut rng =
            ChaCha8Rng::seed_from_u64(self.field.seed.wrapping_add(1000 + params.pass as u64));
        let limit = self.field.pass_limit(params);
        let prev_limit = if params.pass > 1 {
            self.field.pass_limit(&PassParams {
                pass: params.pass - 1,
                threshold: params.threshold,
            })
        } else {
            f64::NEG_INFINITY
        };

        let mut detections = Vec::new();
        for (i, star) in self.field.stars.iter().enumerate() {
            let fresh = star.mag <= limit && star.mag > prev_limit;
            // Imperfect subtraction leaves a few of the old sources
            // re-detectable on deeper passes.
            let repeat =
                params.pass > 1 && star.mag <= prev_limit && i % self.redetect_every == 0;
            if fresh || repeat {
                detections.push(self.measure(star, &mut rng));
            }
        }

        Ok(PassCatalog::new(params.pass, params.threshold, detections))
    }
}

/// PSF-fit engine over the same synthetic field.
#[derive(Debug, Clone)]
pub struct SyntheticPsf {
    /// True instrumental offset of the PSF magnitudes; the aperture
    /// correction the reconciler should remove.
    pub instrumental_offset: f64,
    /// Base seed for fit scatter.
    pub seed: u64,
}

impl SyntheticPsf {
    /// PSF engine with the given instrumental magnitude offset.
    pub fn new(instrumental_offset: f64, seed: u64) -> Self {
        Self {
            instrumental_offset,
            seed,
        }
    }
}

impl PsfEngine for SyntheticPsf {
    fn build_model(
        &self,
        _image: &ChipImage,
        calibration: &[Detection],
    ) -> Result<PsfModel, EngineFailure> {
        if calibration.len() < 6 {
            return Err(EngineFailure(format!(
                "need at least 6 calibration stars, got {}",
                calibration.len()
            )));
        }
        Ok(PsfModel {
            fwhm: PSF_FWHM,
            nstars: calibration.len(),
            chi: 1.02,
        })
    }

    fn fit_and_measure(
        &self,
        image: &ChipImage,
        seeds: &[Detection],
        model: &PsfModel,
    ) -> Result<FitOutcome, EngineFailure> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(2000));
        let mut residual = image.data.clone();
        let sources = seeds
            .iter()
            .map(|seed| {
                let mag_err = (seed.mag_err * 0.8).max(0.001);
                let mag = seed.mag + self.instrumental_offset + rng.gen_range(-0.5..0.5) * mag_err;
                subtract_gaussian(&mut residual, seed.x, seed.y, mag_to_flux(seed.mag));
                PsfSource {
                    id: seed.id,
                    x: seed.x + rng.gen_range(-0.05..0.05),
                    y: seed.y + rng.gen_range(-0.05..0.05),
                    mag,
                    mag_err,
                    sky: BACKGROUND,
                    niter: rng.gen_range(2..6),
                    chi: model.chi + rng.gen_range(-0.1..0.1),
                    sharp: 0.3 + rng.gen_range(-0.05..0.05),
                }
            })
            .collect();
        Ok(FitOutcome { sources, residual })
    }
}

/// Aperture-correction estimator returning a fixed, known correction.
#[derive(Debug, Clone)]
pub struct FixedApertureCorrector {
    /// Correction in magnitudes.
    pub correction: f64,
}

impl ApertureCorrector for FixedApertureCorrector {
    fn estimate(&self, _model: &PsfModel, calibration: &[Detection]) -> Result<f64, EngineFailure> {
        if calibration.is_empty() {
            return Err(EngineFailure(
                "no calibration stars to estimate correction from".to_string(),
            ));
        }
        Ok(self.correction)
    }
}

/// Convenience bundle: everything needed to reduce one synthetic chip.
#[derive(Debug, Clone)]
pub struct SyntheticChip {
    /// Truth field.
    pub field: SyntheticField,
    /// Detection engine over the field.
    pub detection: SyntheticDetection,
    /// PSF engine over the field.
    pub psf: SyntheticPsf,
    /// Aperture correction estimator.
    pub corrector: FixedApertureCorrector,
}

impl SyntheticChip {
    /// Build a synthetic chip with the given truth-field shape.
    pub fn new(width: usize, height: usize, n_stars: usize, seed: u64) -> Self {
        let field = SyntheticField::generate(width, height, n_stars, seed);
        let detection = SyntheticDetection::new(field.clone());
        let psf = SyntheticPsf::new(0.42, seed);
        let corrector = FixedApertureCorrector { correction: 0.42 };
        Self {
            field,
            detection,
            psf,
            corrector,
        }
    }

    /// Render the chip's pixels.
    pub fn render(&self, meta: &ChipMeta) -> ChipImage {
        self.field.render(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::ChipMeta;

    fn params(pass: u32, threshold: f64) -> PassParams {
        PassParams { pass, threshold }
    }

    #[test]
    fn test_generation_is_seed_deterministic() {
        let a = SyntheticField::generate(128, 128, 50, 99);
        let b = SyntheticField::generate(128, 128, 50, 99);
        assert_eq!(a.stars.len(), b.stars.len());
        for (sa, sb) in a.stars.iter().zip(&b.stars) {
            assert_eq!(sa.x.to_bits(), sb.x.to_bits());
            assert_eq!(sa.mag.to_bits(), sb.mag.to_bits());
        }
    }

    #[test]
    fn test_deeper_pass_reaches_fainter_sources() {
        let field = SyntheticField::generate(128, 128, 50, 7);
        let first = field.pass_limit(&params(1, 1.7));
        let second = field.pass_limit(&params(2, 1.1));
        assert!(second > first);
    }

    #[test]
    fn test_detection_pass_is_deterministic() {
        let chip = SyntheticChip::new(128, 128, 80, 11);
        let image = chip.render(&ChipMeta::default());
        let p = params(1, 1.7);
        let a = chip.detection.run_pass(&image, &p).unwrap();
        let b = chip.detection.run_pass(&image, &p).unwrap();
        assert_eq!(a.len(), b.len());
        for (da, db) in a.detections.iter().zip(&b.detections) {
            assert_eq!(da.x.to_bits(), db.x.to_bits());
        }
    }

    #[test]
    fn test_dimension_mismatch_is_engine_failure() {
        let chip = SyntheticChip::new(128, 128, 80, 11);
        let meta = ChipMeta::default();
        let wrong = ChipImage::from_flux(Array2::zeros((64, 64)), &meta);
        assert!(chip.detection.run_pass(&wrong, &params(1, 1.7)).is_err());
    }

    #[test]
    fn test_model_build_requires_calibration_stars() {
        let psf = SyntheticPsf::new(0.4, 3);
        let meta = ChipMeta::default();
        let image = ChipImage::from_flux(Array2::zeros((32, 32)), &meta);
        assert!(psf.build_model(&image, &[]).is_err());
    }

    #[test]
    fn test_fit_subtracts_sources_from_residual() {
        let chip = SyntheticChip::new(64, 64, 1, 21);
        let meta = ChipMeta::default();
        let image = chip.render(&meta);
        let star = &chip.field.stars[0];
        let seed = Detection {
            id: 1,
            x: star.x,
            y: star.y,
            mag: star.mag,
            mag_err: 0.02,
            pass: 1,
            status: DetectionStatus::Unique,
        };
        let model = PsfModel {
            fwhm: PSF_FWHM,
            nstars: 10,
            chi: 1.0,
        };
        let outcome = chip.psf.fit_and_measure(&image, &[seed], &model).unwrap();
        let (y, x) = (star.y.round() as usize, star.x.round() as usize);
        assert!(outcome.residual[[y, x]] < image.data[[y, x]]);
    }
}
