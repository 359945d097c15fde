//! Per-chip iteration controller.
//!
//! One controller instance drives one chip through the pass loop:
//! `Init -> RunPass -> Accumulate -> Evaluate -> {RunPass | Finalize}`.
//! Passes are strictly sequential within a chip: pass *n*'s threshold and
//! PSF seeds depend on pass *n-1*'s resolved combined catalog, and the
//! detection input for pass *n* is the source-subtracted residual from
//! pass *n-1*'s companion PSF fit. The fit itself always runs against the
//! original frame, seeded with the full surviving source set, so a
//! re-detected source is measured with its flux present rather than on a
//! frame its earlier twin was already subtracted from. The convergence
//! evaluator alone decides whether another pass runs.

use catalog::{CombinedCatalog, Detection, PsfCatalog, PsfKeying, ReconciledRecord};

use crate::chip::{ChipContext, ChipId, MetaStatus};
use crate::convergence::{ConvergenceState, Decision, StopReason};
use crate::engines::{
    ApertureCorrector, AstrometricSolver, ChipImage, DetectionEngine, EngineFailure, PassParams,
    PsfEngine, PsfModel,
};
use crate::error::{ChipError, ReconcileError};
use crate::reconcile::reconcile;
use crate::selection::select_psf_stars;

/// Pipeline phase for one chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChipPhase {
    /// Establish pass 1 and the first-pass threshold.
    Init,
    /// Run one detection pass.
    RunPass,
    /// Fold the pass into the combined catalog and run the companion
    /// PSF fit.
    Accumulate,
    /// Decide whether another pass runs.
    Evaluate,
    /// Reconcile the stable catalogs; terminal.
    Finalize,
}

/// Everything a finished chip hands back.
#[derive(Debug, Clone)]
pub struct ChipReduction {
    /// Identity of the reduced chip.
    pub id: ChipId,
    /// Final calibrated records, write-once.
    pub records: Vec<ReconciledRecord>,
    /// Full combined catalog, superseded rows included, for diagnostics.
    pub combined: CombinedCatalog,
    /// PSF-fit catalog from the final pass's fit, covering every active
    /// source.
    pub psf: PsfCatalog,
    /// Number of detection passes run.
    pub passes: u32,
    /// Why the pass loop stopped.
    pub stop_reason: StopReason,
    /// Aperture correction applied to the PSF magnitudes, in magnitudes.
    pub correction: f64,
}

/// State machine reducing one chip. Holds no state beyond the pass index
/// and the evolving catalogs; engines and astrometry are borrowed for the
/// duration of [`run`](ChipPipeline::run).
pub struct ChipPipeline {
    ctx: ChipContext,
    phase: ChipPhase,
    pass: u32,
    /// Original calibrated frame; every PSF fit runs on this.
    image: ChipImage,
    /// Detection input; the previous fit's residual from pass 2 on.
    detect_image: ChipImage,
    pending: Option<catalog::PassCatalog>,
    combined: CombinedCatalog,
    psf_catalog: PsfCatalog,
    model: Option<PsfModel>,
    calibration: Vec<Detection>,
}

impl ChipPipeline {
    /// Create the controller for one chip.
    pub fn new(ctx: ChipContext, image: ChipImage) -> Self {
        Self {
            ctx,
            phase: ChipPhase::Init,
            pass: 0,
            detect_image: image.clone(),
            image,
            pending: None,
            combined: CombinedCatalog::new(),
            // Seeds always come from the shape-based catalog, so the two
            // catalogs share identifiers.
            psf_catalog: PsfCatalog::new(PsfKeying::SharedIds),
            model: None,
            calibration: Vec::new(),
        }
    }

    /// Drive the chip to completion.
    pub fn run<D, P, C, A>(
        mut self,
        detection: &D,
        psf: &P,
        corrector: &C,
        solver: &A,
    ) -> Result<ChipReduction, ChipError>
    where
        D: DetectionEngine,
        P: PsfEngine,
        C: ApertureCorrector,
        A: AstrometricSolver,
    {
        loop {
            self.phase = match self.phase {
                ChipPhase::Init => self.handle_init(),
                ChipPhase::RunPass => self.handle_run_pass(detection)?,
                ChipPhase::Accumulate => self.handle_accumulate(psf)?,
                ChipPhase::Evaluate => match self.handle_evaluate() {
                    (next, None) => next,
                    (next, Some(reason)) => {
                        debug_assert_eq!(next, ChipPhase::Finalize);
                        return self.finalize(reason, corrector, solver);
                    }
                },
                ChipPhase::Finalize => unreachable!("finalize returns directly"),
            };
        }
    }

    fn handle_init(&mut self) -> ChipPhase {
        log::info!(
            "[{}] starting reduction ({} passes max)",
            self.ctx.id,
            self.ctx.config.convergence.max_passes
        );
        if self.ctx.meta.status == MetaStatus::Unresolved {
            log::warn!(
                "[{}] chip metadata incomplete, survey defaults in use",
                self.ctx.id
            );
        }
        self.pass = 1;
        ChipPhase::RunPass
    }

    fn handle_run_pass<D: DetectionEngine>(&mut self, detection: &D) -> Result<ChipPhase, ChipError> {
        let params = PassParams {
            pass: self.pass,
            threshold: self.ctx.config.threshold_for_pass(self.pass),
        };
        log::info!(
            "[{}] detection pass {} at threshold {:.2}",
            self.ctx.id,
            params.pass,
            params.threshold
        );
        let pass_catalog = detection
            .run_pass(&self.detect_image, &params)
            .map_err(|source| ChipError::Detection {
                pass: self.pass,
                source,
            })?;
        log::info!(
            "[{}] pass {} found {} sources (mag limit {:.2})",
            self.ctx.id,
            self.pass,
            pass_catalog.len(),
            pass_catalog.mag_limit
        );
        self.pending = Some(pass_catalog);
        Ok(ChipPhase::Accumulate)
    }

    fn handle_accumulate<P: PsfEngine>(&mut self, psf: &P) -> Result<ChipPhase, ChipError> {
        let Some(pass_catalog) = self.pending.take() else {
            unreachable!("accumulate scheduled without a completed detection pass");
        };
        self.combined = self
            .combined
            .accumulate(&pass_catalog, self.ctx.config.match_tolerance);

        // Pass 1 anchors the PSF model: pick calibration stars and derive
        // the fit model, a one-time step.
        if self.pass == 1 {
            self.calibration = select_psf_stars(
                &self.combined,
                self.ctx.config.psf_star_count,
                self.ctx.config.convergence.snr_floor,
            );
            let model = psf
                .build_model(&self.image, &self.calibration)
                .map_err(ChipError::PsfModel)?;
            log::info!(
                "[{}] PSF model built from {} stars (fwhm {:.2} px, chi {:.2})",
                self.ctx.id,
                model.nstars,
                model.fwhm,
                model.chi
            );
            self.model = Some(model);
        }

        // Companion PSF fit: the full surviving set against the original
        // frame. A re-detected source must be measured with its flux
        // present, not on the residual its superseded twin's fit left.
        let seeds: Vec<Detection> = self.combined.active().cloned().collect();
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| ChipError::PsfModel(EngineFailure("no PSF model derived".to_string())))?;
        let outcome = psf
            .fit_and_measure(&self.image, &seeds, model)
            .map_err(|source| ChipError::PsfFit {
                pass: self.pass,
                source,
            })?;
        log::debug!(
            "[{}] pass {} PSF fit measured {} of {} active sources",
            self.ctx.id,
            self.pass,
            outcome.sources.len(),
            seeds.len()
        );
        // Latest fit covers everything the previous one did.
        self.psf_catalog = PsfCatalog::from_sources(PsfKeying::SharedIds, outcome.sources);
        // The next detection pass digs into the source-subtracted frame.
        self.detect_image = self.image.with_data(outcome.residual);

        Ok(ChipPhase::Evaluate)
    }

    fn handle_evaluate(&mut self) -> (ChipPhase, Option<StopReason>) {
        let state = ConvergenceState::from_catalog(&self.combined, &self.ctx.config.convergence);
        match state.evaluate(&self.ctx.config.convergence) {
            Decision::Continue => {
                log::info!("[{}] {}; continuing", self.ctx.id, state.log_line());
                self.pass += 1;
                (ChipPhase::RunPass, None)
            }
            Decision::Stop(reason) => {
                log::info!("[{}] {}; stopping: {}", self.ctx.id, state.log_line(), reason);
                (ChipPhase::Finalize, Some(reason))
            }
        }
    }

    fn finalize<C, A>(
        self,
        stop_reason: StopReason,
        corrector: &C,
        solver: &A,
    ) -> Result<ChipReduction, ChipError>
    where
        C: ApertureCorrector,
        A: AstrometricSolver,
    {
        let model = self.model.as_ref().ok_or_else(|| {
            ChipError::Reconcile(ReconcileError::MissingApertureCorrection(EngineFailure(
                "no PSF model for aperture correction".to_string(),
            )))
        })?;
        let correction = corrector
            .estimate(model, &self.calibration)
            .map_err(|e| ChipError::Reconcile(ReconcileError::MissingApertureCorrection(e)))?;
        log::info!(
            "[{}] aperture correction {:.3} mag",
            self.ctx.id,
            correction
        );

        let records = reconcile(
            &self.ctx,
            &self.combined,
            Some(&self.psf_catalog),
            Some(correction),
            solver,
        )?;

        Ok(ChipReduction {
            id: self.ctx.id,
            records,
            combined: self.combined,
            psf: self.psf_catalog,
            passes: self.pass,
            stop_reason,
            correction,
        })
    }
}
