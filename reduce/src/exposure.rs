//! Exposure-level fan-out.
//!
//! An exposure is a set of chips that share nothing at runtime: each chip
//! carries its own image, metadata, catalogs, and pass loop. Chips are
//! reduced in parallel, and one chip's failure is recorded and logged
//! without disturbing the others.

use rayon::prelude::*;

use crate::chip::{ChipContext, ChipId};
use crate::controller::{ChipPipeline, ChipReduction};
use crate::engines::{ApertureCorrector, AstrometricSolver, ChipImage, DetectionEngine, PsfEngine};
use crate::error::ChipError;

/// One chip's full reduction input: context, pixels, and the engines
/// that will process it. Engines are owned per task so chip-specific
/// collaborators (and shared ones, by reference) both fit.
pub struct ChipTask<D, P, C, A> {
    /// Chip identity, metadata, and configuration.
    pub ctx: ChipContext,
    /// Calibrated pixels for the first detection pass.
    pub image: ChipImage,
    /// Shape/aperture detection engine.
    pub detection: D,
    /// PSF modelling and fitting engine.
    pub psf: P,
    /// Aperture correction estimator.
    pub corrector: C,
    /// Pixel-to-world transform.
    pub solver: A,
}

/// What one chip produced: its final catalog, or the error that stopped it.
pub struct ChipOutcome {
    /// Identity of the chip.
    pub id: ChipId,
    /// Reduction result. A failed chip stays failed; there is no retry.
    pub result: Result<ChipReduction, ChipError>,
}

impl ChipOutcome {
    /// Whether the chip completed its reduction.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Reduce every chip of an exposure, in parallel.
///
/// Outcomes come back in task order regardless of which chip finished
/// first. Engine errors are captured per chip, never propagated across
/// chips.
pub fn reduce_exposure<D, P, C, A>(tasks: Vec<ChipTask<D, P, C, A>>) -> Vec<ChipOutcome>
where
    D: DetectionEngine + Send,
    P: PsfEngine + Send,
    C: ApertureCorrector + Send,
    A: AstrometricSolver + Send,
{
    let chip_count = tasks.len();
    log::info!("reducing exposure: {chip_count} chips");

    let outcomes: Vec<ChipOutcome> = tasks
        .into_par_iter()
        .map(|task| {
            let id = task.ctx.id.clone();
            let result = ChipPipeline::new(task.ctx, task.image).run(
                &task.detection,
                &task.psf,
                &task.corrector,
                &task.solver,
            );
            if let Err(err) = &result {
                log::error!("[{id}] reduction failed: {err}");
            }
            ChipOutcome { id, result }
        })
        .collect();

    let ok = outcomes.iter().filter(|o| o.is_ok()).count();
    log::info!("exposure done: {ok}/{chip_count} chips reduced");
    outcomes
}
