//! Iterative source measurement pipeline for mosaic camera exposures.
//!
//! Reduces a multi-chip exposure into calibrated per-chip source catalogs by
//! running two complementary measurement methods to convergence and
//! reconciling their outputs. Per chip, the [`controller::ChipPipeline`]
//! state machine drives detection passes at falling thresholds through an
//! external [`engines::DetectionEngine`], folds each pass into a combined
//! catalog with cross-pass duplicate resolution, runs a companion PSF fit
//! seeded by the surviving positions, and stops once additional passes no
//! longer contribute statistically meaningful sources. Finalization merges
//! the shape-based and PSF-fit catalogs into one calibrated table.
//!
//! Chips are independent units of work: the [`exposure`] driver reduces
//! them in parallel and isolates failures per chip.

pub mod chip;
pub mod config;
pub mod controller;
pub mod convergence;
pub mod engines;
pub mod error;
pub mod exposure;
pub mod reconcile;
pub mod selection;
pub mod writer;

pub use chip::{ChipContext, ChipId, ChipMeta};
pub use config::{ConvergenceConfig, ReductionConfig};
pub use controller::{ChipPipeline, ChipReduction};
pub use convergence::{ConvergenceState, Decision, StopReason};
pub use error::{ChipError, ReconcileError};
pub use exposure::{reduce_exposure, ChipOutcome, ChipTask};
