use thiserror::Error;

use crate::engines::EngineFailure;

/// Errors that abort processing of the current chip.
///
/// All failures are deterministic given the inputs, so nothing here is
/// retried: a failed chip is reported with its stage and pass index and the
/// exposure moves on to the remaining chips.
#[derive(Error, Debug)]
pub enum ChipError {
    /// A detection pass failed; fatal to the chip's loop.
    #[error("detection pass {pass} failed")]
    Detection {
        /// Pass index that failed (1-based).
        pass: u32,
        /// Underlying engine failure.
        #[source]
        source: EngineFailure,
    },

    /// The one-time PSF model build on pass 1 failed.
    #[error("PSF model build failed")]
    PsfModel(#[source] EngineFailure),

    /// A companion PSF-fit pass failed.
    #[error("PSF fit on pass {pass} failed")]
    PsfFit {
        /// Pass index whose companion fit failed (1-based).
        pass: u32,
        /// Underlying engine failure.
        #[source]
        source: EngineFailure,
    },

    /// Reconciliation of the final catalogs failed; per-pass catalogs
    /// remain available for diagnostics.
    #[error("reconciliation failed")]
    Reconcile(#[from] ReconcileError),

    /// Writing the final catalog failed.
    #[error("catalog write failed")]
    Write(#[from] std::io::Error),
}

/// Failures of the final output step only.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// No aperture correction was produced for the chip.
    #[error("no aperture correction available")]
    MissingApertureCorrection(#[source] EngineFailure),

    /// The PSF catalog is missing entirely.
    #[error("no PSF catalog available")]
    MissingPsfCatalog,
}
