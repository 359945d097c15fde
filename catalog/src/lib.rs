//! Source catalog data model for multi-pass exposure reduction.
//!
//! This crate holds the pure data types and algorithms shared by the
//! reduction pipeline: per-pass detection records, the combined catalog
//! that accumulates detections across passes with duplicate resolution,
//! PSF-fit catalogs, and the reconciled output rows. All types are plain
//! values with no I/O; the pipeline crate owns the engines and the chip
//! loop.
//!
//! # Catalog Lifecycle
//!
//! 1. A detection pass produces a [`PassCatalog`]
//! 2. [`CombinedCatalog::accumulate`] folds it in, marking re-detected
//!    sources from the previous pass as [`DetectionStatus::Superseded`]
//! 3. PSF fitting produces a [`PsfCatalog`] keyed by the same identifiers
//! 4. Reconciliation merges both into [`ReconciledRecord`] rows

pub mod combined;
pub mod detection;
pub mod matching;
pub mod pass;
pub mod psf;
pub mod reconciled;
pub mod stats;

pub use combined::CombinedCatalog;
pub use detection::{Detection, DetectionStatus, SourceId};
pub use matching::positions_match;
pub use pass::PassCatalog;
pub use psf::{PsfCatalog, PsfKeying, PsfSource};
pub use reconciled::ReconciledRecord;
pub use stats::{median, SnrSummary, StatsError};
