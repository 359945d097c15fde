//! Accumulation of detection passes into one combined catalog.

use serde::{Deserialize, Serialize};

use crate::detection::{Detection, DetectionStatus, SourceId};
use crate::matching::matching_indices;
use crate::pass::PassCatalog;

/// Union of all detection passes processed so far for one chip.
///
/// Grows monotonically: rows are appended by [`accumulate`] and never
/// deleted, only reclassified from `Unique`/`Confirmed` to `Superseded`
/// when a later pass re-detects the same source. Accumulation is
/// value-to-value: it returns a new catalog and leaves both inputs
/// untouched, so a pass sequence can be replayed and yields identical
/// results each time.
///
/// Identifiers are assigned here: incoming rows are re-keyed with a running
/// counter so ids stay unique across passes, which is what lets the PSF-fit
/// catalog share them.
///
/// [`accumulate`]: CombinedCatalog::accumulate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombinedCatalog {
    detections: Vec<Detection>,
    passes: u32,
    next_id: SourceId,
}

impl CombinedCatalog {
    /// An empty catalog, before any pass has run.
    pub fn new() -> Self {
        Self {
            detections: Vec::new(),
            passes: 0,
            next_id: 1,
        }
    }

    /// Fold one pass's catalog into this one, returning the new combined
    /// catalog.
    ///
    /// Every incoming detection is tagged with the pass index, re-keyed
    /// with a fresh identifier, and initialized to `Unique`. For the first
    /// pass that is all; for later passes each incoming detection is
    /// matched against the immediately-preceding pass's rows within
    /// `tolerance` pixels. Every matched prior becomes `Superseded` and the
    /// incoming copy `Confirmed`; many-to-one collapses are accepted.
    pub fn accumulate(&self, pass: &PassCatalog, tolerance: f64) -> CombinedCatalog {
        let mut detections = self.detections.clone();
        let mut next_id = self.next_id;

        let prev_pass = self.passes;
        let prev_range = {
            let start = detections.partition_point(|d| d.pass < prev_pass);
            start..detections.len()
        };

        let mut incoming: Vec<Detection> = Vec::with_capacity(pass.len());
        let mut confirmed = 0usize;
        let mut superseded = 0usize;
        for raw in &pass.detections {
            let mut det = raw.clone();
            det.id = next_id;
            next_id += 1;
            det.pass = pass.pass;
            det.status = DetectionStatus::Unique;

            if prev_pass > 0 {
                let priors = &detections[prev_range.clone()];
                let matches = matching_indices(priors, &det, tolerance);
                if !matches.is_empty() {
                    det.status = DetectionStatus::Confirmed;
                    confirmed += 1;
                    for idx in matches {
                        let prior = &mut detections[prev_range.start + idx];
                        if prior.status != DetectionStatus::Superseded {
                            superseded += 1;
                        }
                        prior.status = DetectionStatus::Superseded;
                    }
                }
            }
            incoming.push(det);
        }

        log::debug!(
            "pass {}: {} detections ({} confirmed re-detections, {} prior rows superseded)",
            pass.pass,
            incoming.len(),
            confirmed,
            superseded
        );

        detections.extend(incoming);
        CombinedCatalog {
            detections,
            passes: pass.pass,
            next_id,
        }
    }

    /// All rows, in accumulation order.
    pub fn rows(&self) -> &[Detection] {
        &self.detections
    }

    /// Rows still participating in downstream computations.
    pub fn active(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(|d| d.is_active())
    }

    /// Rows belonging to one pass, regardless of status.
    pub fn of_pass(&self, pass: u32) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(move |d| d.pass == pass)
    }

    /// Total number of rows, superseded included.
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Whether no pass has contributed any row yet.
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Index of the most recent accumulated pass, 0 before the first.
    pub fn passes(&self) -> u32 {
        self.passes
    }
}
