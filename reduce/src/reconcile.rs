//! Reconciliation of the shape-based and PSF-fit catalogs into the final
//! calibrated table.

use std::collections::HashMap;

use catalog::{
    positions_match, CombinedCatalog, PsfCatalog, PsfKeying, PsfSource, ReconciledRecord, SourceId,
};

use crate::chip::ChipContext;
use crate::engines::AstrometricSolver;
use crate::error::ReconcileError;

/// Merge the combined shape-based catalog and the PSF-fit catalog into the
/// final record set.
///
/// The scalar aperture `correction` is subtracted from every PSF magnitude
/// before merging. Join strategy follows the PSF catalog's keying: shared
/// identifiers when the fit was seeded from the shape catalog, otherwise a
/// nearest-neighbor join within the cross-pass matching tolerance where
/// each PSF source is consumed at most once. Records missing PSF data keep
/// sentinel values unless `both_required` applies (PSF catalog smaller than
/// the active shape catalog), in which case they are dropped. World
/// coordinates are attached to every surviving record, from the PSF
/// position when present and the shape centroid otherwise.
pub fn reconcile<A: AstrometricSolver>(
    ctx: &ChipContext,
    combined: &CombinedCatalog,
    psf: Option<&PsfCatalog>,
    correction: Option<f64>,
    solver: &A,
) -> Result<Vec<ReconciledRecord>, ReconcileError> {
    let psf = psf.ok_or(ReconcileError::MissingPsfCatalog)?;
    let correction = correction.ok_or_else(|| {
        ReconcileError::MissingApertureCorrection(crate::engines::EngineFailure(
            "no correction estimated for chip".to_string(),
        ))
    })?;

    let shape: Vec<_> = combined.active().collect();
    let psf_for = assign_psf_sources(&shape, psf, ctx.config.match_tolerance);

    let mut records = Vec::with_capacity(shape.len());
    for det in &shape {
        let mut record = ReconciledRecord::from_detection(det);
        if let Some(source) = psf_for.get(&det.id) {
            if psf.keying == PsfKeying::Independent {
                record.psf_id = source.id as i64;
            }
            record.x_psf = source.x;
            record.y_psf = source.y;
            record.mag_psf = source.mag - correction;
            record.mag_err_psf = source.mag_err;
            record.sky = source.sky;
            record.niter = source.niter as f64;
            record.chi = source.chi;
            record.sharp = source.sharp;
        }
        records.push(record);
    }

    // Keep only sources confirmed by both methods when the PSF catalog
    // could not cover the shape catalog.
    if ctx.config.both_required && psf.len() < shape.len() {
        records.retain(|r| r.has_psf());
    }

    for record in &mut records {
        let (x, y) = if record.has_psf() {
            (record.x_psf, record.y_psf)
        } else {
            (record.x, record.y)
        };
        let (ra, dec) = solver.pixel_to_world(x, y);
        record.ra = ra;
        record.dec = dec;
    }

    log::info!(
        "[{}] reconciled {} records ({} with PSF fits, correction {:.3} mag)",
        ctx.id,
        records.len(),
        records.iter().filter(|r| r.has_psf()).count(),
        correction
    );

    Ok(records)
}

/// Resolve which PSF source belongs to each active shape detection.
fn assign_psf_sources<'a>(
    shape: &[&catalog::Detection],
    psf: &'a PsfCatalog,
    tolerance: f64,
) -> HashMap<SourceId, &'a PsfSource> {
    match psf.keying {
        PsfKeying::SharedIds => {
            let by_id: HashMap<SourceId, &PsfSource> =
                psf.sources.iter().map(|s| (s.id, s)).collect();
            shape
                .iter()
                .filter_map(|d| by_id.get(&d.id).map(|s| (d.id, *s)))
                .collect()
        }
        PsfKeying::Independent => nearest_neighbor_join(shape, psf, tolerance),
    }
}

/// Nearest-neighbor join for PSF catalogs with independent positions.
///
/// Detections are visited in catalog order; each takes the closest PSF
/// source within `tolerance` that has not been consumed yet, ties broken
/// by lower PSF index. Mirrors the cross-pass matching rule, with the
/// one-to-one restriction the final table needs.
fn nearest_neighbor_join<'a>(
    shape: &[&catalog::Detection],
    psf: &'a PsfCatalog,
    tolerance: f64,
) -> HashMap<SourceId, &'a PsfSource> {
    let mut consumed = vec![false; psf.sources.len()];
    let mut assigned = HashMap::new();

    for det in shape {
        let mut best: Option<(usize, f64)> = None;
        for (i, source) in psf.sources.iter().enumerate() {
            if consumed[i] || !positions_match(source.x, source.y, det.x, det.y, tolerance) {
                continue;
            }
            let dx = source.x - det.x;
            let dy = source.y - det.y;
            let dist = (dx * dx + dy * dy).sqrt();
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((i, dist));
            }
        }
        if let Some((i, _)) = best {
            consumed[i] = true;
            assigned.insert(det.id, &psf.sources[i]);
        }
    }

    assigned
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{Detection, DetectionStatus, PassCatalog};

    use crate::chip::{ChipContext, ChipId, ChipMeta};
    use crate::config::ReductionConfig;
    use crate::engines::wcs::LinearWcs;

    fn det(x: f64, y: f64) -> Detection {
        Detection {
            id: 0,
            x,
            y,
            mag: 18.0,
            mag_err: 0.05,
            pass: 1,
            status: DetectionStatus::Unique,
        }
    }

    fn psf_source(id: SourceId, x: f64, y: f64, mag: f64) -> PsfSource {
        PsfSource {
            id,
            x,
            y,
            mag,
            mag_err: 0.03,
            sky: 120.0,
            niter: 4,
            chi: 1.1,
            sharp: 0.3,
        }
    }

    fn context(both_required: bool) -> ChipContext {
        let config = ReductionConfig {
            both_required,
            ..ReductionConfig::default()
        };
        ChipContext::new(ChipId::new("testexp", 1), ChipMeta::default(), config)
    }

    fn solver() -> LinearWcs {
        LinearWcs::tangent(180.0, 0.0, 1024.0, 1024.0, 0.27)
    }

    fn combined(dets: Vec<Detection>) -> CombinedCatalog {
        CombinedCatalog::new().accumulate(&PassCatalog::new(1, 1.7, dets), 2.0)
    }

    #[test]
    fn test_correction_subtracted_from_psf_magnitude() {
        let combined = combined(vec![det(100.0, 100.0)]);
        let psf = PsfCatalog::from_sources(PsfKeying::SharedIds, vec![psf_source(1, 100.1, 100.0, 18.0)]);

        let records = reconcile(
            &context(false),
            &combined,
            Some(&psf),
            Some(0.15),
            &solver(),
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].mag_psf - 17.85).abs() < 1e-12);
    }

    #[test]
    fn test_completeness_without_both_required() {
        // Three active shape detections, only one PSF fit.
        let combined = combined(vec![det(10.0, 10.0), det(50.0, 50.0), det(90.0, 90.0)]);
        let psf = PsfCatalog::from_sources(PsfKeying::SharedIds, vec![psf_source(2, 50.0, 50.0, 17.0)]);

        let records = reconcile(
            &context(false),
            &combined,
            Some(&psf),
            Some(0.1),
            &solver(),
        )
        .unwrap();

        // Every active detection appears exactly once.
        assert_eq!(records.len(), 3);
        let with_psf: Vec<_> = records.iter().filter(|r| r.has_psf()).collect();
        assert_eq!(with_psf.len(), 1);
        assert_eq!(with_psf[0].id, 2);
        // Sentinels on the unmatched rows, world coordinates everywhere.
        for r in &records {
            if !r.has_psf() {
                assert!(r.x_psf.is_nan());
                assert!(r.sharp.is_nan());
                assert_eq!(r.psf_id, -1);
            }
            assert!(r.ra.is_finite());
            assert!(r.dec.is_finite());
        }
    }

    #[test]
    fn test_both_required_drops_unmatched_records() {
        let combined = combined(vec![det(10.0, 10.0), det(50.0, 50.0), det(90.0, 90.0)]);
        let psf = PsfCatalog::from_sources(PsfKeying::SharedIds, vec![psf_source(2, 50.0, 50.0, 17.0)]);

        let records = reconcile(
            &context(true),
            &combined,
            Some(&psf),
            Some(0.1),
            &solver(),
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 2);
    }

    #[test]
    fn test_independent_keying_joins_by_nearest_coordinate() {
        let combined = combined(vec![det(10.0, 10.0), det(14.0, 10.0)]);
        let psf = PsfCatalog::from_sources(
            PsfKeying::Independent,
            vec![
                psf_source(901, 14.3, 10.1, 16.5),
                psf_source(902, 10.4, 9.8, 17.5),
            ],
        );

        let records = reconcile(
            &context(false),
            &combined,
            Some(&psf),
            Some(0.0),
            &solver(),
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        // First detection takes the closer source 902, second takes 901.
        assert_eq!(records[0].psf_id, 902);
        assert_eq!(records[1].psf_id, 901);
    }

    #[test]
    fn test_independent_source_consumed_at_most_once() {
        // Two detections within tolerance of a single PSF source.
        let combined = combined(vec![det(10.0, 10.0), det(11.0, 10.0)]);
        let psf = PsfCatalog::from_sources(PsfKeying::Independent, vec![psf_source(901, 10.2, 10.0, 16.5)]);

        let records = reconcile(
            &context(false),
            &combined,
            Some(&psf),
            Some(0.0),
            &solver(),
        )
        .unwrap();
        assert_eq!(records.iter().filter(|r| r.has_psf()).count(), 1);
        assert_eq!(records[0].psf_id, 901);
        assert!(!records[1].has_psf());
    }

    #[test]
    fn test_missing_psf_catalog_is_fatal() {
        let combined = combined(vec![det(10.0, 10.0)]);
        let result = reconcile(&context(false), &combined, None, Some(0.1), &solver());
        assert!(matches!(result, Err(ReconcileError::MissingPsfCatalog)));
    }

    #[test]
    fn test_missing_correction_is_fatal() {
        let combined = combined(vec![det(10.0, 10.0)]);
        let psf = PsfCatalog::new(PsfKeying::SharedIds);
        let result = reconcile(&context(false), &combined, Some(&psf), None, &solver());
        assert!(matches!(
            result,
            Err(ReconcileError::MissingApertureCorrection(_))
        ));
    }
}
