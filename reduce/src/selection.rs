//! PSF calibration-star selection.
//!
//! The PSF model is anchored on the brightest well-measured sources from
//! the first detection pass. Marginal detections would bias the model fit,
//! so candidates below the S/N floor are rejected before ranking.

use itertools::Itertools;

use catalog::{CombinedCatalog, Detection};

/// Select up to `count` PSF calibration stars from the combined catalog.
///
/// Candidates are active detections with finite magnitudes at or above the
/// S/N floor, ranked brightest first.
pub fn select_psf_stars(
    combined: &CombinedCatalog,
    count: usize,
    snr_floor: f64,
) -> Vec<Detection> {
    let selected: Vec<Detection> = combined
        .active()
        .filter(|d| d.mag.is_finite() && d.snr() >= snr_floor)
        .sorted_by(|a, b| a.mag.partial_cmp(&b.mag).unwrap_or(std::cmp::Ordering::Equal))
        .take(count)
        .cloned()
        .collect();

    if let (Some(brightest), Some(faintest)) = (selected.first(), selected.last()) {
        log::info!(
            "selected {} PSF calibration stars, mag {:.2} to {:.2}",
            selected.len(),
            brightest.mag,
            faintest.mag
        );
    } else {
        log::warn!("no PSF calibration candidates above S/N {snr_floor:.1}");
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{DetectionStatus, PassCatalog};

    fn det(x: f64, mag: f64, mag_err: f64) -> Detection {
        Detection {
            id: 0,
            x,
            y: 10.0,
            mag,
            mag_err,
            pass: 1,
            status: DetectionStatus::Unique,
        }
    }

    fn catalog(dets: Vec<Detection>) -> CombinedCatalog {
        CombinedCatalog::new().accumulate(&PassCatalog::new(1, 1.7, dets), 2.0)
    }

    #[test]
    fn test_selects_brightest_first() {
        let combined = catalog(vec![
            det(10.0, 19.0, 0.05),
            det(20.0, 16.0, 0.05),
            det(30.0, 17.5, 0.05),
        ]);
        let stars = select_psf_stars(&combined, 2, 5.0);
        assert_eq!(stars.len(), 2);
        assert!((stars[0].mag - 16.0).abs() < 1e-12);
        assert!((stars[1].mag - 17.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_low_snr_candidates() {
        let combined = catalog(vec![
            det(10.0, 15.0, 0.5), // bright value but S/N 2
            det(20.0, 18.0, 0.05),
        ]);
        let stars = select_psf_stars(&combined, 10, 5.0);
        assert_eq!(stars.len(), 1);
        assert!((stars[0].mag - 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_catalog_selects_nothing() {
        let combined = CombinedCatalog::new();
        assert!(select_psf_stars(&combined, 10, 5.0).is_empty());
    }
}
