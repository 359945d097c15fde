//! Spatial matching of detections across passes.
//!
//! A pair of detections is considered the same physical source when their
//! centroids fall within a fixed pixel tolerance. The check is a cheap
//! axis-aligned bounding-box pre-filter followed by an exact Euclidean
//! radius test. Both checks are inclusive, so a pair at exactly the
//! tolerance distance matches.

use crate::detection::Detection;

/// Whether two positions match within `tolerance` pixels.
///
/// Inclusive on the boundary: a separation of exactly `tolerance` matches.
pub fn positions_match(ax: f64, ay: f64, bx: f64, by: f64, tolerance: f64) -> bool {
    let dx = ax - bx;
    let dy = ay - by;
    // Bounding-box pre-filter avoids the sqrt for distant pairs.
    if dx.abs() > tolerance || dy.abs() > tolerance {
        return false;
    }
    (dx * dx + dy * dy).sqrt() <= tolerance
}

/// Indices of `priors` whose centroid matches `candidate` within `tolerance`.
///
/// All matches are returned; the accumulator collapses many-to-one matches
/// by superseding every matched prior.
pub fn matching_indices(priors: &[Detection], candidate: &Detection, tolerance: f64) -> Vec<usize> {
    priors
        .iter()
        .enumerate()
        .filter(|(_, p)| positions_match(p.x, p.y, candidate.x, candidate.y, tolerance))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectionStatus;

    fn det_at(x: f64, y: f64) -> Detection {
        Detection {
            id: 0,
            x,
            y,
            mag: 18.0,
            mag_err: 0.1,
            pass: 1,
            status: DetectionStatus::Unique,
        }
    }

    #[test]
    fn test_exact_tolerance_boundary_matches() {
        // Separation of exactly 2.0 pixels along one axis.
        assert!(positions_match(10.0, 10.0, 12.0, 10.0, 2.0));
        // Diagonal separation of exactly 2.0 pixels.
        let d = 2.0 / std::f64::consts::SQRT_2;
        assert!(positions_match(0.0, 0.0, d, d, 2.0));
    }

    #[test]
    fn test_just_beyond_tolerance_does_not_match() {
        assert!(!positions_match(10.0, 10.0, 12.0 + 1e-9, 10.0, 2.0));
        // Inside the bounding box but outside the radius.
        assert!(!positions_match(0.0, 0.0, 1.9, 1.9, 2.0));
    }

    #[test]
    fn test_matching_indices_returns_all_within_tolerance() {
        let priors = vec![det_at(10.0, 10.0), det_at(11.0, 10.5), det_at(30.0, 30.0)];
        let candidate = det_at(10.5, 10.2);
        assert_eq!(matching_indices(&priors, &candidate, 2.0), vec![0, 1]);
    }

    #[test]
    fn test_matching_indices_empty_when_isolated() {
        let priors = vec![det_at(10.0, 10.0)];
        let candidate = det_at(100.0, 100.0);
        assert!(matching_indices(&priors, &candidate, 2.0).is_empty());
    }
}
