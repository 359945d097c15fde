//! Linear astrometric solution.
//!
//! A reference-pixel plus CD-matrix mapping from pixel to world
//! coordinates, the linear core of a FITS WCS. Adequate over a single
//! chip; full distortion solutions live behind the same
//! [`AstrometricSolver`] trait.

use nalgebra::{Matrix2, Vector2};

use super::AstrometricSolver;

/// Linear pixel-to-world solution: `world = crval + cd * (pixel - crpix)`.
#[derive(Debug, Clone)]
pub struct LinearWcs {
    /// World coordinates (ra, dec) at the reference pixel, in degrees.
    pub crval: Vector2<f64>,
    /// Reference pixel (x, y).
    pub crpix: Vector2<f64>,
    /// Transformation matrix in degrees per pixel.
    pub cd: Matrix2<f64>,
}

impl LinearWcs {
    /// Build a solution from explicit components.
    pub fn new(crval: Vector2<f64>, crpix: Vector2<f64>, cd: Matrix2<f64>) -> Self {
        Self { crval, crpix, cd }
    }

    /// Axis-aligned solution centered on (`ra`, `dec`) degrees at pixel
    /// (`x0`, `y0`), with the given pixel scale in arcseconds per pixel.
    ///
    /// The RA axis is stretched by `1 / cos(dec)` so pixel steps stay
    /// isotropic on the sky.
    pub fn tangent(ra: f64, dec: f64, x0: f64, y0: f64, pixel_scale: f64) -> Self {
        let scale = pixel_scale / 3600.0;
        let cd = Matrix2::new(scale / dec.to_radians().cos(), 0.0, 0.0, scale);
        Self::new(Vector2::new(ra, dec), Vector2::new(x0, y0), cd)
    }
}

impl AstrometricSolver for LinearWcs {
    fn pixel_to_world(&self, x: f64, y: f64) -> (f64, f64) {
        let offset = Vector2::new(x, y) - self.crpix;
        let world = self.crval + self.cd * offset;
        (world.x, world.y)
    }
}
