//! Affine georeferencing for north-up rasters

use serde::{Deserialize, Serialize};

/// North-up placement of a grid on the map.
///
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `origin_*` is the upper-left corner of cell `(0, 0)` and `pixel_height`
/// is negative, so row indices grow southward. Grids in this crate never
/// carry rotation terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Cell size in X
    pub pixel_width: f64,
    /// Cell size in Y (negative for north-up)
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a transform from its upper-left corner
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Create a north-up transform with square cells from the lower-left
    /// corner of a grid with `rows` rows.
    pub fn from_lower_left(x: f64, y: f64, cell_size: f64, rows: usize) -> Self {
        Self::new(x, y + rows as f64 * cell_size, cell_size, -cell_size)
    }

    /// Lower-left corner `(min_x, min_y)` of a grid with `rows` rows
    pub fn lower_left(&self, rows: usize) -> (f64, f64) {
        let (min_x, min_y, _, _) = self.bounds(0, rows);
        (min_x, min_y)
    }

    /// Cell size (square cells)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)` of a `cols × rows` grid
    pub fn bounds(&self, cols: usize, rows: usize) -> (f64, f64, f64, f64) {
        let x0 = self.origin_x;
        let x1 = self.origin_x + cols as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + rows as f64 * self.pixel_height;

        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(100, 100);

        assert_relative_eq!(min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(max_y, 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_lower_left_roundtrip() {
        let gt = GeoTransform::from_lower_left(500_000.0, 4_100_000.0, 30.0, 20);
        assert_relative_eq!(gt.origin_y, 4_100_600.0, epsilon = 1e-6);
        assert_eq!(gt.pixel_height, -30.0);

        let (x, y) = gt.lower_left(20);
        assert_relative_eq!(x, 500_000.0, epsilon = 1e-6);
        assert_relative_eq!(y, 4_100_000.0, epsilon = 1e-6);
    }
}
