//! Grid loading and co-registration checks
//!
//! A flow direction grid and an effectiveness grid can only be traced
//! together when they cover the same cells: same lower-left corner, cell
//! size, and dimensions.

use bmptrace_core::io::GridSource;
use bmptrace_core::raster::{Raster, RasterElement};
use bmptrace_core::{AlignmentAttribute, Error, Result};
use tracing::debug;

/// Relative tolerance for coordinate and cell size comparisons, as a
/// fraction of the cell size.
pub const ALIGNMENT_TOLERANCE: f64 = 1e-9;

/// Placement shared by a validated pair of grids
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Lower-left corner (min_x, min_y)
    pub lower_left: (f64, f64),
    pub cell_size: f64,
    pub rows: usize,
    pub cols: usize,
}

impl Placement {
    /// Placement of a single raster
    pub fn of<T: RasterElement>(raster: &Raster<T>) -> Self {
        Self {
            lower_left: raster.lower_left(),
            cell_size: raster.cell_size(),
            rows: raster.rows(),
            cols: raster.cols(),
        }
    }
}

/// Check that `other` is co-registered with `reference`.
///
/// Checks run in a fixed order (x-origin, y-origin, cell size, height,
/// width) and the first mismatch is returned as [`Error::Alignment`].
pub fn validate_alignment<A, B>(reference: &Raster<A>, other: &Raster<B>) -> Result<Placement>
where
    A: RasterElement,
    B: RasterElement,
{
    let expected = Placement::of(reference);
    let actual = Placement::of(other);
    let tolerance = ALIGNMENT_TOLERANCE * expected.cell_size.abs().max(f64::MIN_POSITIVE);

    let checks = [
        (AlignmentAttribute::XOrigin, expected.lower_left.0, actual.lower_left.0),
        (AlignmentAttribute::YOrigin, expected.lower_left.1, actual.lower_left.1),
        (AlignmentAttribute::CellSize, expected.cell_size, actual.cell_size),
    ];
    for (attribute, e, a) in checks {
        if !((e - a).abs() <= tolerance) {
            return Err(Error::Alignment {
                attribute,
                expected: e,
                actual: a,
            });
        }
    }

    let dims = [
        (AlignmentAttribute::Height, expected.rows, actual.rows),
        (AlignmentAttribute::Width, expected.cols, actual.cols),
    ];
    for (attribute, e, a) in dims {
        if e != a {
            return Err(Error::Alignment {
                attribute,
                expected: e as f64,
                actual: a as f64,
            });
        }
    }

    Ok(expected)
}

/// Read a flow direction grid and an effectiveness grid and verify that they
/// are co-registered.
pub fn load_grids(
    flow_direction: &GridSource,
    effectiveness: &GridSource,
) -> Result<(Raster<i32>, Raster<f64>, Placement)> {
    let flow_dir: Raster<i32> = flow_direction.load()?;
    debug!(
        "Flow direction {}: {} x {}",
        flow_direction,
        flow_dir.cols(),
        flow_dir.rows()
    );

    let bmp: Raster<f64> = effectiveness.load()?;
    debug!("Effectiveness {}: {} x {}", effectiveness, bmp.cols(), bmp.rows());

    let placement = validate_alignment(&flow_dir, &bmp)?;
    Ok((flow_dir, bmp, placement))
}
