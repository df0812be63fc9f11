//! Grid sources: GeoTIFF files or arrays given inline in a run configuration

use crate::error::{Error, Result};
use crate::io::read_geotiff;
use crate::raster::{GeoTransform, Raster, RasterElement};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where an input grid comes from.
///
/// Deserializes from either `{ path = "..." }` or an [`InlineGrid`] table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GridSource {
    /// A GeoTIFF file on disk
    GeoTiff { path: PathBuf },
    /// Values embedded in the configuration
    Inline(InlineGrid),
}

impl GridSource {
    /// Source backed by a GeoTIFF file
    pub fn geotiff(path: impl Into<PathBuf>) -> Self {
        GridSource::GeoTiff { path: path.into() }
    }

    /// Read the grid, casting cells to `T`
    pub fn load<T: RasterElement>(&self) -> Result<Raster<T>> {
        match self {
            GridSource::GeoTiff { path } => read_geotiff(path),
            GridSource::Inline(grid) => grid.to_raster(),
        }
    }
}

impl fmt::Display for GridSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridSource::GeoTiff { path } => write!(f, "{}", path.display()),
            GridSource::Inline(grid) => write!(f, "inline {}x{} grid", grid.cols, grid.rows),
        }
    }
}

/// A small grid written out in a configuration file.
///
/// `values` are row-major, starting with the northernmost row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlineGrid {
    pub rows: usize,
    pub cols: usize,
    /// Lower-left corner `[x, y]`
    pub lower_left: [f64; 2],
    pub cell_size: f64,
    pub values: Vec<f64>,
    #[serde(default)]
    pub nodata: Option<f64>,
}

impl InlineGrid {
    /// Build a raster from the inline values.
    ///
    /// Values with no exact counterpart in `T` become `T::default_nodata()`.
    pub fn to_raster<T: RasterElement>(&self) -> Result<Raster<T>> {
        if self.rows == 0 || self.cols == 0 || self.values.len() != self.rows * self.cols {
            return Err(Error::InvalidDimensions {
                width: self.cols,
                height: self.rows,
            });
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(Error::InvalidParameter {
                name: "cell_size",
                value: self.cell_size.to_string(),
                reason: "must be a positive number".into(),
            });
        }

        let data = self
            .values
            .iter()
            .map(|&v| T::from_sample(v))
            .collect();

        let mut raster = Raster::from_vec(data, self.rows, self.cols)?;
        let [x, y] = self.lower_left;
        raster.set_transform(GeoTransform::from_lower_left(x, y, self.cell_size, self.rows));
        raster.set_nodata(self.nodata.and_then(num_traits::cast));
        Ok(raster)
    }
}
