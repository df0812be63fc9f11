//! Error types for BMP runoff tracing

use std::fmt;
use thiserror::Error;

/// Grid attribute that two rasters must share to be co-registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignmentAttribute {
    /// X coordinate of the lower-left corner
    XOrigin,
    /// Y coordinate of the lower-left corner
    YOrigin,
    /// Uniform cell size
    CellSize,
    /// Number of rows
    Height,
    /// Number of columns
    Width,
}

impl AlignmentAttribute {
    /// Stable tag used in messages and logs
    pub fn tag(&self) -> &'static str {
        match self {
            AlignmentAttribute::XOrigin => "x-origin",
            AlignmentAttribute::YOrigin => "y-origin",
            AlignmentAttribute::CellSize => "cell-size",
            AlignmentAttribute::Height => "height",
            AlignmentAttribute::Width => "width",
        }
    }
}

impl fmt::Display for AlignmentAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Main error type for BMP tracing operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Grids are not co-registered: {attribute} differs (expected {expected}, got {actual})")]
    Alignment {
        attribute: AlignmentAttribute,
        expected: f64,
        actual: f64,
    },

    #[error(
        "Unrecognized flow direction code {code} at ({row}, {col}) reached from start cell ({start_row}, {start_col})"
    )]
    UnrecognizedDirectionCode {
        row: usize,
        col: usize,
        code: i32,
        start_row: usize,
        start_col: usize,
    },

    #[error("Trace from ({start_row}, {start_col}) did not leave the grid within {steps} steps")]
    TraceDivergence {
        start_row: usize,
        start_col: usize,
        steps: usize,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The mismatched attribute, if this is an alignment failure
    pub fn alignment_attribute(&self) -> Option<AlignmentAttribute> {
        match self {
            Error::Alignment { attribute, .. } => Some(*attribute),
            _ => None,
        }
    }
}

/// Result type alias for BMP tracing operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_message_names_attribute() {
        let err = Error::Alignment {
            attribute: AlignmentAttribute::CellSize,
            expected: 10.0,
            actual: 30.0,
        };
        assert_eq!(err.alignment_attribute(), Some(AlignmentAttribute::CellSize));
        assert!(err.to_string().contains("cell-size"), "got: {}", err);
    }

    #[test]
    fn test_non_alignment_has_no_attribute() {
        assert_eq!(Error::Cancelled.alignment_attribute(), None);
    }
}
