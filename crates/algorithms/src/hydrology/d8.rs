//! D8 flow direction codes
//!
//! Power-of-two encoding used by ArcGIS / TauDEM-style flow direction grids,
//! doubling clockwise from east. Row indices grow southward.
//! ```text
//!   32  64  128
//!   16   x    1
//!    8   4    2
//! ```

/// The eight recognized codes, clockwise from east
pub const D8_CODES: [i32; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

/// (row_offset, col_offset) for each entry of [`D8_CODES`]
pub const D8_OFFSETS: [(isize, isize); 8] = [
    (0, 1),   // 1: E
    (1, 1),   // 2: SE
    (1, 0),   // 4: S
    (1, -1),  // 8: SW
    (0, -1),  // 16: W
    (-1, -1), // 32: NW
    (-1, 0),  // 64: N
    (-1, 1),  // 128: NE
];

fn index(code: i32) -> Option<usize> {
    if code > 0 && code <= 128 && code.count_ones() == 1 {
        Some(code.trailing_zeros() as usize)
    } else {
        None
    }
}

/// Cell offset a code moves the cursor by, or `None` for anything that is
/// not one of the eight codes (nodata, pits, garbage).
#[inline]
pub fn offset(code: i32) -> Option<(isize, isize)> {
    index(code).map(|i| D8_OFFSETS[i])
}

/// Whether `code` is one of the eight recognized codes
pub fn is_valid(code: i32) -> bool {
    index(code).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_codes_map() {
        for (i, &code) in D8_CODES.iter().enumerate() {
            assert_eq!(offset(code), Some(D8_OFFSETS[i]), "code {}", code);
        }
        assert_eq!(offset(1), Some((0, 1)));
        assert_eq!(offset(4), Some((1, 0)));
        assert_eq!(offset(64), Some((-1, 0)));
    }

    #[test]
    fn test_invalid_codes() {
        for code in [0, -1, 3, 5, 7, 255, 256, i32::MIN, -128] {
            assert!(!is_valid(code), "{} should be invalid", code);
            assert_eq!(offset(code), None);
        }
    }

    #[test]
    fn test_offsets_are_unit_steps() {
        for &(dr, dc) in D8_OFFSETS.iter() {
            assert!(dr.abs() <= 1 && dc.abs() <= 1);
            assert!((dr, dc) != (0, 0));
        }
    }
}
