//! Raster element trait for generic cell values

use num_traits::{NumCast, ToPrimitive, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Flow-direction grids are read as integers and effectiveness grids as
/// floats; both go through the same reader, which casts every decoded sample
/// into `Self` and falls back to [`RasterElement::default_nodata`] when the
/// cast is not representable (NaN into an integer, for instance).
pub trait RasterElement:
    Copy + Debug + PartialOrd + NumCast + Zero + Send + Sync + 'static
{
    /// Value used for samples that cannot be represented
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Convert a decoded sample, or `default_nodata()` when the sample has
    /// no exact counterpart in `Self` (out of range, NaN or a fraction into
    /// an integer type).
    fn from_sample<S: ToPrimitive>(sample: S) -> Self;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_raster_element {
    (int: $($t:ty),*) => {
        $(
            impl RasterElement for $t {
                fn default_nodata() -> Self {
                    <$t>::MIN
                }

                fn is_nodata(&self, nodata: Option<Self>) -> bool {
                    nodata == Some(*self)
                }

                fn from_sample<S: ToPrimitive>(sample: S) -> Self {
                    match sample.to_f64() {
                        Some(v) if v.fract() != 0.0 => Self::default_nodata(),
                        _ => NumCast::from(sample).unwrap_or_else(Self::default_nodata),
                    }
                }
            }
        )*
    };
    (float: $($t:ty),*) => {
        $(
            impl RasterElement for $t {
                fn default_nodata() -> Self {
                    <$t>::NAN
                }

                fn is_nodata(&self, nodata: Option<Self>) -> bool {
                    if self.is_nan() {
                        return true;
                    }
                    match nodata {
                        Some(nd) => (self - nd).abs() <= <$t>::EPSILON * nd.abs().max(1.0),
                        None => false,
                    }
                }

                fn from_sample<S: ToPrimitive>(sample: S) -> Self {
                    NumCast::from(sample).unwrap_or_else(Self::default_nodata)
                }
            }
        )*
    };
}

impl_raster_element!(int: i8, i16, i32, i64, u8, u16, u32);
impl_raster_element!(float: f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_nodata() {
        assert!(255_u8.is_nodata(Some(255)));
        assert!(!128_u8.is_nodata(Some(255)));
        assert!(!0_i32.is_nodata(None));
    }

    #[test]
    fn test_float_nodata() {
        assert!(f64::NAN.is_nodata(None));
        assert!((-9999.0_f64).is_nodata(Some(-9999.0)));
        assert!(!(0.25_f64).is_nodata(Some(-9999.0)));
        // Large sentinels such as the ArcGIS float nodata must still match
        assert!((-3.402_823_466e38_f64).is_nodata(Some(-3.402_823_466e38)));
    }

    #[test]
    fn test_integer_samples_must_be_exact() {
        assert_eq!(i32::from_sample(64.0_f64), 64);
        assert_eq!(i32::from_sample(128_u8), 128);
        assert_eq!(i32::from_sample(1.7_f64), i32::MIN);
        assert_eq!(i32::from_sample(-0.5_f32), i32::MIN);
        assert_eq!(i32::from_sample(f64::NAN), i32::MIN);
        assert_eq!(u8::from_sample(300_i32), u8::MIN);
    }

    #[test]
    fn test_float_samples_keep_fractions() {
        assert_eq!(f64::from_sample(1.7_f64), 1.7);
        assert_eq!(f32::from_sample(0.25_f64), 0.25);
        assert!(f64::from_sample(f32::NAN).is_nan());
    }
}
