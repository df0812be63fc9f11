//! Reading and writing grids

mod native;
mod source;

pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer,
    GeoTiffOptions,
};
pub use source::{GridSource, InlineGrid};
