//! Hydrological tracing over D8 flow direction grids
//!
//! - D8 codes: the eight power-of-two direction codes and their offsets
//! - Alignment: loading input grids and checking co-registration
//! - BMP trace: un-mitigated runoff accumulated along single flow paths

pub mod d8;
mod alignment;
mod bmp_trace;

pub use alignment::{load_grids, validate_alignment, Placement, ALIGNMENT_TOLERANCE};
pub use bmp_trace::{
    bmp_trace, flow_path, trace, BmpTrace, StepBudget, TraceOutcome, TraceParams,
    PARTIAL_GRID_BUDGET,
};
