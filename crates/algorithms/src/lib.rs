//! # BMP Trace Algorithms
//!
//! Flow tracing over D8 flow direction grids.
//!
//! ## Modules
//!
//! - **hydrology**: D8 codes, grid alignment, BMP flow trace accumulation
//! - **strategy**: sequential / parallel execution of per-cell work
//! - **cancel**: cooperative cancellation and deadlines

pub mod cancel;
pub mod hydrology;
pub mod strategy;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::hydrology::{
        bmp_trace, flow_path, load_grids, trace, validate_alignment, BmpTrace, Placement,
        StepBudget, TraceOutcome, TraceParams,
    };
    pub use crate::strategy::ProcessingMode;
    pub use bmptrace_core::prelude::*;
}
