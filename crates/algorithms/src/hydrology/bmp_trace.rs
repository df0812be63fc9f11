//! BMP flow trace accumulation
//!
//! Every interior cell starts one trace that follows the D8 flow direction
//! codes downslope until it leaves the grid. Each cell a trace passes
//! through receives the un-mitigated share of runoff, `1 - effectiveness`,
//! where effectiveness comes from a co-registered BMP grid. Contributions
//! from all traces add up, so a cell's value is the mitigated-weighted count
//! of start cells that drain through it.
//!
//! Bounds follow the legacy tool: the cursor is inside while
//! `0 < row < rows` and `0 < col < cols`, so the first row and column act as
//! an outlet but the last row and column are still accumulated.
//!
//! Each worker accumulates into its own `rows × cols` grid of `f64`, so the
//! worker count is capped to keep those grids within
//! [`PARTIAL_GRID_BUDGET`] bytes; very large grids trace on fewer threads.

use ndarray::{Array2, ArrayView2};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use bmptrace_core::raster::Raster;
use bmptrace_core::{Algorithm, Error, ParallelAlgorithm, Result};

use crate::cancel::CancelToken;
use crate::hydrology::alignment::validate_alignment;
use crate::hydrology::d8;
use crate::strategy::ProcessingMode;

/// Bytes all per-worker partial grids may occupy together
pub const PARTIAL_GRID_BUDGET: usize = 1 << 30;

/// Maximum number of cells a single trace may visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepBudget {
    /// `rows * cols`: a longer trace must revisit a cell, so only real flow
    /// cycles are flagged
    #[default]
    Cells,
    /// `k * (rows + cols)`
    PerimeterMultiple(usize),
    /// A fixed number of steps
    Fixed(usize),
}

impl StepBudget {
    /// Budget in steps for a `rows × cols` grid
    pub fn max_steps(&self, rows: usize, cols: usize) -> usize {
        match *self {
            StepBudget::Cells => rows.saturating_mul(cols),
            StepBudget::PerimeterMultiple(k) => k.saturating_mul(rows + cols),
            StepBudget::Fixed(n) => n,
        }
    }
}

/// Parameters for BMP flow tracing
#[derive(Debug, Clone, Default)]
pub struct TraceParams {
    /// Sequential or parallel execution
    pub mode: ProcessingMode,
    /// Steps after which a trace is declared divergent
    pub step_budget: StepBudget,
    /// Fail the whole run on the first divergent trace instead of
    /// discarding that trace and continuing
    pub abort_on_divergence: bool,
    /// Cancellation / deadline hook, checked before every trace
    pub cancel: CancelToken,
}

/// Result of a tracing run
#[derive(Debug, Clone)]
pub struct TraceOutcome {
    /// Accumulated un-mitigated runoff, same placement as the inputs
    pub output: Raster<f64>,
    /// Number of traces that left the grid
    pub traces: usize,
    /// Cells visited by those traces
    pub steps: u64,
    /// Start cells whose trace exceeded the step budget, in row-major order
    pub diverged: Vec<(usize, usize)>,
}

/// BMP flow trace algorithm
#[derive(Debug, Clone, Default)]
pub struct BmpTrace;

impl Algorithm for BmpTrace {
    type Input = (Raster<i32>, Raster<f64>);
    type Output = TraceOutcome;
    type Params = TraceParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "BMP Flow Trace"
    }

    fn description(&self) -> &'static str {
        "Accumulate un-mitigated runoff along D8 flow paths"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (flow_dir, effectiveness) = input;
        bmp_trace(&flow_dir, &effectiveness, params)
    }
}

impl ParallelAlgorithm for BmpTrace {
    fn execute_parallel(&self, input: Self::Input, mut params: Self::Params) -> Result<Self::Output> {
        if params.mode == ProcessingMode::Sequential {
            params.mode = ProcessingMode::Parallel;
        }
        self.execute(input, params)
    }
}

/// Trace with default parameters and return only the output grid.
pub fn trace(flow_dir: &Raster<i32>, effectiveness: &Raster<f64>) -> Result<Raster<f64>> {
    bmp_trace(flow_dir, effectiveness, TraceParams::default()).map(|outcome| outcome.output)
}

/// Accumulate un-mitigated runoff along every interior cell's flow path.
///
/// # Arguments
/// * `flow_dir` - D8 flow direction codes (1, 2, 4, ..., 128)
/// * `effectiveness` - BMP effectiveness, co-registered with `flow_dir`.
///   Values are clamped to `[0, 1]`; NaN and no-data count as `0`.
/// * `params` - Execution mode, step budget and cancellation
///
/// # Errors
/// - [`Error::Alignment`] if the grids are not co-registered
/// - [`Error::UnrecognizedDirectionCode`] as soon as any trace reaches a
///   cell that holds none of the eight codes
/// - [`Error::TraceDivergence`] with `abort_on_divergence`
/// - [`Error::Cancelled`] when the cancel token trips
pub fn bmp_trace(
    flow_dir: &Raster<i32>,
    effectiveness: &Raster<f64>,
    params: TraceParams,
) -> Result<TraceOutcome> {
    validate_alignment(flow_dir, effectiveness)?;

    let (rows, cols) = flow_dir.shape();
    let max_steps = params.step_budget.max_steps(rows, cols);
    if max_steps == 0 && rows > 2 && cols > 2 {
        return Err(Error::InvalidParameter {
            name: "step_budget",
            value: format!("{:?}", params.step_budget),
            reason: "allows no steps".into(),
        });
    }

    let contribution = contribution_grid(effectiveness);
    let interior_rows = rows.saturating_sub(2);
    let requested = params.mode.workers();
    let workers = requested
        .min(interior_rows)
        .min(max_workers(rows, cols))
        .max(1);
    if workers < requested.min(interior_rows) {
        debug!(
            "Capping workers at {} to keep partial grids within {} bytes",
            workers, PARTIAL_GRID_BUDGET
        );
    }
    debug!(
        "Tracing {} start cells on {} worker(s), budget {} steps",
        interior_rows * cols.saturating_sub(2),
        workers,
        max_steps
    );

    let halt = AtomicBool::new(false);
    let job = TraceJob {
        flow_dir: flow_dir.view(),
        contribution: contribution.view(),
        max_steps,
        workers,
        params: &params,
        halt: &halt,
    };

    let partials = params.mode.run_workers(workers, |worker| job.run(worker))?;

    let mut total = Partial::new(rows, cols);
    for partial in partials {
        total.merge(partial?);
    }
    total.diverged.sort_unstable();

    let mut output = flow_dir.with_same_meta::<f64>(rows, cols);
    *output.data_mut() = total.acc;

    Ok(TraceOutcome {
        output,
        traces: total.traces,
        steps: total.steps,
        diverged: total.diverged,
    })
}

/// Cells visited by the trace started at `start`, in visiting order.
///
/// The path is empty when `start` is already outside the traced region.
pub fn flow_path(
    flow_dir: &Raster<i32>,
    start: (usize, usize),
    budget: StepBudget,
) -> Result<Vec<(usize, usize)>> {
    let (rows, cols) = flow_dir.shape();
    let mut path = Vec::new();
    walk(flow_dir.view(), start, budget.max_steps(rows, cols), &mut path)?;
    Ok(path)
}

/// Most workers whose partial grids fit in [`PARTIAL_GRID_BUDGET`]
fn max_workers(rows: usize, cols: usize) -> usize {
    let grid_bytes = rows
        .saturating_mul(cols)
        .saturating_mul(std::mem::size_of::<f64>());
    (PARTIAL_GRID_BUDGET / grid_bytes.max(1)).max(1)
}

/// Per-cell contribution `1 - clamp(effectiveness, 0, 1)`
fn contribution_grid(effectiveness: &Raster<f64>) -> Array2<f64> {
    effectiveness.data().mapv(|e| {
        if effectiveness.is_nodata(e) {
            1.0
        } else {
            1.0 - e.clamp(0.0, 1.0)
        }
    })
}

/// Follow flow codes from `start`, recording every in-bounds cell in `path`.
fn walk(
    flow_dir: ArrayView2<'_, i32>,
    start: (usize, usize),
    max_steps: usize,
    path: &mut Vec<(usize, usize)>,
) -> Result<()> {
    let (rows, cols) = flow_dir.dim();
    let (start_row, start_col) = start;
    let (mut row, mut col) = (start_row as isize, start_col as isize);
    path.clear();

    while row > 0 && col > 0 && (row as usize) < rows && (col as usize) < cols {
        if path.len() >= max_steps {
            return Err(Error::TraceDivergence {
                start_row,
                start_col,
                steps: path.len(),
            });
        }

        let (r, c) = (row as usize, col as usize);
        path.push((r, c));

        let code = flow_dir[(r, c)];
        let (dr, dc) = d8::offset(code).ok_or_else(|| Error::UnrecognizedDirectionCode {
            row: r,
            col: c,
            code,
            start_row,
            start_col,
        })?;

        row += dr;
        col += dc;
    }

    Ok(())
}

/// Accumulator owned by one worker
struct Partial {
    acc: Array2<f64>,
    traces: usize,
    steps: u64,
    diverged: Vec<(usize, usize)>,
}

impl Partial {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            acc: Array2::zeros((rows, cols)),
            traces: 0,
            steps: 0,
            diverged: Vec::new(),
        }
    }

    fn merge(&mut self, other: Partial) {
        self.acc += &other.acc;
        self.traces += other.traces;
        self.steps += other.steps;
        self.diverged.extend(other.diverged);
    }
}

/// Shared read-only inputs of one run
struct TraceJob<'a> {
    flow_dir: ArrayView2<'a, i32>,
    contribution: ArrayView2<'a, f64>,
    max_steps: usize,
    workers: usize,
    params: &'a TraceParams,
    /// Set by the first worker that fails so the others stop early
    halt: &'a AtomicBool,
}

impl TraceJob<'_> {
    /// Trace every start row assigned to `worker`.
    ///
    /// Rows are interleaved across workers (`1 + worker`, `1 + worker + n`,
    /// ...) so long and short traces spread evenly.
    fn run(&self, worker: usize) -> Result<Partial> {
        let result = self.run_rows(worker);
        if result.is_err() {
            self.halt.store(true, Ordering::Relaxed);
        }
        result
    }

    fn run_rows(&self, worker: usize) -> Result<Partial> {
        let (rows, cols) = self.flow_dir.dim();
        let mut partial = Partial::new(rows, cols);
        let mut path = Vec::new();

        for row in (1 + worker..rows.saturating_sub(1)).step_by(self.workers) {
            for col in 1..cols.saturating_sub(1) {
                if self.halt.load(Ordering::Relaxed) {
                    return Ok(partial);
                }
                if self.params.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                match walk(self.flow_dir, (row, col), self.max_steps, &mut path) {
                    Ok(()) => {
                        for &cell in &path {
                            partial.acc[cell] += self.contribution[cell];
                        }
                        partial.traces += 1;
                        partial.steps += path.len() as u64;
                    }
                    Err(Error::TraceDivergence { steps, .. }) if !self.params.abort_on_divergence => {
                        warn!(
                            "Trace from ({}, {}) still inside the grid after {} steps, discarding it",
                            row, col, steps
                        );
                        partial.diverged.push((row, col));
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(partial)
    }
}
