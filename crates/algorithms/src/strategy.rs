//! Execution strategies for independent per-cell work
//!
//! Work is split into a fixed number of worker jobs. Each job builds its own
//! result (typically a private partial grid) and the caller merges them, so
//! no job ever writes to shared state.

use bmptrace_core::{Error, Result};

/// Processing mode for algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing using all available cores
    #[default]
    Parallel,
    /// Parallel with a dedicated pool of the given number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Number of worker jobs this mode runs
    pub fn workers(&self) -> usize {
        match self {
            ProcessingMode::Sequential => 1,
            ProcessingMode::Parallel => num_cpus(),
            ProcessingMode::ParallelWith(threads) => (*threads).max(1),
        }
    }

    /// Run `f` for every worker index in `0..workers` and collect the results
    /// in worker order.
    pub fn run_workers<T, F>(&self, workers: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => Ok((0..workers).map(f).collect()),
            ProcessingMode::Parallel => Ok(par_map(workers, f)),
            ProcessingMode::ParallelWith(threads) => {
                if *threads == 0 {
                    return Err(Error::InvalidParameter {
                        name: "threads",
                        value: threads.to_string(),
                        reason: "must be at least 1".into(),
                    });
                }
                with_pool(*threads, || par_map(workers, f))
            }
        }
    }
}

#[cfg(feature = "parallel")]
fn par_map<T, F>(workers: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    use rayon::prelude::*;
    (0..workers).into_par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
fn par_map<T, F>(workers: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    (0..workers).map(f).collect()
}

#[cfg(feature = "parallel")]
fn with_pool<T, F>(threads: usize, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::Other(format!("Failed to build thread pool: {}", e)))?;
    Ok(pool.install(f))
}

#[cfg(not(feature = "parallel"))]
fn with_pool<T, F>(_threads: usize, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    Ok(f())
}

/// Get the number of available CPU cores
#[cfg(feature = "parallel")]
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}

/// Get the number of available CPU cores
#[cfg(not(feature = "parallel"))]
pub fn num_cpus() -> usize {
    1
}
