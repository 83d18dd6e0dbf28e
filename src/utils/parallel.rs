//! Parallel processing utilities

use crate::error::{Result, VelotuneError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Number of threads (None = use the global pool)
    pub n_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of threads
    pub fn with_threads(mut self, n: usize) -> Self {
        self.n_threads = Some(n);
        self
    }

    /// Get the number of threads to use
    pub fn num_threads(&self) -> usize {
        self.n_threads.unwrap_or_else(rayon::current_num_threads)
    }
}

/// Map `f` over `0..n`, preserving order.
///
/// A single thread runs inline on the caller, an explicit thread count gets a
/// dedicated pool, and no thread count uses rayon's global pool.
pub fn parallel_map_indexed<U, F>(n: usize, config: &ParallelConfig, f: F) -> Result<Vec<U>>
where
    U: Send,
    F: Fn(usize) -> U + Send + Sync,
{
    match config.n_threads {
        Some(0) => Err(VelotuneError::ConfigError(
            "thread count must be positive".to_string(),
        )),
        Some(1) => Ok((0..n).map(f).collect()),
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| VelotuneError::ThreadPoolError(e.to_string()))?;
            Ok(pool.install(|| (0..n).into_par_iter().map(&f).collect()))
        }
        None => Ok((0..n).into_par_iter().map(f).collect()),
    }
}
