//! Monte Carlo uncertainty engine.
//!
//! All coefficient draws come from a single generator seeded once, in draw
//! order, before any evaluation starts. Evaluation then runs on a rayon pool;
//! because the draws are fixed up front, results do not depend on how the
//! pool schedules work.

use super::sampler::MvnSampler;
use super::SimulationError;
use crate::core::FailedDraw;
use faer::Col;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::fmt::Display;
use tracing::{info, warn};

/// One realization of every coefficient vector, in sampler order.
#[derive(Debug, Clone)]
pub struct CoefficientDraw {
    pub vectors: Vec<Col<f64>>,
}

/// Successful draws and the ones left out.
#[derive(Debug, Clone)]
pub struct MonteCarloOutcome<T> {
    /// `(draw index, value)` in draw order.
    pub results: Vec<(usize, T)>,
    pub failed: Vec<FailedDraw>,
}

impl<T> MonteCarloOutcome<T> {
    pub fn n_succeeded(&self) -> usize {
        self.results.len()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.results.iter().map(|(_, v)| v)
    }
}

/// Draw generator and parallel evaluator.
#[derive(Debug, Clone)]
pub struct MonteCarloEngine {
    n_draws: usize,
    seed: u64,
    n_threads: usize,
}

impl MonteCarloEngine {
    pub fn new(n_draws: usize, seed: u64, n_threads: usize) -> Self {
        Self {
            n_draws,
            seed,
            n_threads,
        }
    }

    pub fn n_draws(&self) -> usize {
        self.n_draws
    }

    /// Pre-generate all draws: for each draw, one vector per sampler.
    pub fn generate(&self, samplers: &[&MvnSampler]) -> Vec<CoefficientDraw> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        (0..self.n_draws)
            .map(|_| CoefficientDraw {
                vectors: samplers.iter().map(|s| s.draw(&mut rng)).collect(),
            })
            .collect()
    }

    /// Evaluate `f` for every draw in parallel.
    ///
    /// A draw whose evaluation fails is logged and excluded. Fails only when
    /// the pool cannot be built or every draw failed.
    pub fn run<D, T, E, F>(&self, draws: &[D], f: F) -> Result<MonteCarloOutcome<T>, SimulationError>
    where
        D: Sync,
        T: Send,
        E: Display,
        F: Fn(usize, &D) -> Result<T, E> + Sync + Send,
    {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if self.n_threads > 0 {
            builder = builder.num_threads(self.n_threads);
        }
        let pool = builder
            .build()
            .map_err(|e| SimulationError::ThreadPool(e.to_string()))?;

        info!(n_draws = draws.len(), threads = pool.current_num_threads(), "running Monte Carlo draws");

        let evaluated: Vec<(usize, Result<T, String>)> = pool.install(|| {
            draws
                .par_iter()
                .enumerate()
                .map(|(i, d)| (i, f(i, d).map_err(|e| e.to_string())))
                .collect()
        });

        let mut results = Vec::with_capacity(evaluated.len());
        let mut failed = Vec::new();
        for (index, outcome) in evaluated {
            match outcome {
                Ok(value) => results.push((index, value)),
                Err(reason) => {
                    warn!(draw = index, %reason, "Monte Carlo draw excluded");
                    failed.push(FailedDraw { index, reason });
                }
            }
        }

        if results.is_empty() && !draws.is_empty() {
            return Err(SimulationError::AllDrawsFailed(draws.len()));
        }
        if !failed.is_empty() {
            info!(excluded = failed.len(), kept = results.len(), "Monte Carlo finished with exclusions");
        }

        Ok(MonteCarloOutcome { results, failed })
    }
}
