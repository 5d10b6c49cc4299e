//! Optimizer Family
//!
//! Interchangeable black-box search strategies sharing one contract:
//! `optimize(objective, maximize) -> OptimizationResult`.
//!
//! ## Architecture
//! - `random`: independent uniform samples, fixed budget (baseline)
//! - `grid`: Cartesian grid evaluated on a bounded rayon worker pool
//! - `gaussian_process`: RBF-kernel GP surrogate with Cholesky solve
//! - `bayesian`: GP + Expected Improvement, with incremental `suggest_next` / `update`
//!
//! Strategies are selected through the tagged [`OptimizerKind`] value via
//! [`build_optimizer`].

pub mod random;
pub mod grid;
pub mod gaussian_process;
pub mod bayesian;

pub use bayesian::{BayesianOptimizer, BayesianSettings};
pub use gaussian_process::GaussianProcess;
pub use grid::{GridSearchOptimizer, GridSettings};
pub use random::RandomSearchOptimizer;

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::types::{OptimizationResult, OptimizerKind, ParameterBounds, ParameterSet};

/// Objective evaluation failure. Optimizers record it as a worst-case trial.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("objective evaluation failed: {0}")]
pub struct ObjectiveError(pub String);

impl ObjectiveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A scalar score over parameter sets.
///
/// `Sync` because grid search evaluates concurrently.
pub trait Objective: Sync {
    fn evaluate(&self, params: &ParameterSet) -> Result<f64, ObjectiveError>;
}

impl<F> Objective for F
where
    F: Fn(&ParameterSet) -> Result<f64, ObjectiveError> + Sync,
{
    fn evaluate(&self, params: &ParameterSet) -> Result<f64, ObjectiveError> {
        self(params)
    }
}

/// A search strategy.
pub trait Optimizer: Send {
    fn method(&self) -> OptimizerKind;

    /// Search for the best parameters. Never fails: objective errors become
    /// worst-case trials.
    fn optimize(&mut self, objective: &dyn Objective, maximize: bool) -> OptimizationResult;
}

/// Knobs shared by every strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    /// RNG seed; `None` draws from entropy
    pub seed: Option<u64>,
    /// Consecutive non-improving Bayesian proposals before stopping
    pub patience: usize,
    /// Minimum improvement of a new best before declaring convergence
    pub convergence_threshold: f64,
    /// Concurrent grid evaluations
    pub n_workers: usize,
    pub bayesian: BayesianSettings,
    pub grid: GridSettings,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            seed: None,
            patience: crate::config::defaults::PATIENCE,
            convergence_threshold: crate::config::defaults::CONVERGENCE_THRESHOLD,
            n_workers: crate::config::defaults::N_PARALLEL_EVALUATIONS,
            bayesian: BayesianSettings::default(),
            grid: GridSettings::default(),
        }
    }
}

/// Build a strategy with a total evaluation `budget`.
pub fn build_optimizer(
    kind: OptimizerKind,
    bounds: Vec<ParameterBounds>,
    budget: usize,
    settings: &OptimizerSettings,
) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Random => Box::new(RandomSearchOptimizer::new(bounds, budget, settings.seed)),
        OptimizerKind::Grid => Box::new(GridSearchOptimizer::new(
            bounds,
            budget,
            &settings.grid,
            settings.n_workers,
        )),
        OptimizerKind::Bayesian => Box::new(BayesianOptimizer::new(bounds, budget, settings)),
    }
}

/// Seeded or entropy-backed RNG.
pub(crate) fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Score a parameter set, folding objective errors into a worst-case score.
pub(crate) fn evaluate_or_worst(
    objective: &dyn Objective,
    params: &ParameterSet,
    maximize: bool,
) -> (f64, Option<String>) {
    match objective.evaluate(params) {
        Ok(score) if score.is_nan() => (
            OptimizationResult::worst_score(maximize),
            Some("objective returned NaN".to_string()),
        ),
        Ok(score) => (score, None),
        Err(e) => {
            tracing::debug!(error = %e, "Objective failed; recording worst-case score");
            (OptimizationResult::worst_score(maximize), Some(e.to_string()))
        }
    }
}

/// Draw one uniform sample per bound.
pub(crate) fn sample_parameters<R: rand::Rng + ?Sized>(
    bounds: &[ParameterBounds],
    rng: &mut R,
) -> ParameterSet {
    bounds
        .iter()
        .map(|b| (b.name().to_string(), b.sample_uniform(rng)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_kinds() {
        let bounds = vec![ParameterBounds::continuous("x", 0.0, 1.0).unwrap()];
        let settings = OptimizerSettings::default();
        for kind in [OptimizerKind::Random, OptimizerKind::Grid, OptimizerKind::Bayesian] {
            let opt = build_optimizer(kind, bounds.clone(), 4, &settings);
            assert_eq!(opt.method(), kind);
        }
    }

    #[test]
    fn test_evaluate_or_worst() {
        let failing = |_: &ParameterSet| -> Result<f64, ObjectiveError> { Err(ObjectiveError::new("boom")) };
        let (score, err) = evaluate_or_worst(&failing, &ParameterSet::new(), true);
        assert_eq!(score, f64::NEG_INFINITY);
        assert!(err.unwrap().contains("boom"));

        let nan = |_: &ParameterSet| -> Result<f64, ObjectiveError> { Ok(f64::NAN) };
        let (score, err) = evaluate_or_worst(&nan, &ParameterSet::new(), false);
        assert_eq!(score, f64::INFINITY);
        assert!(err.is_some());
    }
}
