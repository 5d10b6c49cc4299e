//! Random search: independent uniform samples over a fixed budget.

use rand::rngs::StdRng;
use tracing::debug;

use crate::types::{OptimizationResult, OptimizerKind, ParameterBounds, Trial};

use super::{evaluate_or_worst, make_rng, sample_parameters, Objective, Optimizer};

pub struct RandomSearchOptimizer {
    bounds: Vec<ParameterBounds>,
    n_iterations: usize,
    rng: StdRng,
}

impl RandomSearchOptimizer {
    pub fn new(bounds: Vec<ParameterBounds>, n_iterations: usize, seed: Option<u64>) -> Self {
        Self {
            bounds,
            n_iterations,
            rng: make_rng(seed),
        }
    }
}

impl Optimizer for RandomSearchOptimizer {
    fn method(&self) -> OptimizerKind {
        OptimizerKind::Random
    }

    fn optimize(&mut self, objective: &dyn Objective, maximize: bool) -> OptimizationResult {
        let mut history = Vec::with_capacity(self.n_iterations);
        let mut best = OptimizationResult::worst_score(maximize);

        for iteration in 0..self.n_iterations {
            let params = sample_parameters(&self.bounds, &mut self.rng);
            let (score, error) = evaluate_or_worst(objective, &params, maximize);
            if OptimizationResult::is_better(score, best, maximize) {
                best = score;
                debug!(iteration, score, "Random search: new best");
            }
            history.push(Trial {
                iteration,
                params,
                score,
                error,
            });
        }

        OptimizationResult::from_history(OptimizerKind::Random, history, maximize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::ObjectiveError;
    use crate::types::{ParameterSet, ParameterValue};

    fn bounds() -> Vec<ParameterBounds> {
        vec![
            ParameterBounds::continuous("x", -5.0, 5.0).unwrap(),
            ParameterBounds::integer("n", 0, 10).unwrap(),
            ParameterBounds::categorical("mode", ["a", "b"]).unwrap(),
        ]
    }

    fn quadratic(params: &ParameterSet) -> Result<f64, ObjectiveError> {
        let x = params["x"].as_f64().unwrap_or(0.0);
        Ok(-(x - 1.0).powi(2))
    }

    #[test]
    fn test_exact_history_length_and_best() {
        let mut opt = RandomSearchOptimizer::new(bounds(), 37, Some(3));
        let result = opt.optimize(&quadratic, true);
        assert_eq!(result.history.len(), 37);
        assert_eq!(result.n_iterations, 37);
        let max = result
            .history
            .iter()
            .map(|t| t.score)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(result.best_score, max);
    }

    #[test]
    fn test_minimize_direction() {
        let mut opt = RandomSearchOptimizer::new(bounds(), 25, Some(9));
        let result = opt.optimize(&quadratic, false);
        let min = result.history.iter().map(|t| t.score).fold(f64::INFINITY, f64::min);
        assert_eq!(result.best_score, min);
    }

    #[test]
    fn test_samples_respect_bounds() {
        let mut opt = RandomSearchOptimizer::new(bounds(), 50, Some(1));
        let result = opt.optimize(&quadratic, true);
        for trial in &result.history {
            let x = trial.params["x"].as_f64().unwrap();
            assert!((-5.0..=5.0).contains(&x));
            assert!(matches!(trial.params["n"], ParameterValue::Int(0..=10)));
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let a = RandomSearchOptimizer::new(bounds(), 10, Some(42)).optimize(&quadratic, true);
        let b = RandomSearchOptimizer::new(bounds(), 10, Some(42)).optimize(&quadratic, true);
        assert_eq!(a, b);
    }

    #[test]
    fn test_failures_do_not_abort() {
        let flaky = |params: &ParameterSet| -> Result<f64, ObjectiveError> {
            let x = params["x"].as_f64().unwrap_or(0.0);
            if x < 0.0 {
                Err(ObjectiveError::new("negative x"))
            } else {
                Ok(x)
            }
        };
        let mut opt = RandomSearchOptimizer::new(bounds(), 40, Some(5));
        let result = opt.optimize(&flaky, true);
        assert_eq!(result.history.len(), 40);
        assert!(result.history.iter().any(|t| t.error.is_some()));
        assert!(result.best_score >= 0.0);
    }
}
