//! Exhaustive grid search over the Cartesian product of per-bound grids.
//!
//! The grid is evaluated in parallel on a dedicated rayon pool sized by the
//! worker count. `par_iter().collect()` preserves grid order, so the history
//! and tie-breaking are identical to a sequential run.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::{OptimizationResult, OptimizerKind, ParameterBounds, ParameterSet, ParameterValue, Trial};

use super::{evaluate_or_worst, Objective, Optimizer};

/// Grid resolution (`[grid]` config section).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridSettings {
    /// Points per numeric dimension; derived from the budget when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_per_dimension: Option<usize>,
}

pub struct GridSearchOptimizer {
    bounds: Vec<ParameterBounds>,
    points_per_dimension: usize,
    n_workers: usize,
}

impl GridSearchOptimizer {
    pub fn new(bounds: Vec<ParameterBounds>, budget: usize, settings: &GridSettings, n_workers: usize) -> Self {
        let n_numeric = bounds.iter().filter(|b| b.is_numeric()).count();
        let points_per_dimension = settings
            .points_per_dimension
            .unwrap_or_else(|| points_for_budget(budget, n_numeric))
            .max(1);
        Self {
            bounds,
            points_per_dimension,
            n_workers: n_workers.max(1),
        }
    }

    pub fn points_per_dimension(&self) -> usize {
        self.points_per_dimension
    }

    /// Every grid point, first bound varying slowest.
    pub fn grid(&self) -> Vec<ParameterSet> {
        let mut points = vec![ParameterSet::new()];
        for bound in &self.bounds {
            let values: Vec<ParameterValue> = bound.grid_values(self.points_per_dimension);
            let mut next = Vec::with_capacity(points.len() * values.len());
            for point in &points {
                for value in &values {
                    let mut extended = point.clone();
                    extended.insert(bound.name().to_string(), value.clone());
                    next.push(extended);
                }
            }
            points = next;
        }
        if self.bounds.is_empty() {
            points.clear();
        }
        points
    }
}

/// max(2, ⌊budget^(1/d)⌋) points per numeric dimension.
pub fn points_for_budget(budget: usize, n_numeric: usize) -> usize {
    if n_numeric == 0 {
        return 2;
    }
    // Nudge up so exact powers (1000^(1/3)) are not floored one short.
    let per_dim = ((budget as f64).powf(1.0 / n_numeric as f64) + 1e-9).floor() as usize;
    per_dim.max(2)
}

impl Optimizer for GridSearchOptimizer {
    fn method(&self) -> OptimizerKind {
        OptimizerKind::Grid
    }

    fn optimize(&mut self, objective: &dyn Objective, maximize: bool) -> OptimizationResult {
        let grid = self.grid();
        info!(
            n_points = grid.len(),
            points_per_dimension = self.points_per_dimension,
            n_workers = self.n_workers,
            "Grid search starting"
        );

        let scored: Vec<(f64, Option<String>)> =
            match rayon::ThreadPoolBuilder::new().num_threads(self.n_workers).build() {
                Ok(pool) => pool.install(|| {
                    grid.par_iter()
                        .map(|params| evaluate_or_worst(objective, params, maximize))
                        .collect()
                }),
                Err(e) => {
                    warn!(error = %e, "Could not build grid worker pool; evaluating sequentially");
                    grid.iter()
                        .map(|params| evaluate_or_worst(objective, params, maximize))
                        .collect()
                }
            };

        let history: Vec<Trial> = grid
            .into_iter()
            .zip(scored)
            .enumerate()
            .map(|(iteration, (params, (score, error)))| Trial {
                iteration,
                params,
                score,
                error,
            })
            .collect();

        let result = OptimizationResult::from_history(OptimizerKind::Grid, history, maximize);
        debug!(best_score = result.best_score, "Grid search finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::ObjectiveError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_points_for_budget() {
        assert_eq!(points_for_budget(100, 2), 10);
        assert_eq!(points_for_budget(1000, 3), 10);
        assert_eq!(points_for_budget(3, 2), 2);
        assert_eq!(points_for_budget(50, 0), 2);
    }

    #[test]
    fn test_grid_is_cartesian_product_in_order() {
        let bounds = vec![
            ParameterBounds::continuous("x", 0.0, 1.0).unwrap(),
            ParameterBounds::categorical("mode", ["a", "b"]).unwrap(),
        ];
        let opt = GridSearchOptimizer::new(
            bounds,
            0,
            &GridSettings {
                points_per_dimension: Some(3),
            },
            2,
        );
        let grid = opt.grid();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid[0]["x"], ParameterValue::Float(0.0));
        assert_eq!(grid[0]["mode"], ParameterValue::Category("a".into()));
        assert_eq!(grid[1]["mode"], ParameterValue::Category("b".into()));
        assert_eq!(grid[5]["x"], ParameterValue::Float(1.0));
    }

    #[test]
    fn test_parallel_evaluation_keeps_order_and_finds_best() {
        let bounds = vec![ParameterBounds::integer("n", 0, 9).unwrap()];
        let opt_settings = GridSettings {
            points_per_dimension: Some(10),
        };
        let calls = AtomicUsize::new(0);
        let objective = |params: &ParameterSet| -> Result<f64, ObjectiveError> {
            calls.fetch_add(1, Ordering::SeqCst);
            let n = params["n"].as_f64().unwrap_or(0.0);
            Ok(-(n - 6.0).abs())
        };
        let mut opt = GridSearchOptimizer::new(bounds, 10, &opt_settings, 4);
        let result = opt.optimize(&objective, true);

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(result.history.len(), 10);
        for (i, trial) in result.history.iter().enumerate() {
            assert_eq!(trial.iteration, i);
            assert_eq!(trial.params["n"], ParameterValue::Int(i as i64));
        }
        assert_eq!(result.best_params["n"], ParameterValue::Int(6));
        assert_eq!(result.best_score, 0.0);
    }

    #[test]
    fn test_errors_become_worst_case() {
        let bounds = vec![ParameterBounds::continuous("x", 0.0, 1.0).unwrap()];
        let failing = |_: &ParameterSet| -> Result<f64, ObjectiveError> { Err(ObjectiveError::new("nope")) };
        let mut opt = GridSearchOptimizer::new(bounds, 4, &GridSettings::default(), 2);
        let result = opt.optimize(&failing, false);
        assert_eq!(result.history.len(), opt.points_per_dimension());
        assert!(result.history.iter().all(|t| t.score == f64::INFINITY));
    }
}
