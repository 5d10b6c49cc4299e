//! Strategy compositions over factory-built optimizers.
//!
//! All three entry points take the calibration objective by reference and
//! return the optimizer result judged best. The calibrator derives its final
//! answer from its own evaluation history, so these results mostly drive
//! logging and convergence reporting.

use tracing::info;

use crate::config::defaults;
use crate::optimizer::{build_optimizer, BayesianOptimizer, Objective, Optimizer, OptimizerSettings};
use crate::types::{ConvergenceReason, OptimizationResult, OptimizerKind, ParameterBounds};

/// Delegate to a single optimizer with the whole budget.
pub fn run_standard(
    kind: OptimizerKind,
    bounds: &[ParameterBounds],
    budget: usize,
    settings: &OptimizerSettings,
    objective: &dyn Objective,
) -> OptimizationResult {
    let mut optimizer = build_optimizer(kind, bounds.to_vec(), budget, settings);
    optimizer.optimize(objective, true)
}

/// Per-method budgets for an ensemble run: `(bayesian, grid, random)`.
///
/// Even split, remainder to Bayesian.
pub fn ensemble_budgets(budget: usize) -> (usize, usize, usize) {
    let share = budget / 3;
    (budget - 2 * share, share, share)
}

/// Run Bayesian, grid, and random search on an even budget split and keep
/// the best result. Methods with a zero share are skipped.
pub fn run_ensemble(
    bounds: &[ParameterBounds],
    budget: usize,
    settings: &OptimizerSettings,
    objective: &dyn Objective,
) -> OptimizationResult {
    let (bayes_budget, grid_budget, random_budget) = ensemble_budgets(budget);
    let plan = [
        (OptimizerKind::Bayesian, bayes_budget),
        (OptimizerKind::Grid, grid_budget),
        (OptimizerKind::Random, random_budget),
    ];

    let mut best: Option<OptimizationResult> = None;
    for (kind, share) in plan {
        if share == 0 {
            continue;
        }
        let result = run_standard(kind, bounds, share, settings, objective);
        info!(method = %kind, budget = share, best_score = result.best_score, "Ensemble member finished");
        let replace = best
            .as_ref()
            .map_or(true, |b| OptimizationResult::is_better(result.best_score, b.best_score, true));
        if replace {
            best = Some(result);
        }
    }

    best.unwrap_or_else(|| OptimizationResult::from_history(OptimizerKind::Bayesian, Vec::new(), true))
}

/// Random evaluations spent exploring before the Bayesian phase.
pub fn exploration_budget(budget: usize) -> usize {
    let explore = (budget as f64 * defaults::ADAPTIVE_EXPLORATION_FRACTION).floor() as usize;
    explore.max(1).min(budget)
}

/// Random exploration, then Bayesian refinement seeded with every random trial.
///
/// `best_accuracy` reports the best accuracy seen so far in the run; when it
/// already meets `target` after exploration the random result is returned.
pub fn run_adaptive(
    bounds: &[ParameterBounds],
    budget: usize,
    settings: &OptimizerSettings,
    objective: &dyn Objective,
    target: f64,
    best_accuracy: &dyn Fn() -> f64,
) -> OptimizationResult {
    let explore = exploration_budget(budget);
    let random = run_standard(OptimizerKind::Random, bounds, explore, settings, objective);

    let reached = best_accuracy();
    if reached >= target {
        info!(accuracy = reached, target, "Target met during exploration; skipping Bayesian phase");
        return random.with_convergence(ConvergenceReason::TargetReached);
    }

    let remaining = budget - explore;
    if remaining == 0 {
        return random;
    }

    // Shift the seed so the Bayesian phase does not replay the exploration draws.
    let refine_settings = OptimizerSettings {
        seed: settings.seed.map(|s| s.wrapping_add(1)),
        ..settings.clone()
    };
    let mut bayesian = BayesianOptimizer::new(bounds.to_vec(), remaining, &refine_settings);
    for trial in &random.history {
        bayesian.update(&trial.params, trial.score);
    }
    info!(
        seeded = bayesian.n_observations(),
        budget = remaining,
        "Adaptive refinement starting"
    );
    let refined = bayesian.optimize(objective, true);

    if OptimizationResult::is_better(refined.best_score, random.best_score, true) {
        refined
    } else {
        random
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::ObjectiveError;
    use crate::types::ParameterSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bounds() -> Vec<ParameterBounds> {
        vec![ParameterBounds::continuous("x", 0.0, 10.0).unwrap()]
    }

    fn settings() -> OptimizerSettings {
        OptimizerSettings {
            seed: Some(17),
            ..OptimizerSettings::default()
        }
    }

    #[test]
    fn test_ensemble_budget_split() {
        assert_eq!(ensemble_budgets(10), (4, 3, 3));
        assert_eq!(ensemble_budgets(9), (3, 3, 3));
        assert_eq!(ensemble_budgets(2), (2, 0, 0));
    }

    #[test]
    fn test_exploration_budget() {
        assert_eq!(exploration_budget(100), 25);
        assert_eq!(exploration_budget(3), 1);
        assert_eq!(exploration_budget(1), 1);
        assert_eq!(exploration_budget(0), 0);
    }

    #[test]
    fn test_ensemble_not_worse_than_members() {
        let objective = |p: &ParameterSet| -> Result<f64, ObjectiveError> {
            let x = p["x"].as_f64().unwrap_or(0.0);
            Ok(-(x - 4.2).powi(2))
        };
        let ensemble = run_ensemble(&bounds(), 12, &settings(), &objective);
        let (bayes_budget, grid_budget, random_budget) = ensemble_budgets(12);
        let bayesian = run_standard(OptimizerKind::Bayesian, &bounds(), bayes_budget, &settings(), &objective);
        let random = run_standard(OptimizerKind::Random, &bounds(), random_budget, &settings(), &objective);
        let grid = run_standard(OptimizerKind::Grid, &bounds(), grid_budget, &settings(), &objective);
        assert!(ensemble.best_score >= bayesian.best_score);
        assert!(ensemble.best_score >= random.best_score);
        assert!(ensemble.best_score >= grid.best_score);
    }

    #[test]
    fn test_adaptive_returns_exploration_when_target_met() {
        let calls = AtomicUsize::new(0);
        let objective = |_: &ParameterSet| -> Result<f64, ObjectiveError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(1.0)
        };
        let result = run_adaptive(&bounds(), 20, &settings(), &objective, 0.8, &|| 0.9);
        assert_eq!(result.method, OptimizerKind::Random);
        assert_eq!(result.n_iterations, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(result.convergence_reason, Some(ConvergenceReason::TargetReached));
    }

    #[test]
    fn test_adaptive_refines_when_target_missed() {
        let calls = AtomicUsize::new(0);
        let objective = |p: &ParameterSet| -> Result<f64, ObjectiveError> {
            calls.fetch_add(1, Ordering::SeqCst);
            let x = p["x"].as_f64().unwrap_or(0.0);
            Ok(-(x - 7.5).powi(2))
        };
        let result = run_adaptive(&bounds(), 20, &settings(), &objective, 0.8, &|| 0.1);
        let n = calls.load(Ordering::SeqCst);
        assert!(n > 5 && n <= 20, "evaluations = {n}");
        assert!(result.best_score <= 0.0);
    }
}
