//! Bayesian optimization: GP surrogate + Expected Improvement.
//!
//! Observations are stored as unit-encoded vectors (one coordinate per bound,
//! see [`ParameterBounds::to_unit`]) with raw scores. Scores are oriented so
//! that the surrogate always maximizes: when minimizing, the GP is fitted on
//! negated scores.
//!
//! The run draws `n_initial` random samples (less any observations already
//! supplied through [`BayesianOptimizer::update`]) and then proposes points by
//! maximizing EI over `n_candidates` random unit candidates, stopping early on
//! a negligible improvement or when patience runs out.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;
use tracing::{debug, info};

use crate::config::defaults;
use crate::types::{ConvergenceReason, OptimizationResult, OptimizerKind, ParameterBounds, ParameterSet, Trial};

use super::gaussian_process::GaussianProcess;
use super::{evaluate_or_worst, make_rng, sample_parameters, Objective, Optimizer, OptimizerSettings};

/// Below this predictive std, EI collapses to the plain improvement.
const SIGMA_FLOOR: f64 = 1e-12;

/// Surrogate and acquisition settings (`[bayesian]` config section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianSettings {
    /// Random samples before the surrogate takes over
    #[serde(default = "default_n_initial")]
    pub n_initial: usize,

    /// Random unit candidates scored by EI per proposal
    #[serde(default = "default_n_candidates")]
    pub n_candidates: usize,

    /// RBF length-scale in unit-encoded space (same for every dimension)
    #[serde(default = "default_length_scale")]
    pub length_scale: f64,

    /// Added to the covariance diagonal
    #[serde(default = "default_noise_variance")]
    pub noise_variance: f64,

    /// EI exploration margin ξ
    #[serde(default = "default_exploration")]
    pub exploration: f64,
}

fn default_n_initial() -> usize {
    defaults::BAYES_N_INITIAL
}
fn default_n_candidates() -> usize {
    defaults::BAYES_N_CANDIDATES
}
fn default_length_scale() -> f64 {
    defaults::BAYES_LENGTH_SCALE
}
fn default_noise_variance() -> f64 {
    defaults::BAYES_NOISE_VARIANCE
}
fn default_exploration() -> f64 {
    defaults::BAYES_EXPLORATION
}

impl Default for BayesianSettings {
    fn default() -> Self {
        Self {
            n_initial: default_n_initial(),
            n_candidates: default_n_candidates(),
            length_scale: default_length_scale(),
            noise_variance: default_noise_variance(),
            exploration: default_exploration(),
        }
    }
}

pub struct BayesianOptimizer {
    bounds: Vec<ParameterBounds>,
    n_iterations: usize,
    settings: BayesianSettings,
    patience: usize,
    convergence_threshold: f64,
    maximize: bool,
    rng: StdRng,
    observations: Vec<(ParameterSet, f64)>,
}

impl BayesianOptimizer {
    pub fn new(bounds: Vec<ParameterBounds>, n_iterations: usize, settings: &OptimizerSettings) -> Self {
        Self {
            bounds,
            n_iterations,
            settings: settings.bayesian.clone(),
            patience: settings.patience,
            convergence_threshold: settings.convergence_threshold,
            maximize: true,
            rng: make_rng(settings.seed),
            observations: Vec::new(),
        }
    }

    /// Direction used by [`suggest_next`](Self::suggest_next) before `optimize` sets it.
    pub fn with_maximize(mut self, maximize: bool) -> Self {
        self.maximize = maximize;
        self
    }

    pub fn maximize(&self) -> bool {
        self.maximize
    }

    pub fn n_observations(&self) -> usize {
        self.observations.len()
    }

    /// Record an externally evaluated point. Values are clipped into the bounds.
    pub fn update(&mut self, params: &ParameterSet, score: f64) {
        let clipped: ParameterSet = self
            .bounds
            .iter()
            .map(|b| {
                let value = params
                    .get(b.name())
                    .map_or_else(|| b.from_unit(0.5), |v| b.clip(v));
                (b.name().to_string(), value)
            })
            .collect();
        self.observations.push((clipped, score));
    }

    /// Best observation so far in the current direction.
    pub fn best_observation(&self) -> Option<(&ParameterSet, f64)> {
        let mut best: Option<(&ParameterSet, f64)> = None;
        for (params, score) in &self.observations {
            let better = match best {
                None => !score.is_nan(),
                Some((_, b)) => OptimizationResult::is_better(*score, b, self.maximize),
            };
            if better {
                best = Some((params, *score));
            }
        }
        best
    }

    /// Propose the next point to evaluate.
    ///
    /// Falls back to a uniform sample until at least two observations exist.
    pub fn suggest_next(&mut self) -> ParameterSet {
        if self.observations.len() < 2 || self.bounds.is_empty() {
            return sample_parameters(&self.bounds, &mut self.rng);
        }

        let (x, y): (Vec<Vec<f64>>, Vec<f64>) = self
            .observations
            .iter()
            .map(|(params, score)| (self.encode(params), self.orient(*score)))
            .unzip();

        let mut gp = GaussianProcess::isotropic(
            self.bounds.len(),
            self.settings.length_scale,
            self.settings.noise_variance,
        );
        gp.fit(&x, &y);

        let incumbent = y
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .unwrap_or(0.0);

        let mut best_candidate: Option<(ParameterSet, f64)> = None;
        for _ in 0..self.settings.n_candidates.max(1) {
            let candidate: ParameterSet = self
                .bounds
                .iter()
                .map(|b| (b.name().to_string(), b.from_unit(self.rng.gen::<f64>())))
                .collect();
            let (mu, sigma) = gp.predict(&self.encode(&candidate));
            let ei = expected_improvement(mu, sigma, incumbent, self.settings.exploration);
            if best_candidate.as_ref().map_or(true, |(_, b)| ei > *b) {
                best_candidate = Some((candidate, ei));
            }
        }

        match best_candidate {
            Some((candidate, ei)) => {
                debug!(ei, degraded = gp.is_degraded(), "Bayesian proposal");
                candidate
            }
            None => sample_parameters(&self.bounds, &mut self.rng),
        }
    }

    fn encode(&self, params: &ParameterSet) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|b| params.get(b.name()).map_or(0.5, |v| b.to_unit(v)))
            .collect()
    }

    fn orient(&self, score: f64) -> f64 {
        if self.maximize {
            score
        } else {
            -score
        }
    }

    /// Score, record, and observe one point. Returns `None` when the objective failed.
    fn evaluate(&mut self, objective: &dyn Objective, params: ParameterSet, history: &mut Vec<Trial>) -> Option<f64> {
        let (score, error) = evaluate_or_worst(objective, &params, self.maximize);
        let failed = error.is_some();
        self.update(&params, score);
        history.push(Trial {
            iteration: history.len(),
            params,
            score,
            error,
        });
        (!failed).then_some(score)
    }
}

impl Optimizer for BayesianOptimizer {
    fn method(&self) -> OptimizerKind {
        OptimizerKind::Bayesian
    }

    fn optimize(&mut self, objective: &dyn Objective, maximize: bool) -> OptimizationResult {
        self.maximize = maximize;
        let mut history = Vec::with_capacity(self.n_iterations);

        let n_random = self
            .settings
            .n_initial
            .saturating_sub(self.observations.len())
            .min(self.n_iterations);
        for _ in 0..n_random {
            let params = sample_parameters(&self.bounds, &mut self.rng);
            self.evaluate(objective, params, &mut history);
        }

        let mut best = self
            .best_observation()
            .map_or(OptimizationResult::worst_score(maximize), |(_, s)| s);
        let mut stale = 0usize;
        let mut reason = None;

        while history.len() < self.n_iterations {
            let params = self.suggest_next();
            // Failed evaluations spend budget but never count toward an early stop.
            let Some(score) = self.evaluate(objective, params, &mut history) else {
                continue;
            };

            if OptimizationResult::is_better(score, best, maximize) {
                let gain = (score - best).abs();
                best = score;
                stale = 0;
                if gain < self.convergence_threshold {
                    reason = Some(ConvergenceReason::ConvergenceThreshold);
                    break;
                }
            } else {
                stale += 1;
                if stale >= self.patience {
                    reason = Some(ConvergenceReason::Patience);
                    break;
                }
            }
        }

        let result = OptimizationResult::from_history(OptimizerKind::Bayesian, history, maximize);
        match reason {
            Some(reason) => {
                info!(
                    n_evaluations = result.n_iterations,
                    best_score = result.best_score,
                    %reason,
                    "Bayesian optimization stopped early"
                );
                result.with_convergence(reason)
            }
            None => result,
        }
    }
}

/// Expected Improvement over `incumbent` for a maximization problem.
pub fn expected_improvement(mu: f64, sigma: f64, incumbent: f64, exploration: f64) -> f64 {
    let improvement = mu - incumbent - exploration;
    if sigma.is_nan() || sigma < SIGMA_FLOOR {
        return improvement.max(0.0);
    }
    let z = improvement / sigma;
    (improvement * normal_cdf(z) + sigma * normal_pdf(z)).max(0.0)
}

fn normal_pdf(z: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * z * z).exp()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::ObjectiveError;
    use crate::types::ParameterValue;

    fn settings(seed: u64) -> OptimizerSettings {
        OptimizerSettings {
            seed: Some(seed),
            patience: 10,
            convergence_threshold: 1e-9,
            bayesian: BayesianSettings {
                n_candidates: 200,
                ..BayesianSettings::default()
            },
            ..OptimizerSettings::default()
        }
    }

    fn x_bounds() -> Vec<ParameterBounds> {
        vec![ParameterBounds::continuous("x", 0.0, 10.0).unwrap()]
    }

    fn peak_at_seven(params: &ParameterSet) -> Result<f64, ObjectiveError> {
        let x = params["x"].as_f64().unwrap_or(0.0);
        Ok(-(x - 7.0).powi(2))
    }

    #[test]
    fn test_expected_improvement_properties() {
        assert_eq!(expected_improvement(1.0, 0.0, 0.5, 0.0), 0.5);
        assert_eq!(expected_improvement(0.0, 0.0, 0.5, 0.0), 0.0);
        let wide = expected_improvement(0.0, 2.0, 0.5, 0.01);
        let narrow = expected_improvement(0.0, 0.5, 0.5, 0.01);
        assert!(wide > narrow);
        assert!(expected_improvement(-100.0, 1.0, 0.0, 0.01) >= 0.0);
    }

    #[test]
    fn test_normal_cdf() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!(normal_cdf(-8.0) < 1e-10);
    }

    #[test]
    fn test_constant_objective_never_panics() {
        let constant = |_: &ParameterSet| -> Result<f64, ObjectiveError> { Ok(0.5) };
        let bounds = vec![
            ParameterBounds::continuous("x", 0.0, 1.0).unwrap(),
            ParameterBounds::integer("n", 1, 4).unwrap(),
            ParameterBounds::categorical("c", ["a", "b"]).unwrap(),
        ];
        let mut opt = BayesianOptimizer::new(bounds, 30, &settings(1));
        let result = opt.optimize(&constant, true);
        assert!(result.n_iterations >= 1 && result.n_iterations <= 30);
        assert_eq!(result.best_score, 0.5);
        assert_eq!(result.convergence_reason, Some(ConvergenceReason::Patience));
    }

    #[test]
    fn test_finds_peak() {
        let mut opt = BayesianOptimizer::new(x_bounds(), 30, &settings(11));
        let result = opt.optimize(&peak_at_seven, true);
        let x = result.best_params["x"].as_f64().unwrap();
        assert!((x - 7.0).abs() < 1.5, "best x = {x}");
    }

    #[test]
    fn test_minimize_orientation() {
        let bowl = |params: &ParameterSet| -> Result<f64, ObjectiveError> {
            let x = params["x"].as_f64().unwrap_or(0.0);
            Ok((x - 3.0).powi(2))
        };
        let mut opt = BayesianOptimizer::new(x_bounds(), 30, &settings(5));
        let result = opt.optimize(&bowl, false);
        let min = result.history.iter().map(|t| t.score).fold(f64::INFINITY, f64::min);
        assert_eq!(result.best_score, min);
        assert!(result.best_score < 2.0);
    }

    #[test]
    fn test_budget_never_exceeded() {
        let mut opt = BayesianOptimizer::new(x_bounds(), 3, &settings(2));
        let result = opt.optimize(&peak_at_seven, true);
        assert!(result.n_iterations <= 3);
    }

    #[test]
    fn test_prior_observations_reduce_random_phase() {
        let mut opt = BayesianOptimizer::new(x_bounds(), 4, &settings(3));
        for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
            let mut p = ParameterSet::new();
            p.insert("x".into(), ParameterValue::Float(x));
            let score = peak_at_seven(&p).unwrap();
            opt.update(&p, score);
        }
        assert_eq!(opt.n_observations(), 5);
        let suggestion = opt.suggest_next();
        let x = suggestion["x"].as_f64().unwrap();
        assert!((0.0..=10.0).contains(&x));

        let result = opt.optimize(&peak_at_seven, true);
        assert!(result.n_iterations >= 1);
        assert!(result.history.len() <= 4);
    }

    #[test]
    fn test_update_clips_out_of_range() {
        let mut opt = BayesianOptimizer::new(x_bounds(), 4, &settings(3));
        let mut p = ParameterSet::new();
        p.insert("x".into(), ParameterValue::Float(42.0));
        opt.update(&p, 1.0);
        let (best, score) = opt.best_observation().unwrap();
        assert_eq!(best["x"], ParameterValue::Float(10.0));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_always_failing_objective() {
        let failing = |_: &ParameterSet| -> Result<f64, ObjectiveError> { Err(ObjectiveError::new("down")) };
        let mut opt = BayesianOptimizer::new(x_bounds(), 20, &settings(8));
        let result = opt.optimize(&failing, true);
        assert_eq!(result.n_iterations, 20);
        assert_eq!(result.best_score, f64::NEG_INFINITY);
        assert!(result.history.iter().all(|t| t.error.is_some()));
        assert!(result.convergence_reason.is_none());
    }

    #[test]
    fn test_failures_do_not_count_toward_patience() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        // First evaluation succeeds, every later one fails.
        let flaky = |_: &ParameterSet| -> Result<f64, ObjectiveError> {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Ok(1.0)
            } else {
                Err(ObjectiveError::new("solver diverged"))
            }
        };
        let mut opt = BayesianOptimizer::new(x_bounds(), 25, &settings(4));
        let result = opt.optimize(&flaky, true);
        assert_eq!(result.history.len(), 25);
        assert_eq!(result.best_score, 1.0);
    }
}
