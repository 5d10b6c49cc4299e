//! Optimizer and calibration result types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use super::{AccuracyMetrics, ParameterSet};

// ============================================================================
// Methods
// ============================================================================

/// Single search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Random,
    Grid,
    Bayesian,
}

impl std::fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Random => write!(f, "random"),
            Self::Grid => write!(f, "grid"),
            Self::Bayesian => write!(f, "bayesian"),
        }
    }
}

/// Calibration strategy: a single optimizer or a composition of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMethod {
    #[default]
    Bayesian,
    Grid,
    Random,
    /// Bayesian + grid + random on an evenly split budget, best result kept
    Ensemble,
    /// Random exploration (25%) followed by Bayesian refinement (75%)
    Adaptive,
}

impl CalibrationMethod {
    /// The optimizer a standard method delegates to (`None` for composite modes).
    pub fn optimizer_kind(self) -> Option<OptimizerKind> {
        match self {
            Self::Bayesian => Some(OptimizerKind::Bayesian),
            Self::Grid => Some(OptimizerKind::Grid),
            Self::Random => Some(OptimizerKind::Random),
            Self::Ensemble | Self::Adaptive => None,
        }
    }
}

impl std::fmt::Display for CalibrationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bayesian => write!(f, "bayesian"),
            Self::Grid => write!(f, "grid"),
            Self::Random => write!(f, "random"),
            Self::Ensemble => write!(f, "ensemble"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Unrecognised calibration method name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown calibration method '{0}' (expected one of: bayesian, grid, random, ensemble, adaptive)")]
pub struct UnknownMethodError(pub String);

impl FromStr for CalibrationMethod {
    type Err = UnknownMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bayesian" => Ok(Self::Bayesian),
            "grid" => Ok(Self::Grid),
            "random" => Ok(Self::Random),
            "ensemble" => Ok(Self::Ensemble),
            "adaptive" => Ok(Self::Adaptive),
            _ => Err(UnknownMethodError(s.to_string())),
        }
    }
}

// ============================================================================
// Optimizer output
// ============================================================================

/// One objective evaluation performed by an optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub iteration: usize,
    pub params: ParameterSet,
    pub score: f64,
    /// Set when the objective failed and `score` is the worst-case value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why an optimizer stopped before spending its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceReason {
    /// A new best improved on the previous best by less than the threshold
    ConvergenceThreshold,
    /// Too many consecutive proposals without improvement
    Patience,
    /// The target was reached early (adaptive exploration phase)
    TargetReached,
}

impl std::fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConvergenceThreshold => write!(f, "improvement below convergence threshold"),
            Self::Patience => write!(f, "patience exhausted"),
            Self::TargetReached => write!(f, "target reached"),
        }
    }
}

/// Output of one `optimize` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub method: OptimizerKind,
    pub best_params: ParameterSet,
    pub best_score: f64,
    /// Trials in evaluation order
    pub history: Vec<Trial>,
    pub n_iterations: usize,
    pub converged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence_reason: Option<ConvergenceReason>,
}

impl OptimizationResult {
    /// Score recorded for a failed evaluation.
    pub fn worst_score(maximize: bool) -> f64 {
        if maximize {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }
    }

    /// Whether `candidate` beats `incumbent` in the requested direction.
    pub fn is_better(candidate: f64, incumbent: f64, maximize: bool) -> bool {
        if candidate.is_nan() {
            return false;
        }
        if maximize {
            candidate > incumbent
        } else {
            candidate < incumbent
        }
    }

    /// Build a result from an ordered trial history (first best wins ties).
    pub fn from_history(method: OptimizerKind, history: Vec<Trial>, maximize: bool) -> Self {
        let mut best_idx: Option<usize> = None;
        for (i, trial) in history.iter().enumerate() {
            let better = match best_idx {
                None => !trial.score.is_nan(),
                Some(b) => Self::is_better(trial.score, history[b].score, maximize),
            };
            if better {
                best_idx = Some(i);
            }
        }
        let (best_params, best_score) = match best_idx {
            Some(i) => (history[i].params.clone(), history[i].score),
            None => (
                history.first().map(|t| t.params.clone()).unwrap_or_default(),
                Self::worst_score(maximize),
            ),
        };
        Self {
            method,
            best_params,
            best_score,
            n_iterations: history.len(),
            history,
            converged: false,
            convergence_reason: None,
        }
    }

    pub fn with_convergence(mut self, reason: ConvergenceReason) -> Self {
        self.converged = true;
        self.convergence_reason = Some(reason);
        self
    }
}

// ============================================================================
// Calibration output
// ============================================================================

/// Calibrator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Configured,
    BaselineEvaluated,
    Running,
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configured => write!(f, "CONFIGURED"),
            Self::BaselineEvaluated => write!(f, "BASELINE_EVALUATED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// One simulation evaluation recorded by the calibrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTrial {
    pub params: ParameterSet,
    pub metrics: AccuracyMetrics,
    /// Weighted objective value (0 for failed evaluations)
    pub objective: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Seconds since the run started
    pub elapsed_seconds: f64,
}

/// Change of the best metrics relative to the baseline.
///
/// Without a baseline only `accuracy_improvement` is set (to the best accuracy).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Improvement {
    pub accuracy_improvement: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mae_reduction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmse_reduction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kl_reduction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brier_reduction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_improvement: Option<f64>,
}

impl Improvement {
    pub fn between(baseline: Option<&AccuracyMetrics>, best: &AccuracyMetrics) -> Self {
        match baseline {
            Some(base) => Self {
                accuracy_improvement: best.accuracy - base.accuracy,
                mae_reduction: Some(base.mae - best.mae),
                rmse_reduction: Some(base.rmse - best.rmse),
                kl_reduction: Some(base.kl_divergence - best.kl_divergence),
                brier_reduction: Some(base.brier_score - best.brier_score),
                correlation_improvement: Some(best.pearson_correlation - base.pearson_correlation),
            },
            None => Self {
                accuracy_improvement: best.accuracy,
                ..Self::default()
            },
        }
    }
}

/// Final outcome of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Best accuracy reached the configured target
    pub success: bool,
    pub best_params: ParameterSet,
    /// Best weighted objective value
    pub best_score: f64,
    pub best_metrics: AccuracyMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_metrics: Option<AccuracyMetrics>,
    pub improvement: Improvement,
    pub n_iterations: usize,
    pub elapsed_seconds: f64,
    pub method: CalibrationMethod,
    pub history: Vec<CalibrationTrial>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_metrics: Option<AccuracyMetrics>,
}

/// Live status of a calibrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProgress {
    pub phase: RunPhase,
    pub n_evaluations: usize,
    pub current_accuracy: f64,
    pub best_accuracy: f64,
    pub mean_accuracy: f64,
    /// Slope of accuracy over the recent window
    pub trend: f64,
    pub improving: bool,
    pub meets_target: bool,
    pub target_gap: f64,
}
