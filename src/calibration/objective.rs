//! Simulation runner boundary and the weighted calibration objective.
//!
//! Everything that can go wrong inside a host simulation (an `Err`, a panic,
//! a prediction with no usable categories) is absorbed here and turned into a
//! zero score. `Err` and panic outcomes also keep their message so the
//! calibrator can report them to the optimizer as failed evaluations.

use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;
use tracing::warn;

use crate::config::ObjectiveWeights;
use crate::metrics::compute_accuracy_metrics;
use crate::types::{AccuracyMetrics, GroundTruth, ParameterSet, SimulationOutput};

/// Failure reported by a host simulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("simulation failed: {0}")]
pub struct SimulationError(pub String);

impl SimulationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Host-supplied simulation. Must be pure: the same parameters give the same
/// output, and concurrent calls must not interfere (grid search runs them in
/// parallel).
pub trait SimulationRunner: Send + Sync {
    fn run(&self, params: &ParameterSet) -> Result<SimulationOutput, SimulationError>;
}

impl<F> SimulationRunner for F
where
    F: Fn(&ParameterSet) -> Result<SimulationOutput, SimulationError> + Send + Sync,
{
    fn run(&self, params: &ParameterSet) -> Result<SimulationOutput, SimulationError> {
        self(params)
    }
}

/// Outcome of one simulation evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub metrics: AccuracyMetrics,
    pub objective: f64,
    pub error: Option<String>,
}

/// `accuracy·w_a + (1 − min(kl, 1))·w_kl + coverage·w_c`.
///
/// Empty metrics (nothing comparable) score 0 regardless of weights.
pub fn weighted_objective(metrics: &AccuracyMetrics, weights: &ObjectiveWeights) -> f64 {
    if metrics.is_empty() {
        return 0.0;
    }
    let kl_term = 1.0 - metrics.kl_divergence.clamp(0.0, 1.0);
    let score = weights.accuracy * metrics.accuracy
        + weights.kl * kl_term
        + weights.coverage * metrics.coverage_probability;
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Run the simulation and score it against `truth`. Never fails.
pub fn evaluate_simulation(
    runner: &dyn SimulationRunner,
    params: &ParameterSet,
    truth: &GroundTruth,
    weights: &ObjectiveWeights,
) -> Evaluation {
    let outcome = catch_unwind(AssertUnwindSafe(|| runner.run(params)));
    let output = match outcome {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(error = %e, params = ?params, "Simulation returned an error; scoring 0");
            return failed(e.to_string());
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(panic = %message, params = ?params, "Simulation panicked; scoring 0");
            return failed(format!("simulation panicked: {message}"));
        }
    };

    let metrics = compute_accuracy_metrics(
        &output.predictions,
        &truth.values,
        output.confidence_intervals.as_ref(),
        output.regional.as_ref(),
        truth.regional.as_ref(),
    );
    let objective = weighted_objective(&metrics, weights);
    Evaluation {
        metrics,
        objective,
        error: None,
    }
}

fn failed(error: String) -> Evaluation {
    Evaluation {
        metrics: AccuracyMetrics::zero(),
        objective: 0.0,
        error: Some(error),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
