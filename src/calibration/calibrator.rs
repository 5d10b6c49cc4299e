//! Calibration run lifecycle.
//!
//! A [`Calibrator`] owns a validated configuration and a host simulation. Each
//! `calibrate` call resets the run state, optionally scores a baseline, lets
//! the configured strategy drive the objective, and then derives the answer
//! from its own evaluation history, which spans every optimizer a composite
//! strategy ran.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::CalibrationConfig;
use crate::metrics::tracker::DEFAULT_TREND_WINDOW;
use crate::metrics::AccuracyTracker;
use crate::optimizer::ObjectiveError;
use crate::types::{
    AccuracyMetrics, CalibrationMethod, CalibrationProgress, CalibrationResult, CalibrationTrial,
    GroundTruth, Improvement, OptimizationResult, ParameterBounds, ParameterSet, RunPhase,
};

use super::objective::{evaluate_simulation, SimulationRunner};
use super::strategies;
use super::CalibrationError;

/// Mutable per-run state, shared with grid workers through the mutex.
#[derive(Debug)]
struct RunState {
    phase: RunPhase,
    history: Vec<CalibrationTrial>,
    tracker: AccuracyTracker,
    baseline: Option<AccuracyMetrics>,
}

pub struct Calibrator {
    config: CalibrationConfig,
    runner: Arc<dyn SimulationRunner>,
    state: Mutex<RunState>,
}

/// Validate `config` and build a calibrator around `runner`.
pub fn create_calibrator<R>(config: CalibrationConfig, runner: R) -> Result<Calibrator, CalibrationError>
where
    R: SimulationRunner + 'static,
{
    Calibrator::new(config, Arc::new(runner))
}

impl Calibrator {
    pub fn new(config: CalibrationConfig, runner: Arc<dyn SimulationRunner>) -> Result<Self, CalibrationError> {
        if config.parameter_bounds.is_empty() {
            return Err(CalibrationError::NoParameters);
        }
        let mut seen = HashSet::new();
        for bound in &config.parameter_bounds {
            if !seen.insert(bound.name()) {
                return Err(CalibrationError::DuplicateParameter(bound.name().to_string()));
            }
        }
        config.validate()?;

        let state = RunState {
            phase: RunPhase::Configured,
            history: Vec::new(),
            tracker: AccuracyTracker::new(config.target_accuracy),
            baseline: None,
        };
        Ok(Self {
            config,
            runner,
            state: Mutex::new(state),
        })
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn bounds(&self) -> &[ParameterBounds] {
        &self.config.parameter_bounds
    }

    pub fn phase(&self) -> RunPhase {
        self.lock().phase
    }

    /// Evaluations recorded by the current (or last) run.
    pub fn history(&self) -> Vec<CalibrationTrial> {
        self.lock().history.clone()
    }

    /// Score one parameter set without touching the run state.
    pub fn evaluate(&self, params: &ParameterSet, ground_truth: &GroundTruth) -> AccuracyMetrics {
        evaluate_simulation(
            self.runner.as_ref(),
            params,
            ground_truth,
            &self.config.objective_weights,
        )
        .metrics
    }

    /// Run a full calibration against `ground_truth`.
    ///
    /// `initial`, when given, is scored once as the baseline; that evaluation
    /// does not count against `max_iterations` and is not part of the history.
    pub fn calibrate(&self, ground_truth: &GroundTruth, initial: Option<&ParameterSet>) -> CalibrationResult {
        let started = Instant::now();
        {
            let mut state = self.lock();
            state.phase = RunPhase::Configured;
            state.history.clear();
            state.tracker.reset();
            state.baseline = None;
        }

        let method = self.config.method;
        let budget = self.config.max_iterations;
        info!(
            %method,
            budget,
            n_parameters = self.bounds().len(),
            target = self.config.target_accuracy,
            "Calibration starting"
        );
        if let Some(timeout) = self.config.timeout_seconds {
            info!(timeout_seconds = timeout, "timeout_seconds is advisory and will not be enforced");
        }

        if let Some(params) = initial {
            let baseline = self.evaluate(params, ground_truth);
            info!(accuracy = baseline.accuracy, "Baseline evaluated");
            let mut state = self.lock();
            state.baseline = Some(baseline);
            state.phase = RunPhase::BaselineEvaluated;
        }

        self.lock().phase = RunPhase::Running;

        let objective =
            |params: &ParameterSet| -> Result<f64, ObjectiveError> { self.record_evaluation(params, ground_truth, started) };
        let settings = self.config.optimizer_settings();
        let bounds = self.bounds();

        let outcome: OptimizationResult = match method.optimizer_kind() {
            Some(kind) => strategies::run_standard(kind, bounds, budget, &settings, &objective),
            None if method == CalibrationMethod::Ensemble => {
                strategies::run_ensemble(bounds, budget, &settings, &objective)
            }
            None => strategies::run_adaptive(
                bounds,
                budget,
                &settings,
                &objective,
                self.config.target_accuracy,
                &|| self.lock().tracker.best_accuracy(),
            ),
        };
        if let Some(reason) = outcome.convergence_reason {
            debug!(%reason, "Search stopped before spending its budget");
        }

        let mut state = self.lock();
        state.phase = RunPhase::Done;

        let best = best_trial(&state.history);
        let (best_params, best_score, best_metrics) = match best {
            Some(trial) => (trial.params.clone(), trial.objective, trial.metrics.clone()),
            None => (
                initial.cloned().unwrap_or_default(),
                0.0,
                AccuracyMetrics::zero(),
            ),
        };
        let improvement = Improvement::between(state.baseline.as_ref(), &best_metrics);
        let success = best_metrics.accuracy >= self.config.target_accuracy;
        let elapsed_seconds = started.elapsed().as_secs_f64();

        info!(
            %method,
            success,
            best_accuracy = best_metrics.accuracy,
            best_score,
            n_iterations = state.history.len(),
            elapsed_seconds,
            "Calibration finished"
        );

        CalibrationResult {
            success,
            best_params,
            best_score,
            best_metrics,
            baseline_metrics: state.baseline.clone(),
            improvement,
            n_iterations: state.history.len(),
            elapsed_seconds,
            method,
            history: state.history.clone(),
            validation_metrics: None,
        }
    }

    /// Calibrate on `train`, then score the best parameters on `validation`.
    pub fn calibrate_with_validation(
        &self,
        train: &GroundTruth,
        validation: &GroundTruth,
        initial: Option<&ParameterSet>,
    ) -> CalibrationResult {
        let mut result = self.calibrate(train, initial);
        let validation_metrics = self.evaluate(&result.best_params, validation);
        info!(
            train_accuracy = result.best_metrics.accuracy,
            validation_accuracy = validation_metrics.accuracy,
            "Held-out validation scored"
        );
        result.validation_metrics = Some(validation_metrics);
        result
    }

    /// Run [`calibrate`](Self::calibrate) on tokio's blocking pool.
    ///
    /// Dropping the returned future does not stop the run; it continues to
    /// completion in the background.
    pub async fn calibrate_async(
        self: Arc<Self>,
        ground_truth: GroundTruth,
        initial: Option<ParameterSet>,
    ) -> Result<CalibrationResult, CalibrationError> {
        let result = tokio::task::spawn_blocking(move || self.calibrate(&ground_truth, initial.as_ref())).await?;
        Ok(result)
    }

    /// Snapshot of the current run.
    pub fn get_progress(&self) -> CalibrationProgress {
        let state = self.lock();
        let tracker = &state.tracker;
        let trend = tracker.get_trend(DEFAULT_TREND_WINDOW);
        CalibrationProgress {
            phase: state.phase,
            n_evaluations: state.history.len(),
            current_accuracy: tracker.latest().map_or(0.0, |m| m.accuracy),
            best_accuracy: tracker.best_accuracy(),
            mean_accuracy: tracker.mean_accuracy(),
            trend: trend.map_or(0.0, |t| t.slope),
            improving: tracker.is_improving(),
            meets_target: tracker.meets_target(),
            target_gap: trend.map_or(tracker.target(), |t| t.target_gap),
        }
    }

    /// Score one point into the run history (a failed simulation is recorded
    /// with objective 0) and report failures to the optimizer as errors.
    fn record_evaluation(
        &self,
        params: &ParameterSet,
        truth: &GroundTruth,
        started: Instant,
    ) -> Result<f64, ObjectiveError> {
        let eval = evaluate_simulation(self.runner.as_ref(), params, truth, &self.config.objective_weights);
        let outcome = match &eval.error {
            Some(e) => Err(ObjectiveError::new(e.clone())),
            None => Ok(eval.objective),
        };
        let mut state = self.lock();
        state.tracker.add(eval.metrics.clone());
        state.history.push(CalibrationTrial {
            params: params.clone(),
            metrics: eval.metrics,
            objective: eval.objective,
            error: eval.error,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        });
        debug!(
            evaluation = state.history.len(),
            objective = eval.objective,
            "Simulation evaluated"
        );
        outcome
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        // Runner panics are caught outside the lock; poisoned state is intact.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// First trial with the maximum objective.
fn best_trial(history: &[CalibrationTrial]) -> Option<&CalibrationTrial> {
    let mut best: Option<&CalibrationTrial> = None;
    for trial in history {
        if best.map_or(true, |b| trial.objective > b.objective) {
            best = Some(trial);
        }
    }
    best
}
