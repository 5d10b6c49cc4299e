//! System-wide default constants.
//!
//! Grouped by subsystem. Config structs reference these from their
//! `#[serde(default = ...)]` functions so the file format and the
//! programmatic defaults cannot drift apart.

// ============================================================================
// Config File Discovery
// ============================================================================

/// Environment variable holding an explicit config path.
pub const CONFIG_ENV_VAR: &str = "SIMCAL_CONFIG";

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "calibration.toml";

// ============================================================================
// Run Control
// ============================================================================

/// Accuracy a run must reach to count as successful.
pub const TARGET_ACCURACY: f64 = 0.80;

/// Total simulation evaluations per run.
pub const MAX_ITERATIONS: usize = 100;

/// Consecutive non-improving Bayesian proposals before stopping.
pub const PATIENCE: usize = 10;

/// A new best improving by less than this ends the Bayesian phase.
pub const CONVERGENCE_THRESHOLD: f64 = 1e-4;

/// Concurrent evaluations during grid search.
pub const N_PARALLEL_EVALUATIONS: usize = 4;

/// Share of the budget spent on random exploration in adaptive mode.
pub const ADAPTIVE_EXPLORATION_FRACTION: f64 = 0.25;

// ============================================================================
// Validation (carried, not enforced)
// ============================================================================

pub const VALIDATION_SPLIT: f64 = 0.2;

pub const CROSS_VALIDATION_FOLDS: usize = 5;

// ============================================================================
// Objective Weights
// ============================================================================

pub const WEIGHT_ACCURACY: f64 = 0.6;

/// Applied to `1 - min(kl, 1)`.
pub const WEIGHT_KL: f64 = 0.2;

pub const WEIGHT_COVERAGE: f64 = 0.2;

// ============================================================================
// Bayesian Optimizer
// ============================================================================

pub const BAYES_N_INITIAL: usize = 5;

pub const BAYES_N_CANDIDATES: usize = 1000;

/// RBF length-scale in unit-encoded parameter space.
pub const BAYES_LENGTH_SCALE: f64 = 0.2;

pub const BAYES_NOISE_VARIANCE: f64 = 1e-6;

/// Expected Improvement exploration margin ξ.
pub const BAYES_EXPLORATION: f64 = 0.01;
