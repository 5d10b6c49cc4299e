//! simcal: Simulation Calibration Engine
//!
//! Tunes the free parameters of an external simulation so that its predicted
//! outcome distribution matches observed ground truth.
//!
//! ## Architecture
//!
//! - **Types**: parameter domains, ground truth, metrics and result records
//! - **Metrics**: accuracy measures between prediction and truth, run tracking
//! - **Optimizer**: random, grid, and Bayesian (GP + Expected Improvement) search
//! - **Calibration**: objective construction, strategy orchestration, sessions
//! - **Config**: TOML configuration with unknown-key detection and validation

pub mod calibration;
pub mod config;
pub mod metrics;
pub mod optimizer;
pub mod types;

// Re-export configuration
pub use config::{CalibrationConfig, ConfigError};

// Re-export commonly used types
pub use types::{
    AccuracyMetrics, CalibrationMethod, CalibrationProgress, CalibrationResult, GroundTruth,
    OptimizationResult, OptimizerKind, ParameterBounds, ParameterSet, ParameterValue, SimulationOutput,
};

// Re-export calibration entry points
pub use calibration::{
    create_calibrator, CalibrationError, CalibrationManager, Calibrator, SimulationError, SimulationRunner,
};

// Re-export metrics
pub use metrics::{compute_accuracy_metrics, AccuracyTracker};

// Re-export optimizers
pub use optimizer::{build_optimizer, Objective, Optimizer, OptimizerSettings};
