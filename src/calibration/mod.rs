//! Calibration Orchestration
//!
//! Turns a host simulation plus a ground-truth snapshot into a search problem
//! and runs it with the configured strategy.
//!
//! ## Architecture
//! - `objective`: `SimulationRunner` boundary and the weighted objective
//! - `strategies`: standard, ensemble, and adaptive compositions of optimizers
//! - `calibrator`: run lifecycle, history, baseline, progress, async wrapper
//! - `manager`: in-memory registry of named sessions with ranking

pub mod calibrator;
pub mod manager;
pub mod objective;
pub mod strategies;

pub use calibrator::{create_calibrator, Calibrator};
pub use manager::{CalibrationManager, SessionComparison, SessionRanking};
pub use objective::{weighted_objective, SimulationError, SimulationRunner};

use thiserror::Error;

use crate::config::ConfigError;
use crate::types::UnknownMethodError;

/// Failures surfaced to callers. Evaluation and numerical problems are
/// absorbed during a run and never appear here.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error(transparent)]
    UnknownMethod(#[from] UnknownMethodError),

    #[error("no parameter bounds configured")]
    NoParameters,

    #[error("parameter '{0}' is defined more than once")]
    DuplicateParameter(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("session '{0}' already exists")]
    DuplicateSession(String),

    #[error("unknown session '{0}'")]
    UnknownSession(String),

    #[error("calibration task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
