//! Accuracy Metrics
//!
//! Deviation measures between a simulated prediction and ground truth, and
//! tracking of those measures across a calibration run.
//!
//! ## Architecture
//! - `accuracy`: `compute_accuracy_metrics` and the individual error measures
//! - `correlations`: Pearson / Spearman with p-value testing (statrs)
//! - `tracker`: rolling history, trend fitting, target checks

pub mod accuracy;
pub mod correlations;
pub mod tracker;

pub use accuracy::compute_accuracy_metrics;
pub use correlations::CorrelationEngine;
pub use tracker::{AccuracyTracker, AccuracyTrend};
