//! Shared data structures for the calibration engine
//!
//! - `parameters`: tunable parameter domains and parameter sets
//! - `ground_truth`: observed outcome distributions and simulation outputs
//! - `metrics`: accuracy snapshot produced per evaluation
//! - `results`: optimizer trials, calibration results, progress

mod parameters;
mod ground_truth;
mod metrics;
mod results;

pub use parameters::*;
pub use ground_truth::*;
pub use metrics::*;
pub use results::*;
