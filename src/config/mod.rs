//! Calibration Configuration Module
//!
//! Run settings loaded from TOML, with every field defaulted.
//!
//! ## Loading Order
//!
//! 1. `SIMCAL_CONFIG` environment variable (path to TOML file)
//! 2. `calibration.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! ## Usage
//!
//! ```ignore
//! let config = CalibrationConfig::load();
//! let calibrator = create_calibrator(config, runner)?;
//! ```

mod calibration_config;
pub mod defaults;
pub mod validation;

pub use calibration_config::*;
