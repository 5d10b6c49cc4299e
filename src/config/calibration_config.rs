//! Calibration Configuration - every run knob as a TOML value
//!
//! Each struct implements `Default` through the same functions serde uses for
//! missing keys, so an empty file and no file behave identically.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::optimizer::{BayesianSettings, GridSettings, OptimizerSettings};
use crate::types::{CalibrationMethod, ParameterBounds};

// ============================================================================
// Top-level Config
// ============================================================================

/// Complete calibration configuration, loaded from `calibration.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Search strategy
    #[serde(default)]
    pub method: CalibrationMethod,

    /// Accuracy a run must reach to count as successful
    #[serde(default = "default_target_accuracy")]
    pub target_accuracy: f64,

    /// Simulation evaluations per run (baseline excluded)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Bayesian early stop after this many non-improving proposals
    #[serde(default = "default_patience")]
    pub patience: usize,

    /// Bayesian early stop when a new best gains less than this
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,

    /// Concurrent evaluations during grid search
    #[serde(default = "default_n_parallel_evaluations")]
    pub n_parallel_evaluations: usize,

    /// Wall-clock hint in seconds; logged, never enforced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,

    /// RNG seed; unset draws from entropy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default)]
    pub validation: ValidationSettings,

    #[serde(default)]
    pub objective_weights: ObjectiveWeights,

    #[serde(default)]
    pub bayesian: BayesianSettings,

    #[serde(default)]
    pub grid: GridSettings,

    /// Tunable parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter_bounds: Vec<ParameterBounds>,
}

fn default_target_accuracy() -> f64 {
    defaults::TARGET_ACCURACY
}
fn default_max_iterations() -> usize {
    defaults::MAX_ITERATIONS
}
fn default_patience() -> usize {
    defaults::PATIENCE
}
fn default_convergence_threshold() -> f64 {
    defaults::CONVERGENCE_THRESHOLD
}
fn default_n_parallel_evaluations() -> usize {
    defaults::N_PARALLEL_EVALUATIONS
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            method: CalibrationMethod::default(),
            target_accuracy: default_target_accuracy(),
            max_iterations: default_max_iterations(),
            patience: default_patience(),
            convergence_threshold: default_convergence_threshold(),
            n_parallel_evaluations: default_n_parallel_evaluations(),
            timeout_seconds: None,
            seed: None,
            validation: ValidationSettings::default(),
            objective_weights: ObjectiveWeights::default(),
            bayesian: BayesianSettings::default(),
            grid: GridSettings::default(),
            parameter_bounds: Vec::new(),
        }
    }
}

impl CalibrationConfig {
    /// Load configuration using the standard search order:
    /// 1. `$SIMCAL_CONFIG` environment variable
    /// 2. `./calibration.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), method = %config.method, "Loaded calibration config from SIMCAL_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from SIMCAL_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "SIMCAL_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(method = %config.method, "Loaded calibration config from ./calibration.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./calibration.toml, using defaults");
                }
            }
        }

        info!("No calibration.toml found; using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::ParseStr(inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys are warned about, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self = toml::from_str(contents).map_err(ConfigError::ParseStr)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Calibration config saved");
        Ok(())
    }

    /// Knobs handed to the optimizer factory.
    pub fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings {
            seed: self.seed,
            patience: self.patience,
            convergence_threshold: self.convergence_threshold,
            n_workers: self.n_parallel_evaluations,
            bayesian: self.bayesian.clone(),
            grid: self.grid.clone(),
        }
    }

    /// Check every value, reporting all violations at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        check_unit_interval(self.target_accuracy, "target_accuracy", &mut errors);
        if self.max_iterations == 0 {
            errors.push("max_iterations must be > 0".to_string());
        }
        if self.patience == 0 {
            errors.push("patience must be > 0".to_string());
        }
        check_non_negative(self.convergence_threshold, "convergence_threshold", &mut errors);
        if self.n_parallel_evaluations == 0 {
            errors.push("n_parallel_evaluations must be > 0".to_string());
        }
        if let Some(t) = self.timeout_seconds {
            if !t.is_finite() || t <= 0.0 {
                errors.push(format!("timeout_seconds must be a positive number (got {t})"));
            }
        }

        // Validation settings are carried for the host and gate nothing here
        let v = &self.validation;
        if !v.validation_split.is_finite() || !(0.0..1.0).contains(&v.validation_split) {
            warn!(
                validation_split = v.validation_split,
                "validation.validation_split is outside [0, 1); carried through unchanged"
            );
        }
        if v.cross_validation_folds < 2 {
            warn!(
                cross_validation_folds = v.cross_validation_folds,
                "validation.cross_validation_folds is below 2; carried through unchanged"
            );
        }

        // Objective weights
        let w = &self.objective_weights;
        check_non_negative(w.accuracy, "objective_weights.accuracy", &mut errors);
        check_non_negative(w.kl, "objective_weights.kl", &mut errors);
        check_non_negative(w.coverage, "objective_weights.coverage", &mut errors);
        if w.accuracy + w.kl + w.coverage <= 0.0 {
            errors.push("objective_weights must not all be zero".to_string());
        }

        // Bayesian
        let b = &self.bayesian;
        if b.n_candidates == 0 {
            errors.push("bayesian.n_candidates must be > 0".to_string());
        }
        if !b.length_scale.is_finite() || b.length_scale <= 0.0 {
            errors.push(format!("bayesian.length_scale must be > 0 (got {})", b.length_scale));
        }
        check_non_negative(b.noise_variance, "bayesian.noise_variance", &mut errors);
        check_non_negative(b.exploration, "bayesian.exploration", &mut errors);

        if self.grid.points_per_dimension == Some(0) {
            errors.push("grid.points_per_dimension must be > 0".to_string());
        }

        let mut seen = HashSet::new();
        for bound in &self.parameter_bounds {
            if !seen.insert(bound.name()) {
                errors.push(format!("parameter_bounds: duplicate parameter '{}'", bound.name()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

fn check_unit_interval(value: f64, name: &str, errors: &mut Vec<String>) {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        errors.push(format!("{name} must be in [0, 1] (got {value})"));
    }
}

fn check_non_negative(value: f64, name: &str, errors: &mut Vec<String>) {
    // NaN fails every comparison, so test finiteness first
    if !value.is_finite() || value < 0.0 {
        errors.push(format!("{name} must be a finite number >= 0 (got {value})"));
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("config parse error: {0}")]
    ParseStr(#[source] toml::de::Error),

    #[error("config serialization error: {0}")]
    Serialize(#[source] toml::ser::Error),

    #[error("config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Validation Settings
// ============================================================================

/// Held-out validation knobs. Accepted and round-tripped; no run behavior
/// depends on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSettings {
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,

    #[serde(default = "default_cross_validation_folds")]
    pub cross_validation_folds: usize,

    #[serde(default)]
    pub use_cross_validation: bool,
}

fn default_validation_split() -> f64 {
    defaults::VALIDATION_SPLIT
}
fn default_cross_validation_folds() -> usize {
    defaults::CROSS_VALIDATION_FOLDS
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            validation_split: default_validation_split(),
            cross_validation_folds: default_cross_validation_folds(),
            use_cross_validation: false,
        }
    }
}

// ============================================================================
// Objective Weights
// ============================================================================

/// Weights of the calibration objective
/// `accuracy·w_a + (1 − min(kl, 1))·w_kl + coverage·w_c`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    #[serde(default = "default_weight_accuracy")]
    pub accuracy: f64,

    #[serde(default = "default_weight_kl")]
    pub kl: f64,

    #[serde(default = "default_weight_coverage")]
    pub coverage: f64,
}

fn default_weight_accuracy() -> f64 {
    defaults::WEIGHT_ACCURACY
}
fn default_weight_kl() -> f64 {
    defaults::WEIGHT_KL
}
fn default_weight_coverage() -> f64 {
    defaults::WEIGHT_COVERAGE
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            accuracy: default_weight_accuracy(),
            kl: default_weight_kl(),
            coverage: default_weight_coverage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueKind;

    #[test]
    fn test_default_config_validates() {
        let config = CalibrationConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: CalibrationConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config, CalibrationConfig::default());
        assert_eq!(config.method, CalibrationMethod::Bayesian);
        assert_eq!(config.target_accuracy, 0.80);
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.bayesian.n_candidates, 1000);
        assert_eq!(config.objective_weights.accuracy, 0.6);
        assert!(config.grid.points_per_dimension.is_none());
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
method = "ensemble"
max_iterations = 30
seed = 7

[bayesian]
n_initial = 8

[[parameter_bounds]]
name = "price_sensitivity"
lower = 0.1
upper = 5.0

[[parameter_bounds]]
name = "segment"
kind = "categorical"
categories = ["urban", "rural"]
"#;
        let config = CalibrationConfig::from_toml_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.method, CalibrationMethod::Ensemble);
        assert_eq!(config.max_iterations, 30);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.bayesian.n_initial, 8);
        // Non-overridden values retain defaults
        assert_eq!(config.bayesian.length_scale, 0.2);
        assert_eq!(config.patience, 10);
        assert_eq!(config.parameter_bounds.len(), 2);
        assert_eq!(config.parameter_bounds[1].kind(), ValueKind::Categorical);
    }

    #[test]
    fn test_validation_reports_every_problem() {
        let config = CalibrationConfig {
            target_accuracy: 1.5,
            max_iterations: 0,
            convergence_threshold: f64::NAN,
            objective_weights: ObjectiveWeights {
                accuracy: -0.1,
                ..ObjectiveWeights::default()
            },
            ..CalibrationConfig::default()
        };
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 4, "{errors:?}");
                assert!(errors.iter().any(|e| e.contains("target_accuracy")));
                assert!(errors.iter().any(|e| e.contains("max_iterations")));
                assert!(errors.iter().any(|e| e.contains("convergence_threshold")));
                assert!(errors.iter().any(|e| e.contains("objective_weights.accuracy")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_settings_are_not_enforced() {
        let config = CalibrationConfig {
            validation: ValidationSettings {
                validation_split: 1.5,
                cross_validation_folds: 1,
                use_cross_validation: true,
            },
            ..CalibrationConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_duplicate_bounds() {
        let config = CalibrationConfig {
            parameter_bounds: vec![
                ParameterBounds::continuous("x", 0.0, 1.0).unwrap(),
                ParameterBounds::continuous("x", 0.0, 2.0).unwrap(),
            ],
            ..CalibrationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_method_is_parse_error() {
        let result = CalibrationConfig::from_toml_str("method = \"annealing\"");
        assert!(matches!(result, Err(ConfigError::ParseStr(_))));
    }

    #[test]
    fn test_roundtrip_toml() {
        let original = CalibrationConfig {
            method: CalibrationMethod::Adaptive,
            seed: Some(99),
            timeout_seconds: Some(120.0),
            grid: GridSettings {
                points_per_dimension: Some(6),
            },
            parameter_bounds: vec![
                ParameterBounds::log_continuous("rate", 1e-3, 10.0).unwrap(),
                ParameterBounds::integer("agents", 10, 500).unwrap(),
                ParameterBounds::categorical("mode", ["a", "b"]).unwrap(),
            ],
            ..CalibrationConfig::default()
        };
        let toml_str = original.to_toml().expect("serialization should work");
        let roundtripped: CalibrationConfig =
            toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(original, roundtripped);
    }

    #[test]
    fn test_all_sections_serialize() {
        let toml_str = CalibrationConfig::default().to_toml().expect("serialization should work");
        assert!(toml_str.contains("[validation]"), "Missing [validation] section");
        assert!(toml_str.contains("[objective_weights]"), "Missing [objective_weights] section");
        assert!(toml_str.contains("[bayesian]"), "Missing [bayesian] section");
        assert!(toml_str.contains("target_accuracy"), "Missing target_accuracy field");
    }

    #[test]
    fn test_optimizer_settings_mirror_config() {
        let config = CalibrationConfig {
            seed: Some(3),
            patience: 4,
            n_parallel_evaluations: 2,
            ..CalibrationConfig::default()
        };
        let settings = config.optimizer_settings();
        assert_eq!(settings.seed, Some(3));
        assert_eq!(settings.patience, 4);
        assert_eq!(settings.n_workers, 2);
        assert_eq!(settings.bayesian, config.bayesian);
    }
}
