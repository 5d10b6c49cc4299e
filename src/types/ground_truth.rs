//! Ground-truth observations and simulation outputs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Category → value mapping (e.g. outcome shares).
pub type CategoryValues = BTreeMap<String, f64>;

/// Region → category → value.
pub type RegionalValues = BTreeMap<String, CategoryValues>;

/// Closed interval `[lower, upper]` around a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    pub fn width(&self) -> f64 {
        (self.upper - self.lower).abs()
    }
}

/// Where a ground-truth snapshot came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub collected_on: Option<NaiveDate>,
    #[serde(default)]
    pub sample_size: Option<usize>,
}

/// A dated snapshot in a ground-truth time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub date: NaiveDate,
    pub values: CategoryValues,
}

/// Real-world outcome distribution a simulation is calibrated against.
///
/// Read-only input for a calibration run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    /// Observed value per category (required)
    pub values: CategoryValues,

    /// Optional per-region breakdown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regional: Option<RegionalValues>,

    /// Optional dated history; only the snapshot in `values` is calibrated against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_series: Option<Vec<TimePoint>>,

    /// Optional observational uncertainty per category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_intervals: Option<BTreeMap<String, ConfidenceInterval>>,

    #[serde(default)]
    pub provenance: Provenance,
}

/// Failure to load ground truth from disk.
#[derive(Debug, Error)]
pub enum GroundTruthError {
    #[error("ground truth I/O error ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ground truth parse error ({}): {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("ground truth ({}) has no category values", path.display())]
    Empty { path: PathBuf },
}

impl GroundTruth {
    pub fn new(values: CategoryValues) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }

    /// Build from `(category, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn with_regional(mut self, regional: RegionalValues) -> Self {
        self.regional = Some(regional);
        self
    }

    pub fn with_confidence_intervals(mut self, intervals: BTreeMap<String, ConfidenceInterval>) -> Self {
        self.confidence_intervals = Some(intervals);
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Load a JSON ground-truth file.
    pub fn from_json_file(path: &Path) -> Result<Self, GroundTruthError> {
        let contents = std::fs::read_to_string(path).map_err(|source| GroundTruthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let truth: Self = serde_json::from_str(&contents).map_err(|source| GroundTruthError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if truth.values.is_empty() {
            return Err(GroundTruthError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(truth)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// What a simulation run returns for one parameter set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    /// Predicted value per category
    pub predictions: CategoryValues,

    /// Predicted uncertainty per category (drives coverage metrics)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_intervals: Option<BTreeMap<String, ConfidenceInterval>>,

    /// Predicted values per region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regional: Option<RegionalValues>,
}

impl SimulationOutput {
    pub fn with_confidence_intervals(mut self, intervals: BTreeMap<String, ConfidenceInterval>) -> Self {
        self.confidence_intervals = Some(intervals);
        self
    }

    pub fn with_regional(mut self, regional: RegionalValues) -> Self {
        self.regional = Some(regional);
        self
    }
}

impl From<CategoryValues> for SimulationOutput {
    fn from(predictions: CategoryValues) -> Self {
        Self {
            predictions,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_interval_contains() {
        let ci = ConfidenceInterval::new(0.2, 0.4);
        assert!(ci.contains(0.2));
        assert!(ci.contains(0.4));
        assert!(!ci.contains(0.41));
        assert!((ci.width() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "values": {{"yes": 0.55, "no": 0.45}},
                "regional": {{"north": {{"yes": 0.6, "no": 0.4}}}},
                "provenance": {{"source": "survey", "collected_on": "2024-03-01", "sample_size": 1200}}
            }}"#
        )
        .unwrap();

        let truth = GroundTruth::from_json_file(file.path()).unwrap();
        assert_eq!(truth.values.len(), 2);
        assert_eq!(truth.provenance.sample_size, Some(1200));
        assert_eq!(
            truth.provenance.collected_on,
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert!(truth.regional.is_some());
    }

    #[test]
    fn test_load_rejects_empty_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"values": {{}}}}"#).unwrap();
        assert!(matches!(
            GroundTruth::from_json_file(file.path()),
            Err(GroundTruthError::Empty { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = GroundTruth::from_json_file(Path::new("/nonexistent/truth.json")).unwrap_err();
        assert!(matches!(err, GroundTruthError::Io { .. }));
    }
}
