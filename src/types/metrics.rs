//! Accuracy snapshot types produced by the metrics module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fixed accuracy cut for `is_above_threshold`, independent of any run target.
pub const ACCURACY_THRESHOLD: f64 = 0.80;

/// Per-category comparison between prediction and ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub predicted: f64,
    pub actual: f64,
    pub absolute_error: f64,
    /// |error| / |actual|, `None` when the actual value is ~0
    pub relative_error: Option<f64>,
}

/// Reduced metrics for one region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBreakdown {
    pub n_categories: usize,
    pub mae: f64,
    pub rmse: f64,
    pub accuracy: f64,
}

/// Snapshot of how well one prediction matches ground truth.
///
/// Created once per evaluation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    /// Number of categories present in both prediction and truth
    pub n_categories: usize,
    pub mae: f64,
    pub rmse: f64,
    /// Mean absolute percentage error (percent), over non-zero actuals
    pub mape: f64,
    /// KL(truth ‖ predicted) after renormalization
    pub kl_divergence: f64,
    pub brier_score: f64,
    pub log_loss: f64,
    pub pearson_correlation: f64,
    /// Two-tailed p-value for the Pearson coefficient (n ≥ 3)
    pub pearson_p_value: Option<f64>,
    pub spearman_correlation: f64,
    /// Fraction of truth values inside their predicted interval
    pub coverage_probability: f64,
    pub mean_interval_width: f64,
    /// 1 − mean rank displacement / n
    pub rank_accuracy: f64,
    /// Composite accuracy in [0, 1]
    pub accuracy: f64,
    /// accuracy ≥ 0.80
    pub is_above_threshold: bool,
    #[serde(default)]
    pub per_category: BTreeMap<String, CategoryBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_region: Option<BTreeMap<String, RegionBreakdown>>,
}

impl AccuracyMetrics {
    /// All-zero snapshot used when there is nothing to compare.
    pub fn zero() -> Self {
        Self {
            n_categories: 0,
            mae: 0.0,
            rmse: 0.0,
            mape: 0.0,
            kl_divergence: 0.0,
            brier_score: 0.0,
            log_loss: 0.0,
            pearson_correlation: 0.0,
            pearson_p_value: None,
            spearman_correlation: 0.0,
            coverage_probability: 0.0,
            mean_interval_width: 0.0,
            rank_accuracy: 0.0,
            accuracy: 0.0,
            is_above_threshold: false,
            per_category: BTreeMap::new(),
            per_region: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.n_categories == 0
    }

    /// One-line human readable summary.
    pub fn summary(&self) -> String {
        format!(
            "accuracy={:.3} mae={:.4} rmse={:.4} kl={:.4} brier={:.4} pearson={:.3} spearman={:.3} coverage={:.2} (n={})",
            self.accuracy,
            self.mae,
            self.rmse,
            self.kl_divergence,
            self.brier_score,
            self.pearson_correlation,
            self.spearman_correlation,
            self.coverage_probability,
            self.n_categories
        )
    }
}

impl Default for AccuracyMetrics {
    fn default() -> Self {
        Self::zero()
    }
}
