//! Rolling accuracy history with trend and target analysis.

use serde::{Deserialize, Serialize};

use crate::types::AccuracyMetrics;

/// Window used by [`AccuracyTracker::is_improving`].
pub const IMPROVING_WINDOW: usize = 5;

/// Window used for the progress trend.
pub const DEFAULT_TREND_WINDOW: usize = 10;

/// Linear trend over the most recent accuracy values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyTrend {
    /// Number of points in the window
    pub n_points: usize,
    /// Least-squares slope (accuracy per evaluation)
    pub slope: f64,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub latest: f64,
    /// target − latest, floored at 0
    pub target_gap: f64,
}

/// Append-only metrics history with a cached best-so-far index.
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    target: f64,
    history: Vec<AccuracyMetrics>,
    best_index: Option<usize>,
}

impl AccuracyTracker {
    pub fn new(target: f64) -> Self {
        Self {
            target,
            history: Vec::new(),
            best_index: None,
        }
    }

    /// Record one evaluation.
    pub fn add(&mut self, metrics: AccuracyMetrics) {
        let improves = match self.best_index {
            None => true,
            Some(i) => metrics.accuracy > self.history[i].accuracy,
        };
        self.history.push(metrics);
        if improves {
            self.best_index = Some(self.history.len() - 1);
        }
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn history(&self) -> &[AccuracyMetrics] {
        &self.history
    }

    pub fn latest(&self) -> Option<&AccuracyMetrics> {
        self.history.last()
    }

    pub fn best(&self) -> Option<&AccuracyMetrics> {
        self.best_index.map(|i| &self.history[i])
    }

    pub fn best_accuracy(&self) -> f64 {
        self.best().map_or(0.0, |m| m.accuracy)
    }

    pub fn mean_accuracy(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().map(|m| m.accuracy).sum::<f64>() / self.history.len() as f64
    }

    /// Fit a first-order trend over the last `window` accuracy values.
    pub fn get_trend(&self, window: usize) -> Option<AccuracyTrend> {
        let window = window.max(1);
        let start = self.history.len().saturating_sub(window);
        let values: Vec<f64> = self.history[start..].iter().map(|m| m.accuracy).collect();
        let latest = *values.last()?;

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(AccuracyTrend {
            n_points: values.len(),
            slope: linear_slope(&values),
            mean,
            std: variance.sqrt(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            latest,
            target_gap: (self.target - latest).max(0.0),
        })
    }

    /// Positive accuracy slope over the last few evaluations.
    pub fn is_improving(&self) -> bool {
        self.get_trend(IMPROVING_WINDOW)
            .is_some_and(|t| t.slope > 0.0)
    }

    /// Latest accuracy reached the target.
    pub fn meets_target(&self) -> bool {
        self.latest().is_some_and(|m| m.accuracy >= self.target)
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.best_index = None;
    }
}

/// Least-squares slope of `values` against their index (0 for < 2 points).
fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n_f;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
