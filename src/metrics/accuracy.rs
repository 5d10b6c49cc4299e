//! Accuracy metrics between a simulated prediction and ground truth.
//!
//! `compute_accuracy_metrics` never fails: keys missing from either side are
//! ignored, and when nothing overlaps the all-zero snapshot is returned with a
//! warning.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::types::{
    AccuracyMetrics, CategoryBreakdown, CategoryValues, ConfidenceInterval, RegionBreakdown,
    RegionalValues, ACCURACY_THRESHOLD,
};

use super::correlations::CorrelationEngine;

/// Numerical floor for probabilities and relative errors.
pub const EPSILON: f64 = 1e-10;

/// Predicted/actual vectors over the shared, finite keys (sorted by key).
struct Aligned<'a> {
    keys: Vec<&'a str>,
    predicted: Vec<f64>,
    actual: Vec<f64>,
}

fn align<'a>(predicted: &'a CategoryValues, truth: &'a CategoryValues) -> Aligned<'a> {
    let mut aligned = Aligned {
        keys: Vec::new(),
        predicted: Vec::new(),
        actual: Vec::new(),
    };
    for (key, &actual) in truth {
        let Some(&pred) = predicted.get(key) else {
            continue;
        };
        if !pred.is_finite() || !actual.is_finite() {
            debug!(category = %key, predicted = pred, actual, "Skipping non-finite category value");
            continue;
        }
        aligned.keys.push(key.as_str());
        aligned.predicted.push(pred);
        aligned.actual.push(actual);
    }
    aligned
}

/// Compute the full metrics snapshot.
///
/// * `confidence_intervals` - predicted interval per category; drives coverage
/// * `regional_predicted` / `regional_truth` - optional per-region breakdown
pub fn compute_accuracy_metrics(
    predicted: &CategoryValues,
    ground_truth: &CategoryValues,
    confidence_intervals: Option<&BTreeMap<String, ConfidenceInterval>>,
    regional_predicted: Option<&RegionalValues>,
    regional_truth: Option<&RegionalValues>,
) -> AccuracyMetrics {
    let aligned = align(predicted, ground_truth);
    if aligned.keys.is_empty() {
        warn!(
            predicted_categories = predicted.len(),
            truth_categories = ground_truth.len(),
            "No overlapping categories between prediction and ground truth; returning zero metrics"
        );
        return AccuracyMetrics::zero();
    }

    let p = &aligned.predicted;
    let a = &aligned.actual;
    let n = p.len();

    let mae = mean_absolute_error(p, a);
    let rmse = root_mean_squared_error(p, a);
    let rank_acc = rank_accuracy(p, a);
    let accuracy = composite_accuracy(mae, rank_acc);

    let (coverage_probability, mean_interval_width) = match confidence_intervals {
        Some(intervals) => coverage(&aligned, intervals),
        None => (0.0, 0.0),
    };

    let pearson = CorrelationEngine::pearson(p, a);

    let per_category = aligned
        .keys
        .iter()
        .zip(p.iter().zip(a.iter()))
        .map(|(key, (&pred, &actual))| {
            let absolute_error = (pred - actual).abs();
            let relative_error = (actual.abs() > EPSILON).then(|| absolute_error / actual.abs());
            (
                (*key).to_string(),
                CategoryBreakdown {
                    predicted: pred,
                    actual,
                    absolute_error,
                    relative_error,
                },
            )
        })
        .collect();

    let per_region = match (regional_predicted, regional_truth) {
        (Some(rp), Some(rt)) => Some(regional_breakdown(rp, rt)),
        _ => None,
    };

    AccuracyMetrics {
        n_categories: n,
        mae,
        rmse,
        mape: mean_absolute_percentage_error(p, a),
        kl_divergence: kl_divergence(a, p),
        brier_score: brier_score(p, a),
        log_loss: log_loss(p, a),
        pearson_correlation: pearson,
        pearson_p_value: CorrelationEngine::p_value_for_r(pearson, n),
        spearman_correlation: CorrelationEngine::spearman(p, a),
        coverage_probability,
        mean_interval_width,
        rank_accuracy: rank_acc,
        accuracy,
        is_above_threshold: accuracy >= ACCURACY_THRESHOLD,
        per_category,
        per_region,
    }
}

pub fn mean_absolute_error(predicted: &[f64], actual: &[f64]) -> f64 {
    if predicted.is_empty() {
        return 0.0;
    }
    predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / predicted.len() as f64
}

pub fn root_mean_squared_error(predicted: &[f64], actual: &[f64]) -> f64 {
    mean_squared_error(predicted, actual).sqrt()
}

fn mean_squared_error(predicted: &[f64], actual: &[f64]) -> f64 {
    if predicted.is_empty() {
        return 0.0;
    }
    predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).powi(2))
        .sum::<f64>()
        / predicted.len() as f64
}

/// MAPE in percent over entries whose actual value is non-zero.
pub fn mean_absolute_percentage_error(predicted: &[f64], actual: &[f64]) -> f64 {
    let terms: Vec<f64> = predicted
        .iter()
        .zip(actual)
        .filter(|(_, a)| a.abs() > EPSILON)
        .map(|(p, a)| ((p - a) / a).abs())
        .collect();
    if terms.is_empty() {
        0.0
    } else {
        terms.iter().sum::<f64>() / terms.len() as f64 * 100.0
    }
}

/// KL(p ‖ q) after renormalizing both to distributions and clipping to [ε, 1−ε].
pub fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    if p.is_empty() || p.len() != q.len() {
        return 0.0;
    }
    let p = to_distribution(p);
    let q = to_distribution(q);
    p.iter()
        .zip(q.iter())
        .map(|(&pi, &qi)| {
            let pi = pi.clamp(EPSILON, 1.0 - EPSILON);
            let qi = qi.clamp(EPSILON, 1.0 - EPSILON);
            pi * (pi / qi).ln()
        })
        .sum::<f64>()
        .max(0.0)
}

/// Renormalize to sum 1; non-positive totals become uniform.
fn to_distribution(values: &[f64]) -> Vec<f64> {
    let clipped: Vec<f64> = values.iter().map(|v| v.max(0.0)).collect();
    let total: f64 = clipped.iter().sum();
    if total <= EPSILON {
        let uniform = 1.0 / values.len() as f64;
        return vec![uniform; values.len()];
    }
    clipped.into_iter().map(|v| v / total).collect()
}

/// Mean squared error read as a probability score.
pub fn brier_score(predicted: &[f64], actual: &[f64]) -> f64 {
    mean_squared_error(predicted, actual)
}

/// Binary cross-entropy with clipped probabilities.
pub fn log_loss(predicted: &[f64], actual: &[f64]) -> f64 {
    if predicted.is_empty() {
        return 0.0;
    }
    let total: f64 = predicted
        .iter()
        .zip(actual)
        .map(|(&p, &a)| {
            let p = p.clamp(EPSILON, 1.0 - EPSILON);
            let a = a.clamp(0.0, 1.0);
            a * p.ln() + (1.0 - a) * (1.0 - p).ln()
        })
        .sum();
    -total / predicted.len() as f64
}

/// 1 − mean |rank(p) − rank(a)| / n with descending ranks.
pub fn rank_accuracy(predicted: &[f64], actual: &[f64]) -> f64 {
    let n = predicted.len();
    if n == 0 {
        return 0.0;
    }
    let rp = CorrelationEngine::descending_ranks(predicted);
    let ra = CorrelationEngine::descending_ranks(actual);
    let displacement = rp
        .iter()
        .zip(ra.iter())
        .map(|(&x, &y)| x.abs_diff(y) as f64)
        .sum::<f64>()
        / n as f64;
    (1.0 - displacement / n as f64).clamp(0.0, 1.0)
}

/// max(1 − min(MAE, 1), rank accuracy), clamped to [0, 1].
pub fn composite_accuracy(mae: f64, rank_accuracy: f64) -> f64 {
    let value_accuracy = 1.0 - mae.min(1.0);
    let accuracy = value_accuracy.max(rank_accuracy);
    if accuracy.is_nan() {
        0.0
    } else {
        accuracy.clamp(0.0, 1.0)
    }
}

/// (coverage probability, mean interval width) over keys that carry an interval.
fn coverage(aligned: &Aligned<'_>, intervals: &BTreeMap<String, ConfidenceInterval>) -> (f64, f64) {
    let mut covered = 0usize;
    let mut counted = 0usize;
    let mut width_sum = 0.0;
    for (key, &actual) in aligned.keys.iter().zip(aligned.actual.iter()) {
        let Some(ci) = intervals.get(*key) else {
            continue;
        };
        counted += 1;
        width_sum += ci.width();
        if ci.contains(actual) {
            covered += 1;
        }
    }
    if counted == 0 {
        (0.0, 0.0)
    } else {
        (covered as f64 / counted as f64, width_sum / counted as f64)
    }
}

fn regional_breakdown(
    predicted: &RegionalValues,
    truth: &RegionalValues,
) -> BTreeMap<String, RegionBreakdown> {
    truth
        .iter()
        .filter_map(|(region, truth_values)| {
            let region_pred = predicted.get(region)?;
            let aligned = align(region_pred, truth_values);
            if aligned.keys.is_empty() {
                return None;
            }
            let mae = mean_absolute_error(&aligned.predicted, &aligned.actual);
            let rank_acc = rank_accuracy(&aligned.predicted, &aligned.actual);
            Some((
                region.clone(),
                RegionBreakdown {
                    n_categories: aligned.keys.len(),
                    mae,
                    rmse: root_mean_squared_error(&aligned.predicted, &aligned.actual),
                    accuracy: composite_accuracy(mae, rank_acc),
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, f64)]) -> CategoryValues {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn test_identical_inputs_are_perfect() {
        let x = values(&[("a", 0.5), ("b", 0.3), ("c", 0.2)]);
        let m = compute_accuracy_metrics(&x, &x, None, None, None);
        assert_eq!(m.n_categories, 3);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert!(m.kl_divergence.abs() < 1e-12);
        assert_eq!(m.accuracy, 1.0);
        assert!(m.is_above_threshold);
        assert!((m.pearson_correlation - 1.0).abs() < 1e-9);
        assert_eq!(m.rank_accuracy, 1.0);
    }

    #[test]
    fn test_identical_uniform_inputs_are_perfect() {
        let x = values(&[("a", 0.5), ("b", 0.5)]);
        let m = compute_accuracy_metrics(&x, &x, None, None, None);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.pearson_correlation, 0.0, "zero variance has undefined correlation");
    }

    #[test]
    fn test_disjoint_keys_return_zero_metrics() {
        let p = values(&[("a", 0.5)]);
        let a = values(&[("b", 0.5)]);
        let m = compute_accuracy_metrics(&p, &a, None, None, None);
        assert_eq!(m, AccuracyMetrics::zero());
        assert!(!m.is_above_threshold);
    }

    #[test]
    fn test_empty_inputs_return_zero_metrics() {
        let empty = CategoryValues::new();
        let m = compute_accuracy_metrics(&empty, &empty, None, None, None);
        assert_eq!(m.accuracy, 0.0);
        assert!(m.is_empty());
    }

    #[test]
    fn test_partial_overlap_uses_intersection() {
        let p = values(&[("a", 0.6), ("b", 0.4), ("extra", 9.0)]);
        let a = values(&[("a", 0.5), ("b", 0.5), ("missing", 1.0)]);
        let m = compute_accuracy_metrics(&p, &a, None, None, None);
        assert_eq!(m.n_categories, 2);
        assert!((m.mae - 0.1).abs() < 1e-12);
        assert!((m.rmse - 0.1).abs() < 1e-12);
        assert!((m.brier_score - 0.01).abs() < 1e-12);
        assert!((m.mape - 20.0).abs() < 1e-9);
        assert!(m.per_category.contains_key("a"));
        assert!(!m.per_category.contains_key("extra"));
    }

    #[test]
    fn test_accuracy_bounds_and_threshold() {
        let p = values(&[("a", 5.0), ("b", -3.0)]);
        let a = values(&[("a", 0.1), ("b", 0.9)]);
        let m = compute_accuracy_metrics(&p, &a, None, None, None);
        assert!((0.0..=1.0).contains(&m.accuracy));
        assert_eq!(m.is_above_threshold, m.accuracy >= 0.80);
        // Two categories in reversed order: mean displacement 1 over n=2
        assert_eq!(m.rank_accuracy, 0.5);
        assert_eq!(m.accuracy, 0.5);
        assert!(!m.is_above_threshold);
    }

    #[test]
    fn test_rank_accuracy_rescues_biased_prediction() {
        // Every value is off by 2 but the ordering is exact.
        let p = values(&[("a", 2.5), ("b", 2.3), ("c", 2.2)]);
        let a = values(&[("a", 0.5), ("b", 0.3), ("c", 0.2)]);
        let m = compute_accuracy_metrics(&p, &a, None, None, None);
        assert!(m.mae > 1.0);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn test_kl_divergence_properties() {
        assert!(kl_divergence(&[0.5, 0.5], &[0.5, 0.5]).abs() < 1e-12);
        assert!(kl_divergence(&[0.9, 0.1], &[0.1, 0.9]) > 1.0);
        // Renormalization makes scale irrelevant
        let scaled = kl_divergence(&[9.0, 1.0], &[1.0, 9.0]);
        assert!((scaled - kl_divergence(&[0.9, 0.1], &[0.1, 0.9])).abs() < 1e-9);
        // Zero totals fall back to uniform instead of dividing by zero
        assert!(kl_divergence(&[0.0, 0.0], &[0.0, 0.0]).is_finite());
    }

    #[test]
    fn test_log_loss_clips_probabilities() {
        let loss = log_loss(&[0.0, 1.0], &[1.0, 0.0]);
        assert!(loss.is_finite());
        assert!(loss > 10.0);
        assert!(log_loss(&[0.9], &[1.0]) < log_loss(&[0.5], &[1.0]));
    }

    #[test]
    fn test_mape_skips_zero_actuals() {
        assert_eq!(mean_absolute_percentage_error(&[0.3], &[0.0]), 0.0);
        assert!((mean_absolute_percentage_error(&[0.3, 0.2], &[0.0, 0.1]) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_coverage_probability() {
        let p = values(&[("a", 0.5), ("b", 0.3), ("c", 0.2)]);
        let a = values(&[("a", 0.55), ("b", 0.1), ("c", 0.2)]);
        let intervals: BTreeMap<String, ConfidenceInterval> = [
            ("a".to_string(), ConfidenceInterval::new(0.4, 0.6)),
            ("b".to_string(), ConfidenceInterval::new(0.2, 0.4)),
        ]
        .into_iter()
        .collect();
        let m = compute_accuracy_metrics(&p, &a, Some(&intervals), None, None);
        assert!((m.coverage_probability - 0.5).abs() < 1e-12);
        assert!((m.mean_interval_width - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_regional_breakdown() {
        let p = values(&[("a", 0.5), ("b", 0.5)]);
        let regional_pred: RegionalValues = [
            ("north".to_string(), values(&[("a", 0.6), ("b", 0.4)])),
            ("south".to_string(), values(&[("a", 0.2)])),
        ]
        .into_iter()
        .collect();
        let regional_truth: RegionalValues = [
            ("north".to_string(), values(&[("a", 0.6), ("b", 0.4)])),
            ("east".to_string(), values(&[("a", 0.3)])),
        ]
        .into_iter()
        .collect();
        let m = compute_accuracy_metrics(&p, &p, None, Some(&regional_pred), Some(&regional_truth));
        let regions = m.per_region.unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions["north"].accuracy, 1.0);
        assert_eq!(regions["north"].n_categories, 2);
    }

    #[test]
    fn test_non_finite_values_are_skipped() {
        let p = values(&[("a", f64::NAN), ("b", 0.4)]);
        let a = values(&[("a", 0.5), ("b", 0.4)]);
        let m = compute_accuracy_metrics(&p, &a, None, None, None);
        assert_eq!(m.n_categories, 1);
        assert_eq!(m.mae, 0.0);
    }
}
