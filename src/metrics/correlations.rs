//! Correlation Engine
//!
//! Pearson / Spearman correlation between predicted and observed category
//! values, with a two-tailed significance test from Student's t-distribution
//! (statrs).
//!
//! All functions degrade to 0 (or `None` for p-values) instead of failing:
//! fewer than 2 points or a zero-variance vector yields 0.

use statrs::distribution::{ContinuousCDF, StudentsT};
use std::cmp::Ordering;

/// Correlation helpers used by the accuracy metrics
pub struct CorrelationEngine;

impl CorrelationEngine {
    /// Pearson correlation coefficient
    ///
    /// Formula: r = Σ[(xi - x̄)(yi - ȳ)] / sqrt(Σ(xi - x̄)² × Σ(yi - ȳ)²)
    pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
        if x.len() < 2 || x.len() != y.len() {
            return 0.0;
        }
        let n = x.len() as f64;
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;

        let mut cov = 0.0;
        let mut var_x = 0.0;
        let mut var_y = 0.0;
        for (a, b) in x.iter().zip(y.iter()) {
            let dx = a - mean_x;
            let dy = b - mean_y;
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }

        let denominator = (var_x * var_y).sqrt();
        if denominator <= f64::EPSILON || !denominator.is_finite() {
            0.0
        } else {
            (cov / denominator).clamp(-1.0, 1.0)
        }
    }

    /// Spearman rank correlation: Pearson over average ranks.
    pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
        if x.len() < 2 || x.len() != y.len() {
            return 0.0;
        }
        Self::pearson(&Self::average_ranks(x), &Self::average_ranks(y))
    }

    /// Two-tailed p-value for a Pearson coefficient over `n` samples
    ///
    /// t = r × sqrt(n-2) / sqrt(1-r²), with n-2 degrees of freedom.
    /// Returns `None` below 3 samples.
    pub fn p_value_for_r(r: f64, n: usize) -> Option<f64> {
        if n < 3 || !r.is_finite() {
            return None;
        }

        // Perfect or near-perfect correlation is highly significant
        if r.abs() >= 0.9999 {
            return Some(0.0);
        }

        let df = (n - 2) as f64;
        let t_stat = r * df.sqrt() / (1.0 - r * r).sqrt();

        match StudentsT::new(0.0, 1.0, df) {
            Ok(t_dist) => Some((2.0 * (1.0 - t_dist.cdf(t_stat.abs()))).clamp(0.0, 1.0)),
            Err(_) => None,
        }
    }

    /// 1-based ranks with ties sharing their mean rank (ascending order).
    pub fn average_ranks(values: &[f64]) -> Vec<f64> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

        let mut ranks = vec![0.0; values.len()];
        let mut i = 0;
        while i < order.len() {
            let mut j = i;
            while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
                j += 1;
            }
            let mean_rank = (i + j) as f64 / 2.0 + 1.0;
            for &idx in &order[i..=j] {
                ranks[idx] = mean_rank;
            }
            i = j + 1;
        }
        ranks
    }

    /// 1-based ranks in descending order, ties broken by position.
    ///
    /// Uses a stable sort, so equal values keep their input order and the
    /// result is deterministic for a fixed input.
    pub fn descending_ranks(values: &[f64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[b].partial_cmp(&values[a]).unwrap_or(Ordering::Equal));

        let mut ranks = vec![0; values.len()];
        for (rank, idx) in order.into_iter().enumerate() {
            ranks[idx] = rank + 1;
        }
        ranks
    }
}
