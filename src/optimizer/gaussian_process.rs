//! Gaussian Process surrogate for Bayesian optimization.
//!
//! RBF kernel with one fixed length-scale per input dimension and unit signal
//! variance. Targets are standardized before fitting and predictions are
//! mapped back to the original scale. Larger targets are assumed better:
//! non-finite targets are replaced by the smallest finite one.
//!
//! If the covariance matrix cannot be factorized the model degrades to
//! predicting the training mean and standard deviation everywhere.

use tracing::debug;

/// Cholesky factor and `K⁻¹ y` for the standardized targets.
#[derive(Debug, Clone)]
struct Posterior {
    chol: Vec<Vec<f64>>,
    alpha: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct GaussianProcess {
    length_scales: Vec<f64>,
    noise_variance: f64,
    x_train: Vec<Vec<f64>>,
    y_mean: f64,
    y_std: f64,
    posterior: Option<Posterior>,
}

impl GaussianProcess {
    pub fn new(length_scales: Vec<f64>, noise_variance: f64) -> Self {
        Self {
            length_scales,
            noise_variance: noise_variance.max(0.0),
            x_train: Vec::new(),
            y_mean: 0.0,
            y_std: 1.0,
            posterior: None,
        }
    }

    /// Same length-scale on every dimension.
    pub fn isotropic(dimensions: usize, length_scale: f64, noise_variance: f64) -> Self {
        Self::new(vec![length_scale; dimensions], noise_variance)
    }

    pub fn n_observations(&self) -> usize {
        self.x_train.len()
    }

    /// True when the last fit fell back to mean/std predictions.
    pub fn is_degraded(&self) -> bool {
        !self.x_train.is_empty() && self.posterior.is_none()
    }

    /// Fit on unit-encoded inputs `x` and raw targets `y`.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) {
        let n = x.len().min(y.len());
        self.x_train = x[..n].to_vec();
        self.posterior = None;

        if n == 0 {
            self.y_mean = 0.0;
            self.y_std = 1.0;
            return;
        }

        let targets = sanitize_targets(&y[..n]);
        let mean = targets.iter().sum::<f64>() / n as f64;
        let variance = targets.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n as f64;
        let std = variance.sqrt();
        self.y_mean = mean;
        self.y_std = if std > 0.0 && std.is_finite() { std } else { 1.0 };

        let standardized: Vec<f64> = targets.iter().map(|t| (t - self.y_mean) / self.y_std).collect();

        let mut k = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..=i {
                let v = self.kernel(&self.x_train[i], &self.x_train[j]);
                k[i][j] = v;
                k[j][i] = v;
            }
            k[i][i] += self.noise_variance;
        }

        match cholesky(&k) {
            Some(chol) => {
                let z = forward_substitute(&chol, &standardized);
                let alpha = backward_substitute(&chol, &z);
                if alpha.iter().all(|a| a.is_finite()) {
                    self.posterior = Some(Posterior { chol, alpha });
                } else {
                    debug!(n, "GP solve produced non-finite weights; using mean/std fallback");
                }
            }
            None => {
                debug!(n, "GP covariance not positive definite; using mean/std fallback");
            }
        }
    }

    /// Posterior mean and standard deviation at `x`, in target units.
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let Some(post) = &self.posterior else {
            return (self.y_mean, self.y_std);
        };

        let k_star: Vec<f64> = self.x_train.iter().map(|xi| self.kernel(xi, x)).collect();
        let mu: f64 = k_star.iter().zip(&post.alpha).map(|(k, a)| k * a).sum();

        let v = forward_substitute(&post.chol, &k_star);
        let variance = (1.0 - v.iter().map(|vi| vi * vi).sum::<f64>()).max(0.0);

        let mean = self.y_mean + self.y_std * mu;
        let std = self.y_std * variance.sqrt();
        if mean.is_finite() && std.is_finite() {
            (mean, std)
        } else {
            (self.y_mean, self.y_std)
        }
    }

    fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        let sq: f64 = a
            .iter()
            .zip(b)
            .enumerate()
            .map(|(d, (ai, bi))| {
                let ls = self.length_scales.get(d).copied().unwrap_or(1.0).max(1e-12);
                ((ai - bi) / ls).powi(2)
            })
            .sum();
        (-0.5 * sq).exp()
    }
}

/// Replace non-finite targets by the worst finite target (0 if none).
fn sanitize_targets(y: &[f64]) -> Vec<f64> {
    let worst = y
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
        .unwrap_or(0.0);
    y.iter().map(|&v| if v.is_finite() { v } else { worst }).collect()
}

/// Lower-triangular factor `L` with `L Lᵀ = A`, or `None` if `A` is not
/// numerically positive definite.
fn cholesky(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let d = a[i][i] - sum;
                if !d.is_finite() || d <= 0.0 {
                    return None;
                }
                l[i][j] = d.sqrt();
            } else {
                l[i][j] = (a[i][j] - sum) / l[j][j];
            }
        }
    }
    Some(l)
}

/// Solve `L x = b`.
fn forward_substitute(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[i][j] * x[j]).sum();
        x[i] = (b[i] - sum) / l[i][i];
    }
    x
}

/// Solve `Lᵀ x = b`.
fn backward_substitute(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[j][i] * x[j]).sum();
        x[i] = (b[i] - sum) / l[i][i];
    }
    x
}
