//! Tunable parameter domains: sampling, clipping, and unit-interval encoding.
//!
//! Every parameter the search can touch is described by a [`ParameterBounds`]
//! whose [`ParameterDomain`] is one of three kinds. Numeric kinds support
//! `normalize` / `denormalize` (linear or log-space); categorical bounds
//! reject those calls with [`BoundsError::NotNumeric`] and only offer the
//! index-based unit encoding the surrogate model uses.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A single parameter assignment.
///
/// Untagged on the wire: `3` is an integer, `3.5` a float, `"fast"` a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Category(String),
}

impl ParameterValue {
    /// Numeric view of the value (`None` for categories).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Category(_) => None,
        }
    }

    /// Category label (`None` for numeric values).
    pub fn as_category(&self) -> Option<&str> {
        match self {
            Self::Category(c) => Some(c.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.6}"),
            Self::Category(c) => write!(f, "{c}"),
        }
    }
}

/// Parameter name → value. Ordered so that encoding and logging are deterministic.
pub type ParameterSet = BTreeMap<String, ParameterValue>;

/// Invalid bound definitions or unsupported operations on a bound.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundsError {
    #[error("parameter '{name}': lower bound {lower} exceeds upper bound {upper}")]
    InvertedRange { name: String, lower: f64, upper: f64 },

    #[error("parameter '{name}': bounds must be finite")]
    NonFinite { name: String },

    #[error("parameter '{name}': log scale requires a strictly positive lower bound (got {lower})")]
    LogScaleNonPositive { name: String, lower: f64 },

    #[error("parameter '{name}': categorical parameter needs at least one category")]
    EmptyCategories { name: String },

    #[error("parameter '{name}': {kind} parameter requires '{field}'")]
    MissingField {
        name: String,
        kind: ValueKind,
        field: &'static str,
    },

    #[error("parameter '{0}' is categorical and has no numeric normalization")]
    NotNumeric(String),
}

/// The kind of value a parameter takes (flat config representation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Continuous,
    Integer,
    Categorical,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continuous => write!(f, "continuous"),
            Self::Integer => write!(f, "integer"),
            Self::Categorical => write!(f, "categorical"),
        }
    }
}

/// Domain of a single parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterDomain {
    Continuous { lower: f64, upper: f64, log_scale: bool },
    Integer { lower: i64, upper: i64, log_scale: bool },
    Categorical { categories: Vec<String> },
}

/// Validated, immutable definition of one tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterBoundsSpec", into = "ParameterBoundsSpec")]
pub struct ParameterBounds {
    name: String,
    domain: ParameterDomain,
}

impl ParameterBounds {
    /// Real-valued parameter on `[lower, upper]`.
    pub fn continuous(name: impl Into<String>, lower: f64, upper: f64) -> Result<Self, BoundsError> {
        Self::continuous_with_scale(name, lower, upper, false)
    }

    /// Real-valued parameter searched in log space.
    pub fn log_continuous(name: impl Into<String>, lower: f64, upper: f64) -> Result<Self, BoundsError> {
        Self::continuous_with_scale(name, lower, upper, true)
    }

    fn continuous_with_scale(
        name: impl Into<String>,
        lower: f64,
        upper: f64,
        log_scale: bool,
    ) -> Result<Self, BoundsError> {
        let name = name.into();
        check_numeric_range(&name, lower, upper, log_scale)?;
        Ok(Self {
            name,
            domain: ParameterDomain::Continuous { lower, upper, log_scale },
        })
    }

    /// Integer parameter on `[lower, upper]` (inclusive).
    pub fn integer(name: impl Into<String>, lower: i64, upper: i64) -> Result<Self, BoundsError> {
        Self::integer_with_scale(name, lower, upper, false)
    }

    /// Integer parameter searched in log space.
    pub fn log_integer(name: impl Into<String>, lower: i64, upper: i64) -> Result<Self, BoundsError> {
        Self::integer_with_scale(name, lower, upper, true)
    }

    fn integer_with_scale(
        name: impl Into<String>,
        lower: i64,
        upper: i64,
        log_scale: bool,
    ) -> Result<Self, BoundsError> {
        let name = name.into();
        check_numeric_range(&name, lower as f64, upper as f64, log_scale)?;
        Ok(Self {
            name,
            domain: ParameterDomain::Integer { lower, upper, log_scale },
        })
    }

    /// Parameter drawn from a fixed list of labels.
    pub fn categorical<I, S>(name: impl Into<String>, categories: I) -> Result<Self, BoundsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let categories: Vec<String> = categories.into_iter().map(Into::into).collect();
        if categories.is_empty() {
            return Err(BoundsError::EmptyCategories { name });
        }
        Ok(Self {
            name,
            domain: ParameterDomain::Categorical { categories },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &ParameterDomain {
        &self.domain
    }

    pub fn kind(&self) -> ValueKind {
        match self.domain {
            ParameterDomain::Continuous { .. } => ValueKind::Continuous,
            ParameterDomain::Integer { .. } => ValueKind::Integer,
            ParameterDomain::Categorical { .. } => ValueKind::Categorical,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self.domain, ParameterDomain::Categorical { .. })
    }

    /// Draw a value uniformly from the domain (uniform in ln-space for log scale).
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match &self.domain {
            ParameterDomain::Continuous { lower, upper, log_scale } => {
                ParameterValue::Float(sample_real(rng, *lower, *upper, *log_scale))
            }
            ParameterDomain::Integer { lower, upper, log_scale } => {
                if *log_scale {
                    let raw = sample_real(rng, *lower as f64, *upper as f64, true);
                    ParameterValue::Int((raw.round() as i64).clamp(*lower, *upper))
                } else {
                    ParameterValue::Int(rng.gen_range(*lower..=*upper))
                }
            }
            ParameterDomain::Categorical { categories } => {
                let idx = rng.gen_range(0..categories.len());
                ParameterValue::Category(categories[idx].clone())
            }
        }
    }

    /// Project a value back into the domain.
    ///
    /// Integers are rounded, unknown categories map to the first category.
    pub fn clip(&self, value: &ParameterValue) -> ParameterValue {
        match &self.domain {
            ParameterDomain::Continuous { lower, upper, .. } => {
                let v = value.as_f64().unwrap_or(*lower);
                let v = if v.is_nan() { *lower } else { v };
                ParameterValue::Float(v.clamp(*lower, *upper))
            }
            ParameterDomain::Integer { lower, upper, .. } => {
                let v = value.as_f64().unwrap_or(*lower as f64);
                let v = if v.is_nan() { *lower as f64 } else { v };
                ParameterValue::Int((v.round().clamp(*lower as f64, *upper as f64)) as i64)
            }
            ParameterDomain::Categorical { categories } => match value {
                ParameterValue::Category(c) if categories.contains(c) => value.clone(),
                _ => ParameterValue::Category(categories[0].clone()),
            },
        }
    }

    /// Map a numeric value into `[0, 1]`.
    pub fn normalize(&self, value: f64) -> Result<f64, BoundsError> {
        let (lower, upper, log_scale) = self.numeric_range()?;
        if upper <= lower {
            return Ok(0.0);
        }
        let clamped = value.clamp(lower, upper);
        let u = if log_scale {
            (clamped.ln() - lower.ln()) / (upper.ln() - lower.ln())
        } else {
            (clamped - lower) / (upper - lower)
        };
        Ok(u.clamp(0.0, 1.0))
    }

    /// Map `u ∈ [0, 1]` back to a domain value (rounded for integers).
    pub fn denormalize(&self, u: f64) -> Result<f64, BoundsError> {
        let (lower, upper, log_scale) = self.numeric_range()?;
        let u = if u.is_nan() { 0.0 } else { u.clamp(0.0, 1.0) };
        let raw = if log_scale {
            (lower.ln() + u * (upper.ln() - lower.ln())).exp()
        } else {
            lower + u * (upper - lower)
        };
        let value = match self.domain {
            ParameterDomain::Integer { .. } => raw.round(),
            _ => raw,
        };
        Ok(value.clamp(lower, upper))
    }

    /// Total unit encoding used by the surrogate model.
    ///
    /// Categorical index `i` of `n` maps to the bucket centre `(i + 0.5) / n`.
    pub fn to_unit(&self, value: &ParameterValue) -> f64 {
        match &self.domain {
            ParameterDomain::Categorical { categories } => {
                let idx = value
                    .as_category()
                    .and_then(|c| categories.iter().position(|x| x == c))
                    .unwrap_or(0);
                (idx as f64 + 0.5) / categories.len() as f64
            }
            _ => value
                .as_f64()
                .and_then(|v| self.normalize(v).ok())
                .unwrap_or(0.0),
        }
    }

    /// Inverse of [`to_unit`](Self::to_unit).
    pub fn from_unit(&self, u: f64) -> ParameterValue {
        let u = if u.is_nan() { 0.0 } else { u.clamp(0.0, 1.0) };
        match &self.domain {
            ParameterDomain::Continuous { lower, .. } => {
                ParameterValue::Float(self.denormalize(u).unwrap_or(*lower))
            }
            ParameterDomain::Integer { lower, .. } => {
                ParameterValue::Int(self.denormalize(u).map_or(*lower, |v| v as i64))
            }
            ParameterDomain::Categorical { categories } => {
                let n = categories.len();
                let idx = ((u * n as f64).floor() as usize).min(n - 1);
                ParameterValue::Category(categories[idx].clone())
            }
        }
    }

    /// Evenly spaced candidate values for grid search.
    ///
    /// Log-scale bounds are spaced geometrically; integer grids are rounded and
    /// deduplicated; categorical grids are the literal category list.
    pub fn grid_values(&self, points: usize) -> Vec<ParameterValue> {
        let points = points.max(1);
        match &self.domain {
            ParameterDomain::Categorical { categories } => categories
                .iter()
                .cloned()
                .map(ParameterValue::Category)
                .collect(),
            ParameterDomain::Continuous { lower, .. } => unit_steps(points)
                .map(|u| ParameterValue::Float(self.denormalize(u).unwrap_or(*lower)))
                .collect(),
            ParameterDomain::Integer { lower, .. } => {
                let mut values: Vec<i64> = unit_steps(points)
                    .map(|u| self.denormalize(u).map_or(*lower, |v| v as i64))
                    .collect();
                values.dedup();
                values.into_iter().map(ParameterValue::Int).collect()
            }
        }
    }

    fn numeric_range(&self) -> Result<(f64, f64, bool), BoundsError> {
        match self.domain {
            ParameterDomain::Continuous { lower, upper, log_scale } => Ok((lower, upper, log_scale)),
            ParameterDomain::Integer { lower, upper, log_scale } => {
                Ok((lower as f64, upper as f64, log_scale))
            }
            ParameterDomain::Categorical { .. } => Err(BoundsError::NotNumeric(self.name.clone())),
        }
    }
}

fn check_numeric_range(name: &str, lower: f64, upper: f64, log_scale: bool) -> Result<(), BoundsError> {
    if !lower.is_finite() || !upper.is_finite() {
        return Err(BoundsError::NonFinite { name: name.to_string() });
    }
    if lower > upper {
        return Err(BoundsError::InvertedRange {
            name: name.to_string(),
            lower,
            upper,
        });
    }
    if log_scale && lower <= 0.0 {
        return Err(BoundsError::LogScaleNonPositive {
            name: name.to_string(),
            lower,
        });
    }
    Ok(())
}

fn sample_real<R: Rng + ?Sized>(rng: &mut R, lower: f64, upper: f64, log_scale: bool) -> f64 {
    if upper <= lower {
        return lower;
    }
    if log_scale {
        rng.gen_range(lower.ln()..=upper.ln()).exp().clamp(lower, upper)
    } else {
        rng.gen_range(lower..=upper)
    }
}

fn unit_steps(points: usize) -> impl Iterator<Item = f64> {
    (0..points).map(move |i| {
        if points == 1 {
            0.5
        } else {
            i as f64 / (points - 1) as f64
        }
    })
}

// ============================================================================
// Flat serde representation (config files)
// ============================================================================

/// Flat, config-file shaped description of a bound, validated on conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterBoundsSpec {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
    #[serde(default)]
    pub log_scale: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

fn default_kind() -> ValueKind {
    ValueKind::Continuous
}

impl TryFrom<ParameterBoundsSpec> for ParameterBounds {
    type Error = BoundsError;

    fn try_from(spec: ParameterBoundsSpec) -> Result<Self, Self::Error> {
        let require = |v: Option<f64>, field: &'static str| {
            v.ok_or_else(|| BoundsError::MissingField {
                name: spec.name.clone(),
                kind: spec.kind,
                field,
            })
        };
        match spec.kind {
            ValueKind::Continuous => {
                let lower = require(spec.lower, "lower")?;
                let upper = require(spec.upper, "upper")?;
                Self::continuous_with_scale(spec.name, lower, upper, spec.log_scale)
            }
            ValueKind::Integer => {
                let lower = require(spec.lower, "lower")?;
                let upper = require(spec.upper, "upper")?;
                if !lower.is_finite() || !upper.is_finite() {
                    return Err(BoundsError::NonFinite { name: spec.name });
                }
                // Fractional integer bounds shrink inward to the nearest integers.
                Self::integer_with_scale(
                    spec.name,
                    lower.ceil() as i64,
                    upper.floor() as i64,
                    spec.log_scale,
                )
            }
            ValueKind::Categorical => Self::categorical(spec.name, spec.categories),
        }
    }
}

impl From<ParameterBounds> for ParameterBoundsSpec {
    fn from(bounds: ParameterBounds) -> Self {
        let kind = bounds.kind();
        match bounds.domain {
            ParameterDomain::Continuous { lower, upper, log_scale } => Self {
                name: bounds.name,
                kind,
                lower: Some(lower),
                upper: Some(upper),
                log_scale,
                categories: Vec::new(),
            },
            ParameterDomain::Integer { lower, upper, log_scale } => Self {
                name: bounds.name,
                kind,
                lower: Some(lower as f64),
                upper: Some(upper as f64),
                log_scale,
                categories: Vec::new(),
            },
            ParameterDomain::Categorical { categories } => Self {
                name: bounds.name,
                kind,
                lower: None,
                upper: None,
                log_scale: false,
                categories,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_invalid_bounds_rejected() {
        assert!(matches!(
            ParameterBounds::continuous("x", 5.0, 1.0),
            Err(BoundsError::InvertedRange { .. })
        ));
        assert!(matches!(
            ParameterBounds::log_continuous("x", 0.0, 1.0),
            Err(BoundsError::LogScaleNonPositive { .. })
        ));
        assert!(matches!(
            ParameterBounds::continuous("x", f64::NAN, 1.0),
            Err(BoundsError::NonFinite { .. })
        ));
        assert!(matches!(
            ParameterBounds::categorical("c", Vec::<String>::new()),
            Err(BoundsError::EmptyCategories { .. })
        ));
    }

    #[test]
    fn test_normalize_roundtrip_continuous() {
        let b = ParameterBounds::continuous("x", -2.0, 8.0).unwrap();
        for v in [-2.0, -1.3, 0.0, 3.7, 8.0] {
            let back = b.denormalize(b.normalize(v).unwrap()).unwrap();
            assert!((back - v).abs() < 1e-9, "{v} -> {back}");
        }
    }

    #[test]
    fn test_normalize_roundtrip_log_scale() {
        let b = ParameterBounds::log_continuous("lr", 1e-4, 1.0).unwrap();
        assert!((b.normalize(1e-2).unwrap() - 0.5).abs() < 1e-9);
        for v in [1e-4, 3e-3, 0.5, 1.0] {
            let back = b.denormalize(b.normalize(v).unwrap()).unwrap();
            assert!((back - v).abs() / v < 1e-9);
        }
    }

    #[test]
    fn test_normalize_roundtrip_integer_exact() {
        let b = ParameterBounds::integer("n", 1, 17).unwrap();
        for v in 1..=17 {
            let back = b.denormalize(b.normalize(v as f64).unwrap()).unwrap();
            assert_eq!(back, v as f64);
        }
        let lb = ParameterBounds::log_integer("m", 1, 1000).unwrap();
        for v in [1, 10, 99, 1000] {
            assert_eq!(lb.denormalize(lb.normalize(v as f64).unwrap()).unwrap(), v as f64);
        }
    }

    #[test]
    fn test_categorical_normalize_is_signaled() {
        let b = ParameterBounds::categorical("mode", ["a", "b"]).unwrap();
        assert_eq!(b.normalize(0.3), Err(BoundsError::NotNumeric("mode".into())));
        assert!(b.denormalize(0.3).is_err());
    }

    #[test]
    fn test_unit_encoding_categorical_roundtrip() {
        let b = ParameterBounds::categorical("mode", ["slow", "medium", "fast"]).unwrap();
        for c in ["slow", "medium", "fast"] {
            let v = ParameterValue::Category(c.to_string());
            assert_eq!(b.from_unit(b.to_unit(&v)), v);
        }
        assert_eq!(b.from_unit(1.0), ParameterValue::Category("fast".into()));
    }

    #[test]
    fn test_clip() {
        let b = ParameterBounds::continuous("x", 0.0, 10.0).unwrap();
        assert_eq!(b.clip(&ParameterValue::Float(12.0)), ParameterValue::Float(10.0));
        assert_eq!(b.clip(&ParameterValue::Float(-1.0)), ParameterValue::Float(0.0));

        let i = ParameterBounds::integer("n", 0, 5).unwrap();
        assert_eq!(i.clip(&ParameterValue::Float(2.6)), ParameterValue::Int(3));
        assert_eq!(i.clip(&ParameterValue::Int(9)), ParameterValue::Int(5));

        let c = ParameterBounds::categorical("c", ["a", "b"]).unwrap();
        assert_eq!(c.clip(&ParameterValue::Category("z".into())), ParameterValue::Category("a".into()));
    }

    #[test]
    fn test_sample_uniform_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let x = ParameterBounds::log_continuous("x", 0.01, 100.0).unwrap();
        let n = ParameterBounds::integer("n", -3, 3).unwrap();
        let c = ParameterBounds::categorical("c", ["a", "b", "c"]).unwrap();
        for _ in 0..500 {
            let xv = x.sample_uniform(&mut rng).as_f64().unwrap();
            assert!((0.01..=100.0).contains(&xv));
            match n.sample_uniform(&mut rng) {
                ParameterValue::Int(v) => assert!((-3..=3).contains(&v)),
                other => panic!("expected Int, got {other:?}"),
            }
            let cv = c.sample_uniform(&mut rng);
            assert!(["a", "b", "c"].contains(&cv.as_category().unwrap()));
        }
    }

    #[test]
    fn test_grid_values() {
        let x = ParameterBounds::continuous("x", 0.0, 1.0).unwrap();
        let g = x.grid_values(5);
        assert_eq!(g.len(), 5);
        assert_eq!(g[0], ParameterValue::Float(0.0));
        assert_eq!(g[4], ParameterValue::Float(1.0));

        // 0..=2 with 5 points rounds to duplicates which are removed
        let n = ParameterBounds::integer("n", 0, 2).unwrap();
        assert_eq!(
            n.grid_values(5),
            vec![ParameterValue::Int(0), ParameterValue::Int(1), ParameterValue::Int(2)]
        );

        let c = ParameterBounds::categorical("c", ["a", "b"]).unwrap();
        assert_eq!(c.grid_values(10).len(), 2);
    }

    #[test]
    fn test_spec_roundtrip_via_toml() {
        let toml_str = r#"
name = "rate"
kind = "continuous"
lower = 0.001
upper = 10.0
log_scale = true
"#;
        let b: ParameterBounds = toml::from_str(toml_str).unwrap();
        assert_eq!(b.name(), "rate");
        assert_eq!(b.kind(), ValueKind::Continuous);

        let bad = r#"
name = "rate"
kind = "continuous"
lower = 5.0
upper = 1.0
"#;
        assert!(toml::from_str::<ParameterBounds>(bad).is_err());

        let missing = r#"
name = "mode"
kind = "categorical"
"#;
        assert!(toml::from_str::<ParameterBounds>(missing).is_err());
    }

    #[test]
    fn test_parameter_value_untagged_json() {
        let set: ParameterSet = serde_json::from_str(r#"{"a": 3, "b": 2.5, "c": "fast"}"#).unwrap();
        assert_eq!(set["a"], ParameterValue::Int(3));
        assert_eq!(set["b"], ParameterValue::Float(2.5));
        assert_eq!(set["c"], ParameterValue::Category("fast".into()));
    }
}
