//! simcal - Simulation Calibration Engine
//!
//! Calibrates a built-in multinomial choice model against observed mode
//! shares and reports the best parameters found.
//!
//! # Usage
//!
//! ```bash
//! # Calibrate against a synthetic truth drawn from hidden parameters
//! cargo run --release -- --method adaptive --seed 42
//!
//! # Calibrate against observed shares and keep the full result
//! ./simcal --ground-truth observed.json --output result.json
//! ```
//!
//! # Environment Variables
//!
//! - `SIMCAL_CONFIG`: Path to the calibration TOML (default: ./calibration.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use simcal::calibration::{create_calibrator, SimulationError};
use simcal::types::{
    CalibrationMethod, CalibrationResult, CategoryValues, GroundTruth, ParameterBounds, ParameterSet, ParameterValue,
    Provenance, SimulationOutput,
};
use simcal::CalibrationConfig;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simcal")]
#[command(about = "Calibrate simulation parameters against ground-truth distributions")]
#[command(version)]
struct CliArgs {
    /// Calibration config (TOML). Falls back to $SIMCAL_CONFIG, then ./calibration.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Observed outcome shares (JSON). Without it a synthetic truth is generated
    #[arg(long, value_name = "PATH")]
    ground_truth: Option<PathBuf>,

    /// Override the search method (bayesian, grid, random, ensemble, adaptive)
    #[arg(long)]
    method: Option<CalibrationMethod>,

    /// Override the evaluation budget
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Seed for the search and the synthetic truth
    #[arg(long, env = "SIMCAL_SEED")]
    seed: Option<u64>,

    /// Write the full calibration result as JSON
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Synthetic choice model
// ============================================================================

/// Travel modes with (cost, time) attributes.
const MODES: [(&str, f64, f64); 4] = [
    ("car", 6.0, 0.4),
    ("transit", 2.5, 0.9),
    ("bike", 0.3, 1.2),
    ("walk", 0.0, 2.0),
];

/// Parameters the synthetic truth is generated from.
const HIDDEN: [(&str, f64); 3] = [("cost_sensitivity", 0.35), ("time_sensitivity", 1.6), ("car_preference", 0.5)];

/// Spread of the observation noise added to the synthetic shares.
const TRUTH_NOISE_STD: f64 = 0.01;

fn default_bounds() -> Result<Vec<ParameterBounds>> {
    Ok(vec![
        ParameterBounds::continuous("cost_sensitivity", 0.0, 1.0)?,
        ParameterBounds::log_continuous("time_sensitivity", 0.1, 5.0)?,
        ParameterBounds::continuous("car_preference", -2.0, 2.0)?,
    ])
}

/// Multinomial logit: `share_k = exp(u_k) / Σ exp(u_j)`.
fn choice_model(params: &ParameterSet) -> Result<SimulationOutput, SimulationError> {
    let get = |name: &str, fallback: f64| params.get(name).and_then(ParameterValue::as_f64).unwrap_or(fallback);
    let beta_cost = get("cost_sensitivity", 0.5);
    let beta_time = get("time_sensitivity", 1.0);
    let car_bias = get("car_preference", 0.0);

    let utilities: Vec<f64> = MODES
        .iter()
        .map(|(mode, cost, time)| {
            let bias = if *mode == "car" { car_bias } else { 0.0 };
            bias - beta_cost * cost - beta_time * time
        })
        .collect();
    let max_u = utilities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = utilities.iter().map(|u| (u - max_u).exp()).collect();
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(SimulationError::new("degenerate utilities"));
    }

    let shares: CategoryValues = MODES
        .iter()
        .zip(&weights)
        .map(|((mode, _, _), w)| ((*mode).to_string(), w / total))
        .collect();
    Ok(SimulationOutput::from(shares))
}

/// Run the model at the hidden parameters and perturb the shares.
fn synthetic_truth(seed: Option<u64>) -> Result<GroundTruth> {
    let hidden: ParameterSet = HIDDEN
        .iter()
        .map(|(name, value)| ((*name).to_string(), ParameterValue::Float(*value)))
        .collect();
    let clean = choice_model(&hidden).context("synthetic model failed at hidden parameters")?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let noise = Normal::new(0.0, TRUTH_NOISE_STD)?;
    let noisy: Vec<(String, f64)> = clean
        .predictions
        .into_iter()
        .map(|(mode, share)| (mode, (share + noise.sample(&mut rng)).max(1e-6)))
        .collect();
    let total: f64 = noisy.iter().map(|(_, v)| v).sum();

    info!(hidden = ?HIDDEN, "Generated synthetic ground truth");
    Ok(
        GroundTruth::from_pairs(noisy.into_iter().map(|(k, v)| (k, v / total))).with_provenance(Provenance {
            source: "synthetic".to_string(),
            collected_on: Some(chrono::Utc::now().date_naive()),
            sample_size: None,
        }),
    )
}

fn print_summary(result: &CalibrationResult) {
    println!("method:        {}", result.method);
    println!("success:       {}", result.success);
    println!("evaluations:   {}", result.n_iterations);
    println!("elapsed:       {:.2}s", result.elapsed_seconds);
    println!("best score:    {:.4}", result.best_score);
    println!("best metrics:  {}", result.best_metrics.summary());
    println!("best parameters:");
    for (name, value) in &result.best_params {
        println!("  {name} = {value}");
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let default_level = if args.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => CalibrationConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CalibrationConfig::load(),
    };
    if let Some(method) = args.method {
        config.method = method;
    }
    if let Some(budget) = args.max_iterations {
        config.max_iterations = budget;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if config.parameter_bounds.is_empty() {
        config.parameter_bounds = default_bounds()?;
    }

    let ground_truth = match &args.ground_truth {
        Some(path) => GroundTruth::from_json_file(path)
            .with_context(|| format!("loading ground truth from {}", path.display()))?,
        None => synthetic_truth(config.seed)?,
    };

    let calibrator = Arc::new(create_calibrator(config, choice_model).context("building calibrator")?);
    let result = calibrator.calibrate_async(ground_truth, None).await.context("calibration run")?;

    print_summary(&result);

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&result).context("serializing result")?;
        std::fs::write(path, json).with_context(|| format!("writing result to {}", path.display()))?;
        info!(path = %path.display(), "Result written");
    }

    Ok(())
}
