use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::ValuationError;
use crate::monte_carlo::distributions::DistributionSpec;
use crate::types::{with_metadata_f64, ComputationOutput};
use crate::valuation::drivers::{evaluate, Driver, ValuationDrivers};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A driver to simulate and the distribution it is drawn from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationVariable {
    pub driver: Driver,
    pub distribution: DistributionSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of trials (minimum 1).
    #[serde(default = "default_runs")]
    pub runs: u32,
    /// Optional seed for reproducibility.
    #[serde(default)]
    pub seed: Option<u64>,
    pub variables: Vec<SimulationVariable>,
    /// EV thresholds for P(EV > threshold). Empty means base EV.
    #[serde(default)]
    pub ev_thresholds: Vec<f64>,
}

fn default_runs() -> u32 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationInput {
    pub base: ValuationDrivers,
    pub config: SimulationConfig,
}

/// Percentile summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionSummary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Percentiles,
}

/// A single histogram bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

/// Probability that EV exceeds a given threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdProbability {
    pub threshold: f64,
    pub probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub requested_runs: u32,
    pub completed_runs: u32,
    pub cancelled: bool,
    /// Seed actually used (drawn from entropy when none was given)
    pub seed: u64,
    pub base_enterprise_value: f64,
    pub enterprise_value: DistributionSummary,
    pub equity_value: DistributionSummary,
    pub prob_equity_positive: f64,
    pub prob_ev_above: Vec<ThresholdProbability>,
    /// 20-bin histogram of enterprise value
    pub histogram: Vec<HistogramBin>,
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Polled once before each trial; once it reports true no further trials
/// are issued.
pub trait CancelSignal: Sync {
    fn is_cancelled(&self) -> bool;
}

impl CancelSignal for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Trials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct TrialOutcome {
    enterprise_value: f64,
    equity_value: f64,
    /// Bit i set when the i-th variable was clamped
    clamped: u8,
}

/// One trial: draw every variable from its own sub-seeded stream, clamp to
/// physical bounds, value the drivers.
fn run_trial(
    base: &ValuationDrivers,
    variables: &[SimulationVariable],
    sub_seed: u64,
) -> EngineResult<TrialOutcome> {
    let mut rng = StdRng::seed_from_u64(sub_seed);
    let mut drivers = base.clone();
    let mut clamped = 0u8;

    for (i, var) in variables.iter().enumerate() {
        let raw = var.distribution.sample(&mut rng);
        let (lo, hi) = var.driver.simulation_bounds();
        let value = raw.clamp(lo, hi);
        if value != raw {
            clamped |= 1 << i;
        }
        let value = Decimal::from_f64(value).ok_or_else(|| {
            ValuationError::invalid(var.driver.name(), format!("Draw {value} is not finite"))
        })?;
        drivers = drivers.with_driver(var.driver, value);
    }

    let r = evaluate(&drivers)?;
    Ok(TrialOutcome {
        enterprise_value: r.enterprise_value.to_f64().unwrap_or_default(),
        equity_value: r.equity_value.to_f64().unwrap_or_default(),
        clamped,
    })
}

#[cfg(feature = "parallel")]
fn run_trials<C: CancelSignal + ?Sized>(
    base: &ValuationDrivers,
    variables: &[SimulationVariable],
    sub_seeds: &[u64],
    cancel: &C,
) -> EngineResult<Vec<TrialOutcome>> {
    let outcomes: Vec<Option<EngineResult<TrialOutcome>>> = sub_seeds
        .par_iter()
        .map(|seed| {
            if cancel.is_cancelled() {
                None
            } else {
                Some(run_trial(base, variables, *seed))
            }
        })
        .collect();
    outcomes.into_iter().flatten().collect()
}

#[cfg(not(feature = "parallel"))]
fn run_trials<C: CancelSignal + ?Sized>(
    base: &ValuationDrivers,
    variables: &[SimulationVariable],
    sub_seeds: &[u64],
    cancel: &C,
) -> EngineResult<Vec<TrialOutcome>> {
    let mut outcomes = Vec::with_capacity(sub_seeds.len());
    for seed in sub_seeds {
        if cancel.is_cancelled() {
            break;
        }
        outcomes.push(run_trial(base, variables, *seed)?);
    }
    Ok(outcomes)
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Percentile of a **sorted**, non-empty slice using linear interpolation
/// at rank p/100 * (n - 1).
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Build a histogram with `num_bins` equal-width bins.
fn build_histogram(sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    let min_val = sorted[0];
    let max_val = sorted[sorted.len() - 1];

    if (max_val - min_val).abs() < f64::EPSILON {
        return vec![HistogramBin {
            lower: min_val,
            upper: max_val,
            count: sorted.len() as u32,
            frequency: 1.0,
        }];
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let n = sorted.len() as f64;

    let mut bins: Vec<HistogramBin> = (0..num_bins)
        .map(|i| HistogramBin {
            lower: min_val + i as f64 * bin_width,
            upper: if i == num_bins - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * bin_width
            },
            count: 0,
            frequency: 0.0,
        })
        .collect();

    for &val in sorted {
        let idx = (((val - min_val) / bin_width).floor() as usize).min(num_bins - 1);
        bins[idx].count += 1;
    }
    for bin in &mut bins {
        bin.frequency = bin.count as f64 / n;
    }
    bins
}

/// Summary of a sorted, non-empty slice.
fn summarize(sorted: &[f64]) -> DistributionSummary {
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    DistributionSummary {
        mean,
        median: percentile_sorted(sorted, 50.0),
        std_dev: variance.sqrt(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        percentiles: Percentiles {
            p5: percentile_sorted(sorted, 5.0),
            p10: percentile_sorted(sorted, 10.0),
            p25: percentile_sorted(sorted, 25.0),
            p50: percentile_sorted(sorted, 50.0),
            p75: percentile_sorted(sorted, 75.0),
            p90: percentile_sorted(sorted, 90.0),
            p95: percentile_sorted(sorted, 95.0),
        },
    }
}

fn sort_f64(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the EPV Monte Carlo simulation to completion.
pub fn run_simulation(input: &SimulationInput) -> EngineResult<ComputationOutput<SimulationSummary>> {
    run_simulation_with_cancel(input, &AtomicBool::new(false))
}

/// Run the EPV Monte Carlo simulation, stopping early once `cancel` fires.
///
/// Every configured driver is drawn independently per trial and clamped to
/// its physical bounds; the drivers are valued with the same function as the
/// base EPV. Per-trial seeds are drawn up front from a single master stream,
/// so a seeded run gives identical results sequentially or in parallel.
/// A cancelled run still reports a valid summary over the completed trials.
pub fn run_simulation_with_cancel<C: CancelSignal + ?Sized>(
    input: &SimulationInput,
    cancel: &C,
) -> EngineResult<ComputationOutput<SimulationSummary>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let config = &input.config;

    let variables = validate_simulation_config(config)?;
    let base_ev = evaluate(&input.base)?.enterprise_value;
    let base_enterprise_value = base_ev.to_f64().unwrap_or_default();

    if config.runs < 1_000 {
        warnings.push(format!(
            "Only {} runs requested; percentiles will be noisy",
            config.runs
        ));
    }

    let seed = match config.seed {
        Some(s) => s,
        None => StdRng::from_entropy().gen(),
    };
    let mut master = StdRng::seed_from_u64(seed);
    let sub_seeds: Vec<u64> = (0..config.runs).map(|_| master.gen()).collect();

    let outcomes = run_trials(&input.base, &variables, &sub_seeds, cancel)?;

    if outcomes.is_empty() {
        return Err(ValuationError::InsufficientData(
            "Simulation cancelled before any trial completed".into(),
        ));
    }

    let completed = outcomes.len() as u32;
    let cancelled = completed < config.runs;
    if cancelled {
        warnings.push(format!(
            "Simulation cancelled: {completed} of {} runs completed",
            config.runs
        ));
    }

    for (i, var) in variables.iter().enumerate() {
        let hits = outcomes.iter().filter(|o| o.clamped & (1 << i) != 0).count();
        let share = hits as f64 / completed as f64;
        if share > 0.05 {
            let (lo, hi) = var.driver.simulation_bounds();
            warnings.push(format!(
                "{}: {:.1}% of draws clamped to [{lo}, {hi}]",
                var.driver,
                share * 100.0
            ));
        }
    }

    let mut ev: Vec<f64> = outcomes.iter().map(|o| o.enterprise_value).collect();
    let mut equity: Vec<f64> = outcomes.iter().map(|o| o.equity_value).collect();
    sort_f64(&mut ev);
    sort_f64(&mut equity);

    let n = completed as f64;
    let prob_equity_positive = equity.iter().filter(|&&v| v > 0.0).count() as f64 / n;

    let thresholds = if config.ev_thresholds.is_empty() {
        vec![base_enterprise_value]
    } else {
        config.ev_thresholds.clone()
    };
    let prob_ev_above = thresholds
        .into_iter()
        .map(|threshold| ThresholdProbability {
            threshold,
            probability: ev.iter().filter(|&&v| v > threshold).count() as f64 / n,
        })
        .collect();

    let output = SimulationSummary {
        requested_runs: config.runs,
        completed_runs: completed,
        cancelled,
        seed,
        base_enterprise_value,
        enterprise_value: summarize(&ev),
        equity_value: summarize(&equity),
        prob_equity_positive,
        prob_ev_above,
        histogram: build_histogram(&ev, 20),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Monte Carlo EPV Simulation",
        &serde_json::json!({
            "runs": config.runs,
            "seed": seed,
            "variables": variables.iter().map(|v| v.driver.name()).collect::<Vec<_>>(),
            "parallel": cfg!(feature = "parallel"),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate the configuration and return the variables in application order.
pub(crate) fn validate_simulation_config(
    config: &SimulationConfig,
) -> EngineResult<Vec<SimulationVariable>> {
    if config.runs < 1 {
        return Err(ValuationError::invalid("simulation.runs", "Must be at least 1"));
    }
    if config.variables.is_empty() {
        return Err(ValuationError::InsufficientData(
            "At least one simulated driver is required".into(),
        ));
    }

    let mut variables = config.variables.clone();
    variables.sort_by_key(|v| v.driver);
    for pair in variables.windows(2) {
        if pair[0].driver == pair[1].driver {
            return Err(ValuationError::invalid(
                format!("simulation.variables.{}", pair[0].driver),
                "Driver configured more than once",
            ));
        }
    }
    for var in &variables {
        var.distribution
            .validate(&format!("simulation.variables.{}", var.driver))?;
    }
    for t in &config.ev_thresholds {
        if !t.is_finite() {
            return Err(ValuationError::invalid(
                "simulation.ev_thresholds",
                "Thresholds must be finite",
            ));
        }
    }
    Ok(variables)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::maintenance_capex::MaintenanceCapexModel;
    use rust_decimal_macros::dec;

    const SEED: u64 = 42;

    fn base() -> ValuationDrivers {
        ValuationDrivers {
            revenue: dec!(3000000),
            ebit: dec!(600000),
            wacc: dec!(0.12),
            tax_rate: dec!(0.25),
            depreciation_amortization: dec!(50000),
            maintenance_capex: MaintenanceCapexModel::PercentOfRevenue { pct: dec!(0.015) },
            locations: 2,
            cash: dec!(100000),
            debt: dec!(1500000),
        }
    }

    fn input(runs: u32) -> SimulationInput {
        SimulationInput {
            base: base(),
            config: SimulationConfig {
                runs,
                seed: Some(SEED),
                variables: vec![
                    SimulationVariable {
                        driver: Driver::Wacc,
                        distribution: DistributionSpec::Triangular {
                            min: 0.10,
                            mode: 0.12,
                            max: 0.15,
                        },
                    },
                    SimulationVariable {
                        driver: Driver::Revenue,
                        distribution: DistributionSpec::Normal {
                            mean: 3_000_000.0,
                            std_dev: 300_000.0,
                            min: None,
                            max: None,
                        },
                    },
                ],
                ev_thresholds: vec![],
            },
        }
    }

    #[test]
    fn test_seeded_reproducibility() {
        let r1 = run_simulation(&input(2_000)).unwrap().result;
        let r2 = run_simulation(&input(2_000)).unwrap().result;
        assert_eq!(r1.enterprise_value.mean, r2.enterprise_value.mean);
        assert_eq!(
            r1.enterprise_value.percentiles.p5,
            r2.enterprise_value.percentiles.p5
        );
        assert_eq!(r1.seed, SEED);
    }

    #[test]
    fn test_percentile_ordering() {
        let out = run_simulation(&input(5_000)).unwrap().result;
        for s in [&out.enterprise_value, &out.equity_value] {
            let p = &s.percentiles;
            assert!(p.p5 <= p.p10);
            assert!(p.p10 <= p.p25);
            assert!(p.p25 <= p.p50);
            assert!(p.p50 <= p.p75);
            assert!(p.p75 <= p.p90);
            assert!(p.p90 <= p.p95);
        }
    }

    #[test]
    fn test_equity_tracks_ev() {
        let out = run_simulation(&input(1_000)).unwrap().result;
        // cash - debt = -1.4M on every trial
        let diff = out.enterprise_value.mean - out.equity_value.mean;
        assert!((diff - 1_400_000.0).abs() < 1e-3, "diff={diff}");
    }

    #[test]
    fn test_histogram_counts_completed_runs() {
        let out = run_simulation(&input(3_000)).unwrap().result;
        assert_eq!(out.histogram.len(), 20);
        let total: u32 = out.histogram.iter().map(|b| b.count).sum();
        assert_eq!(total, 3_000);
    }

    #[test]
    fn test_default_threshold_is_base_ev() {
        let out = run_simulation(&input(1_000)).unwrap().result;
        assert_eq!(out.prob_ev_above.len(), 1);
        assert_eq!(out.prob_ev_above[0].threshold, out.base_enterprise_value);
        assert!((0.0..=1.0).contains(&out.prob_ev_above[0].probability));
    }

    #[test]
    fn test_pre_cancelled_run_is_rejected() {
        let cancel = AtomicBool::new(true);
        let res = run_simulation_with_cancel(&input(100), &cancel);
        assert!(matches!(res, Err(ValuationError::InsufficientData(_))));
    }

    #[test]
    fn test_clamping_keeps_wacc_in_bounds() {
        let mut inp = input(2_000);
        inp.config.variables = vec![SimulationVariable {
            driver: Driver::Wacc,
            distribution: DistributionSpec::Uniform {
                min: -0.20,
                max: 0.60,
            },
        }];
        let out = run_simulation(&inp).unwrap();
        // EV bounded by owner earnings / 0.30 and / 0.05
        let oe = 600000.0 * 0.75 + 50000.0 - 45000.0;
        assert!(out.result.enterprise_value.min >= oe / 0.30 - 1e-6);
        assert!(out.result.enterprise_value.max <= oe / 0.05 + 1e-6);
        assert!(out.warnings.iter().any(|w| w.contains("clamped")));
    }

    #[test]
    fn test_duplicate_driver_rejected() {
        let mut inp = input(100);
        let dup = inp.config.variables[0].clone();
        inp.config.variables.push(dup);
        assert!(run_simulation(&inp).is_err());
    }

    #[test]
    fn test_zero_runs_rejected() {
        assert!(run_simulation(&input(0)).is_err());
    }

    #[test]
    fn test_percentile_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_sorted(&v, 50.0), 3.0);
        assert!((percentile_sorted(&v, 10.0) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_metadata_precision_field() {
        let out = run_simulation(&input(100)).unwrap();
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }
}
