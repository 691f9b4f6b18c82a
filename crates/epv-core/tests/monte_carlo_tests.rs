use epv_core::monte_carlo::distributions::DistributionSpec;
use epv_core::monte_carlo::simulation::{
    run_simulation, run_simulation_with_cancel, CancelSignal, SimulationConfig, SimulationInput,
    SimulationVariable,
};
use epv_core::valuation::drivers::{Driver, ValuationDrivers};
use epv_core::valuation::maintenance_capex::MaintenanceCapexModel;
use epv_core::ValuationError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn clinic_drivers() -> ValuationDrivers {
    ValuationDrivers {
        revenue: dec!(3726101),
        ebit: dec!(1278204),
        wacc: dec!(0.118),
        tax_rate: dec!(0.25),
        depreciation_amortization: Decimal::ZERO,
        maintenance_capex: MaintenanceCapexModel::ReinvestmentRate { rate: dec!(0.265) },
        locations: 1,
        cash: Decimal::ZERO,
        debt: dec!(2150000),
    }
}

fn four_driver_config(runs: u32, seed: u64) -> SimulationConfig {
    SimulationConfig {
        runs,
        seed: Some(seed),
        variables: vec![
            SimulationVariable {
                driver: Driver::Revenue,
                distribution: DistributionSpec::Triangular {
                    min: 3_300_000.0,
                    mode: 3_726_101.0,
                    max: 4_100_000.0,
                },
            },
            SimulationVariable {
                driver: Driver::EbitMargin,
                distribution: DistributionSpec::Normal {
                    mean: 0.343,
                    std_dev: 0.03,
                    min: None,
                    max: None,
                },
            },
            SimulationVariable {
                driver: Driver::Wacc,
                distribution: DistributionSpec::Uniform {
                    min: 0.10,
                    max: 0.14,
                },
            },
            SimulationVariable {
                driver: Driver::TaxRate,
                distribution: DistributionSpec::Triangular {
                    min: 0.21,
                    mode: 0.25,
                    max: 0.28,
                },
            },
        ],
        ev_thresholds: vec![5_000_000.0, 7_000_000.0],
    }
}

#[test]
fn test_seeded_runs_are_identical() {
    let input = SimulationInput {
        base: clinic_drivers(),
        config: four_driver_config(2_000, 42),
    };
    let a = run_simulation(&input).unwrap().result;
    let b = run_simulation(&input).unwrap().result;
    assert_eq!(a.enterprise_value.mean, b.enterprise_value.mean);
    assert_eq!(a.enterprise_value.percentiles.p5, b.enterprise_value.percentiles.p5);
    assert_eq!(a.equity_value.percentiles.p95, b.equity_value.percentiles.p95);
    assert_eq!(a.seed, 42);
}

#[test]
fn test_different_seeds_differ() {
    let a = run_simulation(&SimulationInput {
        base: clinic_drivers(),
        config: four_driver_config(1_000, 1),
    })
    .unwrap()
    .result;
    let b = run_simulation(&SimulationInput {
        base: clinic_drivers(),
        config: four_driver_config(1_000, 2),
    })
    .unwrap()
    .result;
    assert_ne!(a.enterprise_value.mean, b.enterprise_value.mean);
}

#[test]
fn test_percentiles_are_ordered() {
    let out = run_simulation(&SimulationInput {
        base: clinic_drivers(),
        config: four_driver_config(5_000, 7),
    })
    .unwrap()
    .result;
    let p = &out.enterprise_value.percentiles;
    assert!(out.enterprise_value.min <= p.p5);
    assert!(p.p5 <= p.p10 && p.p10 <= p.p25 && p.p25 <= p.p50);
    assert!(p.p50 <= p.p75 && p.p75 <= p.p90 && p.p90 <= p.p95);
    assert!(p.p95 <= out.enterprise_value.max);
    assert_eq!(out.completed_runs, 5_000);
    assert!(!out.cancelled);
}

#[test]
fn test_histogram_and_thresholds() {
    let out = run_simulation(&SimulationInput {
        base: clinic_drivers(),
        config: four_driver_config(3_000, 11),
    })
    .unwrap()
    .result;
    assert_eq!(out.histogram.len(), 20);
    let counted: u32 = out.histogram.iter().map(|b| b.count).sum();
    assert_eq!(counted, 3_000);

    assert_eq!(out.prob_ev_above.len(), 2);
    assert!(out.prob_ev_above[0].probability >= out.prob_ev_above[1].probability);
    assert!((0.0..=1.0).contains(&out.prob_equity_positive));
}

#[test]
fn test_mean_near_base_for_symmetric_wacc_only() {
    // Only WACC varies, uniformly around the base: EV is convex in WACC so the
    // mean sits slightly above base, but well within 5%.
    let config = SimulationConfig {
        runs: 10_000,
        seed: Some(3),
        variables: vec![SimulationVariable {
            driver: Driver::Wacc,
            distribution: DistributionSpec::Uniform {
                min: 0.108,
                max: 0.128,
            },
        }],
        ev_thresholds: Vec::new(),
    };
    let out = run_simulation(&SimulationInput {
        base: clinic_drivers(),
        config,
    })
    .unwrap()
    .result;
    let rel = (out.enterprise_value.mean - out.base_enterprise_value) / out.base_enterprise_value;
    assert!(rel > 0.0 && rel < 0.05, "relative deviation {rel}");
    // Default threshold is the base EV
    assert_eq!(out.prob_ev_above[0].threshold, out.base_enterprise_value);
}

#[test]
fn test_wide_wacc_distribution_is_clamped_with_warning() {
    let config = SimulationConfig {
        runs: 2_000,
        seed: Some(5),
        variables: vec![SimulationVariable {
            driver: Driver::Wacc,
            distribution: DistributionSpec::Normal {
                mean: 0.06,
                std_dev: 0.03,
                min: None,
                max: None,
            },
        }],
        ev_thresholds: Vec::new(),
    };
    let out = run_simulation(&SimulationInput {
        base: clinic_drivers(),
        config,
    })
    .unwrap();
    assert!(out.warnings.iter().any(|w| w.contains("clamped")));
    assert!(out.result.enterprise_value.max.is_finite());
}

#[test]
fn test_duplicate_driver_rejected() {
    let mut config = four_driver_config(1_000, 1);
    config.variables.push(SimulationVariable {
        driver: Driver::Wacc,
        distribution: DistributionSpec::Uniform {
            min: 0.10,
            max: 0.12,
        },
    });
    let res = run_simulation(&SimulationInput {
        base: clinic_drivers(),
        config,
    });
    assert!(matches!(res, Err(ValuationError::InvalidInput { .. })));
}

#[test]
fn test_cancel_before_start() {
    let cancel = AtomicBool::new(true);
    let res = run_simulation_with_cancel(
        &SimulationInput {
            base: clinic_drivers(),
            config: four_driver_config(1_000, 1),
        },
        &cancel,
    );
    assert!(matches!(res, Err(ValuationError::InsufficientData(_))));
}

/// Fires after a fixed number of trials have been issued.
struct StopAfter {
    trials: usize,
    polled: AtomicUsize,
}

impl CancelSignal for StopAfter {
    fn is_cancelled(&self) -> bool {
        self.polled.fetch_add(1, Ordering::Relaxed) >= self.trials
    }
}

#[test]
fn test_cancel_midway_reports_partial_distribution() {
    let stop = StopAfter {
        trials: 600,
        polled: AtomicUsize::new(0),
    };
    let out = run_simulation_with_cancel(
        &SimulationInput {
            base: clinic_drivers(),
            config: four_driver_config(4_000, 9),
        },
        &stop,
    )
    .unwrap();
    let r = &out.result;

    assert!(r.cancelled);
    assert_eq!(r.requested_runs, 4_000);
    assert_eq!(r.completed_runs, 600);

    let p = &r.enterprise_value.percentiles;
    assert!(r.enterprise_value.min <= p.p5);
    assert!(p.p5 <= p.p25 && p.p25 <= p.p50 && p.p50 <= p.p75 && p.p75 <= p.p95);
    assert!(p.p95 <= r.enterprise_value.max);

    let counted: u32 = r.histogram.iter().map(|b| b.count).sum();
    assert_eq!(counted, 600);
    assert!((0.0..=1.0).contains(&r.prob_equity_positive));
    assert!(out.warnings.iter().any(|w| w.contains("600 of 4000")));
}
