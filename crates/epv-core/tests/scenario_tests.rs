use epv_core::scenarios::scenario::{
    apply_scenario, compare_scenarios, evaluate_scenario, PresetName, ScenarioAdjustment,
    ScenarioCase, ScenarioComparisonInput, ScenarioSelection,
};
use epv_core::scenarios::sensitivity::{
    one_way_sensitivity, tornado, two_way_sensitivity, OneWayInput, SensitivityVariable,
    TornadoInput, TwoWayInput,
};
use epv_core::valuation::drivers::{evaluate, Driver, ValuationDrivers};
use epv_core::valuation::maintenance_capex::MaintenanceCapexModel;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

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

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn test_bull_preset_adjustment() {
    let (drivers, _) =
        evaluate_scenario(&clinic_drivers(), &ScenarioSelection::Preset(PresetName::Bull))
            .unwrap();
    assert_eq!(drivers.revenue, dec!(3726101) * dec!(1.10));
    assert_eq!(drivers.ebit, dec!(1278204) * dec!(1.05) * dec!(1.10));
    assert_eq!(drivers.wacc, dec!(0.108));
}

#[test]
fn test_standard_comparison_is_ordered_bear_base_bull() {
    let out = compare_scenarios(&ScenarioComparisonInput {
        base: clinic_drivers(),
        scenarios: Vec::new(),
    })
    .unwrap()
    .result;

    let names: Vec<&str> = out.scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Bear", "Base", "Bull"]);

    let evs: Vec<Decimal> = out
        .scenarios
        .iter()
        .map(|s| s.valuation.enterprise_value)
        .collect();
    assert!(evs[0] < evs[1] && evs[1] < evs[2]);
    assert_eq!(out.epv_range.low, evs[0]);
    assert_eq!(out.epv_range.high, evs[2]);
    assert_eq!(out.scenarios[1].deviation_from_base, Decimal::ZERO);
    assert!(out.probability_weighted_ev.is_none());
}

#[test]
fn test_probability_weighted_ev() {
    let case = |p: PresetName, prob| ScenarioCase {
        selection: ScenarioSelection::Preset(p),
        probability: Some(prob),
    };
    let out = compare_scenarios(&ScenarioComparisonInput {
        base: clinic_drivers(),
        scenarios: vec![
            case(PresetName::Bear, dec!(0.25)),
            case(PresetName::Base, dec!(0.50)),
            case(PresetName::Bull, dec!(0.25)),
        ],
    })
    .unwrap()
    .result;

    let expected: Decimal = out
        .scenarios
        .iter()
        .map(|s| s.probability.unwrap() * s.valuation.enterprise_value)
        .sum();
    assert_eq!(out.probability_weighted_ev, Some(expected));
}

#[test]
fn test_probabilities_must_sum_to_one() {
    let res = compare_scenarios(&ScenarioComparisonInput {
        base: clinic_drivers(),
        scenarios: vec![
            ScenarioCase {
                selection: ScenarioSelection::Preset(PresetName::Bear),
                probability: Some(dec!(0.3)),
            },
            ScenarioCase {
                selection: ScenarioSelection::Preset(PresetName::Bull),
                probability: Some(dec!(0.3)),
            },
        ],
    });
    assert!(res.is_err());
}

#[test]
fn test_custom_scenario_wacc_floor() {
    let adj = ScenarioAdjustment {
        revenue_multiplier: Decimal::ONE,
        ebit_multiplier: Decimal::ONE,
        wacc_delta: dec!(-0.2),
    };
    let err = apply_scenario(&clinic_drivers(), &adj).unwrap_err();
    assert_eq!(err.field(), Some("scenario.wacc_delta"));
}

#[test]
fn test_custom_scenario_from_json() {
    let selection: ScenarioSelection = serde_json::from_str(
        r#"{"custom": {"name": "Recession", "adjustment": {
            "revenue_multiplier": "0.7", "ebit_multiplier": "0.8", "wacc_delta": "0.03"}}}"#,
    )
    .unwrap();
    assert_eq!(selection.name(), "Recession");
    let (_, valuation) = evaluate_scenario(&clinic_drivers(), &selection).unwrap();
    assert!(valuation.enterprise_value < evaluate(&clinic_drivers()).unwrap().enterprise_value);
}

// ===========================================================================
// Sensitivity
// ===========================================================================

#[test]
fn test_one_way_wacc_is_monotonic() {
    let out = one_way_sensitivity(&OneWayInput {
        base: clinic_drivers(),
        variable: SensitivityVariable {
            driver: Driver::Wacc,
            min: dec!(0.10),
            max: dec!(0.14),
            step: dec!(0.01),
        },
    })
    .unwrap()
    .result;
    assert_eq!(out.points.len(), 5);
    for pair in out.points.windows(2) {
        assert!(pair[1].enterprise_value < pair[0].enterprise_value);
    }
}

#[test]
fn test_two_way_grid_shape_and_base_cell() {
    let out = two_way_sensitivity(&TwoWayInput {
        base: clinic_drivers(),
        variable_1: SensitivityVariable {
            driver: Driver::Wacc,
            min: dec!(0.100),
            max: dec!(0.130),
            step: dec!(0.006),
        },
        variable_2: SensitivityVariable {
            driver: Driver::EbitMargin,
            min: dec!(0.30),
            max: dec!(0.40),
            step: dec!(0.05),
        },
    })
    .unwrap()
    .result;

    assert_eq!(out.matrix.len(), out.variable_1_values.len());
    assert!(out
        .matrix
        .iter()
        .all(|row| row.len() == out.variable_2_values.len()));
    // 0.118 lands exactly on the wacc grid
    let (row, _) = out.base_case_position;
    assert_eq!(out.variable_1_values[row], dec!(0.118));
}

#[test]
fn test_margin_sweep_outside_domain_rejected() {
    let res = one_way_sensitivity(&OneWayInput {
        base: clinic_drivers(),
        variable: SensitivityVariable {
            driver: Driver::EbitMargin,
            min: dec!(0.5),
            max: dec!(1.5),
            step: dec!(0.5),
        },
    });
    assert!(res.is_err());
}

#[test]
fn test_tornado_ranked_by_swing() {
    let out = tornado(&TornadoInput {
        base: clinic_drivers(),
        swing_pct: dec!(0.10),
        drivers: Vec::new(),
    })
    .unwrap()
    .result;
    assert_eq!(out.bars.len(), 4);
    for pair in out.bars.windows(2) {
        assert!(pair[0].swing >= pair[1].swing);
    }
    // ±10% on WACC moves a perpetuity more than ±10% on any cash driver
    assert_eq!(out.bars[0].driver, Driver::Wacc);
}
