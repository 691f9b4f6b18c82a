use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use crate::case::{FinancialCase, LboConfig, PnlSource};
use crate::error::ValuationError;
use crate::monte_carlo::simulation::{
    self, run_simulation_with_cancel, SimulationInput, SimulationSummary,
};
use crate::normalization::bridge::{build_ebitda_bridge, EbitdaBridge, NormalizationInput};
use crate::operations::pnl::{build_operating_pnl, PnlLines};
use crate::operations::revenue::RevenueOutput;
use crate::pe::consideration::{
    calculate_deal_consideration, DealConsiderationInput, DealConsiderationOutput,
};
use crate::pe::lbo::{self, build_lbo, LboInput, LboOutput};
use crate::scenarios::scenario::{
    self, apply_scenario, compare_scenarios, ScenarioAdjustment, ScenarioComparison,
    ScenarioComparisonInput,
};
use crate::scenarios::sensitivity::{
    self, one_way_sensitivity, tornado, two_way_sensitivity, OneWayInput, OneWayOutput,
    TornadoInput, TornadoOutput, TwoWayInput, TwoWayOutput,
};
use crate::types::*;
use crate::valuation::drivers::{evaluate, ValuationDrivers, ValuationResult};
use crate::valuation::epv::{calculate_epv, EpvInput, EpvOutput};
use crate::valuation::net_debt::NetDebt;
use crate::valuation::wacc::{self, calculate_wacc, WaccOutput};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// The scenario the downstream views were run on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedScenario {
    pub name: String,
    pub adjustment: ScenarioAdjustment,
    pub drivers: ValuationDrivers,
    pub valuation: ValuationResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensitivityReport {
    pub one_way: Vec<OneWayOutput>,
    pub two_way: Vec<TwoWayOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tornado: Option<TornadoOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_name: Option<String>,
    /// Revenue and capacity detail (operating-model cases only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<RevenueOutput>,
    pub pnl: PnlLines,
    pub bridge: EbitdaBridge,
    pub wacc: WaccOutput,
    pub net_debt: NetDebt,
    /// Base-case EPV detail
    pub epv: EpvOutput,
    pub selected_scenario: SelectedScenario,
    pub scenarios: ScenarioComparison,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<SensitivityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lbo: Option<LboOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal: Option<DealConsiderationOutput>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Value a case end to end.
pub fn evaluate_case(case: &FinancialCase) -> EngineResult<ComputationOutput<ValuationReport>> {
    evaluate_case_with_cancel(case, &AtomicBool::new(false))
}

/// Value a case end to end; `cancel` stops the Monte Carlo run early.
///
/// Revenue/P&L -> EBITDA bridge -> WACC -> EPV -> scenarios, then the
/// optional simulation, sensitivity, LBO and deal views on top. Every
/// configuration error surfaces before any of the optional views runs.
pub fn evaluate_case_with_cancel(
    case: &FinancialCase,
    cancel: &AtomicBool,
) -> EngineResult<ComputationOutput<ValuationReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_case(case)?;

    // --- P&L ---
    let (revenue, pnl) = match &case.pnl {
        PnlSource::Operating(model) => {
            let out = build_operating_pnl(model, case.locations)?;
            collect("Operating P&L", out.warnings, &mut warnings);
            (Some(out.result.revenue), out.result.pnl)
        }
        PnlSource::Reported(reported) => (None, reported.to_pnl_lines()?),
    };

    // --- Normalization ---
    let bridge_out = build_ebitda_bridge(&NormalizationInput {
        pnl: pnl.clone(),
        policy: case.normalization.policy.clone(),
        adjustments: case.normalization.adjustments.clone(),
    })?;
    collect("Normalization", bridge_out.warnings, &mut warnings);
    let bridge = bridge_out.result;

    // --- Cost of capital ---
    let wacc_out = calculate_wacc(&case.capital)?;
    collect("WACC", wacc_out.warnings, &mut warnings);
    let wacc = wacc_out.result;

    // --- Net debt ---
    let mut nd_warnings = Vec::new();
    let net_debt = case.epv.net_debt.resolve(&mut nd_warnings)?;
    collect("Net debt", nd_warnings, &mut warnings);

    // --- EPV (base) ---
    let depreciation_amortization = case
        .epv
        .depreciation_amortization
        .unwrap_or(pnl.depreciation_amortization);
    let epv_input = EpvInput {
        revenue: pnl.revenue,
        ebit: bridge.normalized_ebitda - depreciation_amortization,
        tax_rate: case.capital.tax_rate,
        depreciation_amortization,
        maintenance_capex: case.epv.maintenance_capex.clone(),
        locations: case.locations,
        wacc: wacc.wacc,
        cash: net_debt.cash,
        debt: net_debt.debt,
        reproduction_value: case.epv.reproduction_value,
    };
    let epv_out = calculate_epv(&epv_input)?;
    collect("EPV", epv_out.warnings, &mut warnings);
    let epv = epv_out.result;
    let base_drivers = epv_input.drivers();

    // --- Scenarios ---
    let selection = &case.scenario.selection;
    let adjustment = selection.adjustment();
    let selected_drivers = apply_scenario(&base_drivers, &adjustment)?;
    let selected_scenario = SelectedScenario {
        name: selection.name().to_string(),
        adjustment,
        valuation: evaluate(&selected_drivers)?,
        drivers: selected_drivers.clone(),
    };

    let comparison = compare_scenarios(&ScenarioComparisonInput {
        base: base_drivers.clone(),
        scenarios: case.scenario.compare.clone(),
    })?;
    collect("Scenarios", comparison.warnings, &mut warnings);

    // --- Sensitivity ---
    let sensitivity = match &case.sensitivity {
        Some(cfg) => {
            let mut report = SensitivityReport::default();
            for variable in &cfg.one_way {
                let out = one_way_sensitivity(&OneWayInput {
                    base: selected_drivers.clone(),
                    variable: variable.clone(),
                })?;
                collect("Sensitivity", out.warnings, &mut warnings);
                report.one_way.push(out.result);
            }
            for grid in &cfg.two_way {
                let out = two_way_sensitivity(&TwoWayInput {
                    base: selected_drivers.clone(),
                    variable_1: grid.variable_1.clone(),
                    variable_2: grid.variable_2.clone(),
                })?;
                collect("Sensitivity", out.warnings, &mut warnings);
                report.two_way.push(out.result);
            }
            if cfg.tornado {
                let out = tornado(&TornadoInput {
                    base: selected_drivers.clone(),
                    swing_pct: cfg.tornado_swing_pct,
                    drivers: Vec::new(),
                })?;
                collect("Tornado", out.warnings, &mut warnings);
                report.tornado = Some(out.result);
            }
            Some(report)
        }
        None => None,
    };

    // --- LBO ---
    let lbo = match &case.lbo {
        Some(cfg) => {
            let out = build_lbo(&lbo_input(cfg, bridge.normalized_ebitda, net_debt.net_debt))?;
            collect("LBO", out.warnings, &mut warnings);
            Some(out.result)
        }
        None => None,
    };

    // --- Deal consideration ---
    let deal = match &case.deal {
        Some(cfg) => {
            let out = calculate_deal_consideration(&DealConsiderationInput {
                ebitda: bridge.normalized_ebitda,
                multiple: cfg.multiple,
                net_debt: net_debt.net_debt,
                cash_pct: cfg.cash_pct,
            })?;
            collect("Deal", out.warnings, &mut warnings);
            Some(out.result)
        }
        None => None,
    };

    // --- Monte Carlo (last: the only view that can be cancelled) ---
    let simulation = match &case.simulation {
        Some(cfg) => {
            let out = run_simulation_with_cancel(
                &SimulationInput {
                    base: selected_drivers,
                    config: cfg.clone(),
                },
                cancel,
            )?;
            collect("Monte Carlo", out.warnings, &mut warnings);
            Some(out.result)
        }
        None => None,
    };

    let report = ValuationReport {
        case_name: case.name.clone(),
        revenue,
        pnl,
        bridge,
        wacc,
        net_debt,
        epv,
        selected_scenario,
        scenarios: comparison.result,
        simulation,
        sensitivity,
        lbo,
        deal,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Earnings Power Value with scenario, Monte Carlo, sensitivity and LBO views",
        &serde_json::json!({
            "case": case.name,
            "locations": case.locations,
            "scenario": case.scenario.selection.name(),
            "simulation": case.simulation.is_some(),
            "sensitivity": case.sensitivity.is_some(),
            "lbo": case.lbo.is_some(),
            "deal": case.deal.is_some(),
        }),
        warnings,
        elapsed,
        report,
    ))
}

fn collect(section: &str, found: Vec<String>, warnings: &mut Vec<String>) {
    warnings.extend(found.into_iter().map(|w| format!("{section}: {w}")));
}

fn lbo_input(cfg: &LboConfig, normalized_ebitda: Money, net_debt: Money) -> LboInput {
    LboInput {
        entry: cfg.entry.clone(),
        entry_ebitda: normalized_ebitda,
        existing_net_debt: net_debt,
        transaction_fees: cfg.transaction_fees,
        rollover_equity: cfg.rollover_equity,
        debt_weight: cfg.debt_weight,
        interest_rate: cfg.interest_rate,
        amortization_pct: cfg.amortization_pct,
        sweep_pct: cfg.sweep_pct,
        ebitda_growth: cfg.ebitda_growth,
        free_cash_flow: cfg.free_cash_flow.clone(),
        distribute_residual_cash: cfg.distribute_residual_cash,
        hold_years: cfg.hold_years,
        exit_multiple: cfg.exit_multiple,
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Configuration checks that do not depend on computed values.
fn validate_case(case: &FinancialCase) -> EngineResult<()> {
    if case.locations == 0 {
        return Err(ValuationError::invalid(
            "locations",
            "At least one location is required",
        ));
    }
    wacc::validate_capital_inputs(&case.capital)?;
    case.epv.maintenance_capex.validate()?;
    if let Some(da) = case.epv.depreciation_amortization {
        if da < Decimal::ZERO {
            return Err(ValuationError::invalid(
                "epv.depreciation_amortization",
                "D&A cannot be negative",
            ));
        }
    }
    scenario::validate_adjustment(&case.scenario.selection.adjustment())?;
    for c in &case.scenario.compare {
        scenario::validate_adjustment(&c.selection.adjustment())?;
    }
    if let Some(sim) = &case.simulation {
        simulation::validate_simulation_config(sim)?;
    }
    if let Some(sens) = &case.sensitivity {
        for v in &sens.one_way {
            sensitivity::generate_sweep_values(v)?;
        }
        for g in &sens.two_way {
            if g.variable_1.driver == g.variable_2.driver {
                return Err(ValuationError::invalid(
                    "sensitivity.two_way",
                    "Two-way sensitivity needs two different drivers",
                ));
            }
            sensitivity::generate_sweep_values(&g.variable_1)?;
            sensitivity::generate_sweep_values(&g.variable_2)?;
        }
        if sens.tornado
            && (sens.tornado_swing_pct <= Decimal::ZERO || sens.tornado_swing_pct >= Decimal::ONE)
        {
            return Err(ValuationError::invalid(
                "sensitivity.tornado_swing_pct",
                "Swing must be within (0, 1)",
            ));
        }
    }
    if let Some(cfg) = &case.lbo {
        // Entry EBITDA is only known after the bridge; build_lbo re-checks it.
        lbo::validate_lbo_input(&lbo_input(cfg, Decimal::ONE, Decimal::ZERO))?;
    }
    if let Some(deal) = &case.deal {
        if deal.multiple <= Decimal::ZERO {
            return Err(ValuationError::invalid("deal.multiple", "Multiple must be positive"));
        }
        if deal.cash_pct < Decimal::ZERO || deal.cash_pct > Decimal::ONE {
            return Err(ValuationError::invalid(
                "deal.cash_pct",
                "Cash share must be between 0 and 1",
            ));
        }
    }
    Ok(())
}
