use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::valuation::drivers::{evaluate, ValuationDrivers, ValuationResult};
use crate::valuation::maintenance_capex::MaintenanceCapexModel;
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

/// Input for an Earnings Power Value calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpvInput {
    /// Annual revenue (drives percent-of-revenue capex)
    pub revenue: Money,
    /// Normalized EBIT (normalized EBITDA less D&A)
    pub ebit: Money,
    pub tax_rate: Rate,
    #[serde(default)]
    pub depreciation_amortization: Money,
    #[serde(default)]
    pub maintenance_capex: MaintenanceCapexModel,
    #[serde(default = "default_locations")]
    pub locations: u32,
    pub wacc: Rate,
    #[serde(default)]
    pub cash: Money,
    #[serde(default)]
    pub debt: Money,
    /// Cost to reproduce the operating assets today
    #[serde(default)]
    pub reproduction_value: Option<Money>,
}

fn default_locations() -> u32 {
    1
}

/// Asset-reproduction cross-check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReproductionCheck {
    pub reproduction_value: Money,
    /// EV in excess of reproduction value
    pub franchise_value: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev_to_reproduction: Option<Multiple>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpvOutput {
    pub valuation: ValuationResult,
    pub revenue: Money,
    pub ebit: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebit_margin: Option<Rate>,
    pub taxes: Money,
    pub depreciation_amortization: Money,
    pub maintenance_capex: Money,
    /// EV / (EBIT + D&A)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_ev_to_ebitda: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reproduction: Option<ReproductionCheck>,
}

impl EpvInput {
    pub fn drivers(&self) -> ValuationDrivers {
        ValuationDrivers {
            revenue: self.revenue,
            ebit: self.ebit,
            wacc: self.wacc,
            tax_rate: self.tax_rate,
            depreciation_amortization: self.depreciation_amortization,
            maintenance_capex: self.maintenance_capex.clone(),
            locations: self.locations,
            cash: self.cash,
            debt: self.debt,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Earnings Power Value: current sustainable earnings capitalized at WACC
/// with no growth, bridged to equity through cash and debt.
pub fn calculate_epv(input: &EpvInput) -> EngineResult<ComputationOutput<EpvOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_epv_input(input)?;

    let drivers = input.drivers();
    let valuation = evaluate(&drivers)?;

    let maintenance_capex = valuation.nopat + input.depreciation_amortization
        - valuation.owner_earnings;
    let taxes = input.ebit - valuation.nopat;

    if valuation.owner_earnings < Decimal::ZERO {
        warnings.push(format!(
            "Owner earnings are negative ({}); EPV is negative",
            valuation.owner_earnings.round_dp(0)
        ));
    }
    if maintenance_capex > input.depreciation_amortization * Decimal::TWO
        && !input.depreciation_amortization.is_zero()
    {
        warnings.push("Maintenance capex exceeds twice D&A; verify the capex model".into());
    }
    if valuation.equity_value < Decimal::ZERO {
        warnings.push("Debt exceeds enterprise value; equity value is negative".into());
    }

    let ebitda = input.ebit + input.depreciation_amortization;
    let implied_ev_to_ebitda = if ebitda > Decimal::ZERO {
        Some(valuation.enterprise_value / ebitda)
    } else {
        None
    };

    let reproduction = input.reproduction_value.map(|rv| {
        let franchise_value = valuation.enterprise_value - rv;
        if franchise_value < Decimal::ZERO {
            warnings.push(
                "EPV is below asset reproduction value; no franchise value is supported".into(),
            );
        }
        ReproductionCheck {
            reproduction_value: rv,
            franchise_value,
            ev_to_reproduction: if rv > Decimal::ZERO {
                Some(valuation.enterprise_value / rv)
            } else {
                None
            },
        }
    });

    let output = EpvOutput {
        valuation,
        revenue: input.revenue,
        ebit: input.ebit,
        ebit_margin: drivers.ebit_margin(),
        taxes,
        depreciation_amortization: input.depreciation_amortization,
        maintenance_capex,
        implied_ev_to_ebitda,
        reproduction,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Earnings Power Value (zero-growth perpetuity of owner earnings)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub(crate) fn validate_epv_input(input: &EpvInput) -> EngineResult<()> {
    if input.revenue < Decimal::ZERO {
        return Err(ValuationError::invalid("revenue", "Revenue cannot be negative"));
    }
    if input.wacc <= Decimal::ZERO {
        return Err(ValuationError::invalid("wacc", "WACC must be positive"));
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate >= Decimal::ONE {
        return Err(ValuationError::invalid(
            "tax_rate",
            "Tax rate must be within [0, 1)",
        ));
    }
    if input.depreciation_amortization < Decimal::ZERO {
        return Err(ValuationError::invalid(
            "depreciation_amortization",
            "D&A cannot be negative",
        ));
    }
    if input.cash < Decimal::ZERO {
        return Err(ValuationError::invalid("cash", "Cash cannot be negative"));
    }
    if input.debt < Decimal::ZERO {
        return Err(ValuationError::invalid("debt", "Debt cannot be negative"));
    }
    if let Some(rv) = input.reproduction_value {
        if rv < Decimal::ZERO {
            return Err(ValuationError::invalid(
                "reproduction_value",
                "Reproduction value cannot be negative",
            ));
        }
    }
    input.maintenance_capex.validate()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn clinic_input() -> EpvInput {
        EpvInput {
            revenue: dec!(3726101),
            ebit: dec!(1278204),
            tax_rate: dec!(0.25),
            depreciation_amortization: Decimal::ZERO,
            maintenance_capex: MaintenanceCapexModel::ReinvestmentRate { rate: dec!(0.265) },
            locations: 1,
            wacc: dec!(0.118),
            cash: Decimal::ZERO,
            debt: dec!(2150000),
            reproduction_value: None,
        }
    }

    #[test]
    fn test_clinic_epv() {
        let out = calculate_epv(&clinic_input()).unwrap().result;
        let ev = out.valuation.enterprise_value;
        assert!((ev - dec!(5970000)).abs() < dec!(10000), "EV {ev}");
        let eq = out.valuation.equity_value;
        assert!((eq - dec!(3820000)).abs() < dec!(10000), "equity {eq}");
    }

    #[test]
    fn test_epv_decreases_with_wacc() {
        let mut prev = None;
        for w in [dec!(0.08), dec!(0.10), dec!(0.12), dec!(0.15)] {
            let mut input = clinic_input();
            input.wacc = w;
            let ev = calculate_epv(&input).unwrap().result.valuation.enterprise_value;
            if let Some(p) = prev {
                assert!(ev < p);
            }
            prev = Some(ev);
        }
    }

    #[test]
    fn test_reproduction_cross_check() {
        let mut input = clinic_input();
        input.reproduction_value = Some(dec!(2000000));
        let out = calculate_epv(&input).unwrap().result;
        let check = out.reproduction.unwrap();
        assert_eq!(
            check.franchise_value,
            out.valuation.enterprise_value - dec!(2000000)
        );
        assert!(check.ev_to_reproduction.unwrap() > Decimal::ONE);
    }

    #[test]
    fn test_reproduction_above_epv_warns() {
        let mut input = clinic_input();
        input.reproduction_value = Some(dec!(9000000));
        let out = calculate_epv(&input).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("franchise")));
    }

    #[test]
    fn test_negative_wacc_rejected() {
        let mut input = clinic_input();
        input.wacc = dec!(-0.01);
        assert!(calculate_epv(&input).is_err());
    }

    #[test]
    fn test_taxes_and_capex_reported() {
        let out = calculate_epv(&clinic_input()).unwrap().result;
        assert_eq!(out.taxes, dec!(319551));
        assert_eq!(
            out.valuation.owner_earnings,
            out.valuation.nopat - out.maintenance_capex
        );
    }
}
