use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::EngineResult;

/// D/E ceiling used when the target debt weight approaches 100%.
pub const MAX_DEBT_TO_EQUITY: Decimal = dec!(99);

/// Capital structure and market inputs for the cost of capital.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalStructureInputs {
    /// Risk-free rate (e.g. 10-year government bond yield)
    pub risk_free_rate: Rate,
    /// Equity risk premium (market return minus risk-free rate)
    pub equity_risk_premium: Rate,
    /// Equity beta. Treated as unlevered (asset) beta when `relever` is set.
    pub beta: Decimal,
    /// Small-company size premium
    #[serde(default)]
    pub size_premium: Rate,
    /// Company-specific risk premium
    #[serde(default)]
    pub specific_premium: Rate,
    /// Pre-tax cost of debt
    pub cost_of_debt: Rate,
    /// Marginal corporate tax rate, within [0, 1)
    pub tax_rate: Rate,
    /// Target weight of debt in the capital structure, within [0, 1]
    pub target_debt_weight: Rate,
    /// Re-lever `beta` to the target capital structure via Hamada
    #[serde(default)]
    pub relever: bool,
}

/// Output of the WACC calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccOutput {
    /// Weighted average cost of capital
    pub wacc: Rate,
    /// Cost of equity (via CAPM + premiums)
    pub cost_of_equity: Rate,
    /// After-tax cost of debt
    pub after_tax_cost_of_debt: Rate,
    /// Pre-tax cost of debt (echoed back)
    pub cost_of_debt_pretax: Rate,
    pub debt_weight: Rate,
    pub equity_weight: Rate,
    /// Levered beta used in the calculation
    pub levered_beta: Decimal,
    /// Unlevered beta (when re-levered)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlevered_beta: Option<Decimal>,
    /// Target D/E used for re-levering (capped)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_to_equity: Option<Decimal>,
}

/// Calculate the Weighted Average Cost of Capital using CAPM.
///
/// Cost of equity: Ke = Rf + Beta * ERP + size_premium + specific_premium
/// After-tax cost of debt: Kd_at = Kd * (1 - t)
/// WACC = Wd * Kd_at + (1 - Wd) * Ke
///
/// With `relever`, `beta` is the unlevered beta and the levered beta is
/// Beta_L = Beta_U * (1 + (1 - t) * D/E) at the target D/E.
///
/// A non-positive WACC is rejected: it would make every perpetuity
/// downstream undefined.
pub fn calculate_wacc(
    input: &CapitalStructureInputs,
) -> EngineResult<ComputationOutput<WaccOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_capital_inputs(input)?;

    let debt_weight = input.target_debt_weight;
    let equity_weight = Decimal::ONE - debt_weight;

    // --- Beta ---
    let (levered_beta, unlevered_beta, debt_to_equity) = if input.relever {
        let de = target_debt_to_equity(debt_weight);
        if de == MAX_DEBT_TO_EQUITY {
            warnings.push(format!(
                "Target debt weight {debt_weight} implies unbounded D/E; capped at {MAX_DEBT_TO_EQUITY}"
            ));
        }
        let beta_l = relever_beta(input.beta, input.tax_rate, de);
        (beta_l, Some(input.beta), Some(de))
    } else {
        (input.beta, None, None)
    };

    // --- Cost of Equity (CAPM build-up) ---
    let cost_of_equity = input.risk_free_rate
        + levered_beta * input.equity_risk_premium
        + input.size_premium
        + input.specific_premium;

    // --- After-tax cost of debt ---
    let after_tax_cost_of_debt = input.cost_of_debt * (Decimal::ONE - input.tax_rate);

    // --- WACC ---
    let wacc = debt_weight * after_tax_cost_of_debt + equity_weight * cost_of_equity;

    if wacc <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "wacc",
            format!("Computed WACC of {wacc} is not positive; perpetuity value is undefined"),
        ));
    }

    // --- Reasonableness warnings ---
    if levered_beta > dec!(3.0) {
        warnings.push(format!(
            "High beta ({levered_beta}): verify market data; betas above 3.0 are unusual"
        ));
    }
    if input.equity_risk_premium > dec!(0.10) {
        warnings.push(format!(
            "Equity risk premium ({}) exceeds 10%; verify estimate",
            input.equity_risk_premium
        ));
    }
    if wacc > dec!(0.25) {
        warnings.push(format!(
            "WACC of {wacc} exceeds 25%; appropriate for distressed or venture situations only"
        ));
    }

    let output = WaccOutput {
        wacc,
        cost_of_equity,
        after_tax_cost_of_debt,
        cost_of_debt_pretax: input.cost_of_debt,
        debt_weight,
        equity_weight,
        levered_beta,
        unlevered_beta,
        debt_to_equity,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "WACC via CAPM build-up",
        input,
        warnings,
        elapsed,
        output,
    ))
}

/// D/E implied by a debt weight: w / (1 - w), 0 for w <= 0, capped at 99.
pub fn target_debt_to_equity(debt_weight: Rate) -> Decimal {
    if debt_weight <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let equity_weight = Decimal::ONE - debt_weight;
    if equity_weight <= debt_weight / MAX_DEBT_TO_EQUITY {
        return MAX_DEBT_TO_EQUITY;
    }
    (debt_weight / equity_weight).min(MAX_DEBT_TO_EQUITY)
}

/// Unlever a beta using the Hamada equation.
///
/// Beta_U = Beta_L / (1 + (1 - t) * D/E)
pub fn unlever_beta(
    levered_beta: Decimal,
    tax_rate: Rate,
    debt_equity: Decimal,
) -> EngineResult<Decimal> {
    let denom = Decimal::ONE + (Decimal::ONE - tax_rate) * debt_equity;
    if denom.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: "Hamada unlever denominator".into(),
        });
    }
    Ok(levered_beta / denom)
}

/// Re-lever a beta using the Hamada equation.
///
/// Beta_L = Beta_U * (1 + (1 - t) * D/E)
pub fn relever_beta(unlevered_beta: Decimal, tax_rate: Rate, debt_equity: Decimal) -> Decimal {
    unlevered_beta * (Decimal::ONE + (Decimal::ONE - tax_rate) * debt_equity)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub(crate) fn validate_capital_inputs(input: &CapitalStructureInputs) -> EngineResult<()> {
    let rates = [
        ("capital.risk_free_rate", input.risk_free_rate),
        ("capital.equity_risk_premium", input.equity_risk_premium),
        ("capital.size_premium", input.size_premium),
        ("capital.specific_premium", input.specific_premium),
        ("capital.cost_of_debt", input.cost_of_debt),
    ];
    for (field, rate) in rates {
        if rate <= dec!(-1) || rate > Decimal::ONE {
            return Err(ValuationError::invalid(
                field,
                format!("Rate {rate} must be a fraction in (-1, 1]"),
            ));
        }
    }
    if input.beta <= Decimal::ZERO {
        return Err(ValuationError::invalid("capital.beta", "Beta must be positive"));
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate >= Decimal::ONE {
        return Err(ValuationError::invalid(
            "capital.tax_rate",
            "Tax rate must be in [0, 1)",
        ));
    }
    if input.target_debt_weight < Decimal::ZERO || input.target_debt_weight > Decimal::ONE {
        return Err(ValuationError::invalid(
            "capital.target_debt_weight",
            "Debt weight must be between 0 and 1",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
