use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::*;
use crate::EngineResult;

/// Acquisition debt repaid by scheduled amortization plus a cash sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepScheduleInput {
    /// Debt drawn at entry
    pub entry_debt: Money,
    pub interest_rate: Rate,
    /// Scheduled amortization per year as a fraction of entry debt
    #[serde(default)]
    pub amortization_pct: Rate,
    /// Share of post-amortization cash applied to prepayment
    pub sweep_pct: Rate,
    /// Free cash flow before debt service, one per year
    pub free_cash_flows: Vec<Money>,
}

/// A single year in the debt schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtPeriod {
    pub year: u32,
    pub opening_balance: Money,
    pub interest: Money,
    pub free_cash_flow: Money,
    /// FCF after interest
    pub available_cash: Money,
    pub scheduled_amortization: Money,
    pub cash_sweep: Money,
    pub closing_balance: Money,
    /// Cash left after interest, amortization and sweep (negative = shortfall)
    pub residual_cash: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtScheduleOutput {
    pub periods: Vec<DebtPeriod>,
    pub total_interest_paid: Money,
    pub total_principal_paid: Money,
    pub final_balance: Money,
}

/// Build a year-by-year schedule.
///
/// interest = opening * rate
/// amort    = min(opening, amortization_pct * entry_debt)
/// sweep    = min(opening - amort, sweep_pct * max(0, FCF - interest - amort))
/// closing  = opening - amort - sweep
pub fn build_sweep_schedule(
    input: &SweepScheduleInput,
) -> EngineResult<ComputationOutput<DebtScheduleOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_schedule_input(input)?;

    let scheduled = input.entry_debt * input.amortization_pct;
    let mut periods = Vec::with_capacity(input.free_cash_flows.len());
    let mut balance = input.entry_debt;
    let mut total_interest_paid = Decimal::ZERO;
    let mut total_principal_paid = Decimal::ZERO;

    for (i, fcf) in input.free_cash_flows.iter().enumerate() {
        let year = i as u32 + 1;
        let opening = balance;
        let interest = opening * input.interest_rate;
        let available_cash = *fcf - interest;

        let amortization = scheduled.min(opening);
        let excess = (available_cash - amortization).max(Decimal::ZERO);
        let sweep = (input.sweep_pct * excess).min(opening - amortization);
        let closing = opening - amortization - sweep;
        let residual_cash = available_cash - amortization - sweep;

        if residual_cash < Decimal::ZERO {
            warnings.push(format!(
                "Year {year}: debt service exceeds free cash flow by {}",
                (-residual_cash).round_dp(0)
            ));
        }

        total_interest_paid += interest;
        total_principal_paid += amortization + sweep;
        balance = closing;

        periods.push(DebtPeriod {
            year,
            opening_balance: opening,
            interest,
            free_cash_flow: *fcf,
            available_cash,
            scheduled_amortization: amortization,
            cash_sweep: sweep,
            closing_balance: closing,
            residual_cash,
        });
    }

    let output = DebtScheduleOutput {
        periods,
        total_interest_paid,
        total_principal_paid,
        final_balance: balance,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Acquisition debt schedule (amortization + cash sweep)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

fn validate_schedule_input(input: &SweepScheduleInput) -> EngineResult<()> {
    if input.entry_debt < Decimal::ZERO {
        return Err(ValuationError::invalid("entry_debt", "Debt cannot be negative"));
    }
    if input.interest_rate < Decimal::ZERO {
        return Err(ValuationError::invalid(
            "interest_rate",
            "Interest rate cannot be negative",
        ));
    }
    for (field, v) in [
        ("amortization_pct", input.amortization_pct),
        ("sweep_pct", input.sweep_pct),
    ] {
        if v < Decimal::ZERO || v > Decimal::ONE {
            return Err(ValuationError::invalid(field, "Must be between 0 and 1"));
        }
    }
    if input.free_cash_flows.is_empty() {
        return Err(ValuationError::InsufficientData(
            "At least one year of free cash flow is required".into(),
        ));
    }
    Ok(())
}
