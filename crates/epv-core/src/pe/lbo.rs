use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::pe::debt_schedule::{self, DebtPeriod, SweepScheduleInput};
use crate::pe::sources_uses::{self, SourcesUsesInput, SourcesUsesOutput};
use crate::time_value;
use crate::types::*;
use crate::EngineResult;

/// How the purchase enterprise value is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum EntryValuation {
    Direct { enterprise_value: Money },
    /// Multiple of normalized (entry) EBITDA
    Multiple { multiple: Multiple },
}

/// Where each year's free cash flow before debt service comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum FreeCashFlowModel {
    /// One value per hold year
    Explicit { flows: Vec<Money> },
    /// Projected EBITDA * conversion
    Conversion { conversion: Rate },
}

/// Input for a single-tranche LBO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboInput {
    // Entry
    pub entry: EntryValuation,
    /// Normalized EBITDA at entry
    pub entry_ebitda: Money,
    /// Seller's net debt at entry (reported, not assumed)
    #[serde(default)]
    pub existing_net_debt: Money,
    #[serde(default)]
    pub transaction_fees: Money,
    /// Seller equity rolled into the new company alongside the sponsor
    #[serde(default)]
    pub rollover_equity: Money,

    // Financing
    /// Acquisition debt as a share of entry EV
    pub debt_weight: Rate,
    pub interest_rate: Rate,
    #[serde(default)]
    pub amortization_pct: Rate,
    #[serde(default = "default_sweep")]
    pub sweep_pct: Rate,

    // Operations
    /// Constant annual EBITDA growth
    #[serde(default)]
    pub ebitda_growth: Rate,
    pub free_cash_flow: FreeCashFlowModel,
    /// Pay residual cash to the sponsor each year instead of retaining it
    #[serde(default)]
    pub distribute_residual_cash: bool,

    // Exit
    pub hold_years: u32,
    pub exit_multiple: Multiple,
}

fn default_sweep() -> Rate {
    Decimal::ONE
}

/// A single year in the LBO projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboYear {
    pub year: u32,
    pub ebitda: Money,
    pub free_cash_flow: Money,
    pub interest: Money,
    pub scheduled_amortization: Money,
    pub cash_sweep: Money,
    pub closing_debt: Money,
    pub distribution: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrMethod {
    /// (exit / entry)^(1/years) - 1
    ClosedForm,
    /// Newton-Raphson with bisection fallback
    RootFinding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboOutput {
    pub entry_ev: Money,
    pub entry_debt: Money,
    pub sponsor_equity: Money,
    pub rollover_equity: Money,
    /// Sponsor share of the equity; rollover holds the rest pro rata
    pub sponsor_ownership: Rate,
    /// Entry EV less the seller's net debt
    pub equity_to_seller: Money,
    pub sources_uses: SourcesUsesOutput,
    pub projections: Vec<LboYear>,
    pub debt_schedule: Vec<DebtPeriod>,
    pub exit_ebitda: Money,
    pub exit_ev: Money,
    pub final_debt: Money,
    pub exit_equity: Money,
    /// Residual cash kept on balance sheet (not in exit equity)
    pub retained_cash: Money,
    pub total_distributions: Money,
    /// Sponsor share of exit equity plus distributions
    pub sponsor_proceeds: Money,
    pub moic: Multiple,
    pub irr: Rate,
    pub irr_method: IrrMethod,
    pub entry_leverage: Multiple,
    pub exit_leverage: Multiple,
}

/// Build the LBO from entry through exit.
///
/// entry debt = EV * debt_weight; sponsor equity = EV + fees - entry debt - rollover.
/// exit equity = exit EBITDA * exit multiple - final debt.
/// Sponsor and rollover share exit equity and distributions pro rata, so
/// MOIC = (exit equity + distributions) / (sponsor equity + rollover).
pub fn build_lbo(input: &LboInput) -> EngineResult<ComputationOutput<LboOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_lbo_input(input)?;

    // --- Entry ---
    let entry_ev = match &input.entry {
        EntryValuation::Direct { enterprise_value } => *enterprise_value,
        EntryValuation::Multiple { multiple } => input.entry_ebitda * multiple,
    };
    if entry_ev <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "entry",
            "Entry enterprise value must be positive",
        ));
    }
    let entry_debt = entry_ev * input.debt_weight;
    if input.rollover_equity > entry_ev - input.existing_net_debt {
        return Err(ValuationError::invalid(
            "rollover_equity",
            "Rollover cannot exceed the equity paid to the seller",
        ));
    }

    let su = sources_uses::build_sources_uses(&SourcesUsesInput {
        enterprise_value: entry_ev,
        existing_net_debt: input.existing_net_debt,
        new_debt: entry_debt,
        rollover_equity: input.rollover_equity,
        transaction_fees: input.transaction_fees,
    })?;
    warnings.extend(su.warnings);
    let sources_uses = su.result;
    let sponsor_equity = sources_uses.sponsor_equity;
    let total_equity = sponsor_equity + input.rollover_equity;
    let sponsor_ownership = sponsor_equity / total_equity;

    // --- Operating projection ---
    let years = input.hold_years as usize;
    let mut ebitda_path = Vec::with_capacity(years);
    let mut ebitda = input.entry_ebitda;
    for _ in 0..years {
        ebitda *= Decimal::ONE + input.ebitda_growth;
        ebitda_path.push(ebitda);
    }

    let free_cash_flows: Vec<Money> = match &input.free_cash_flow {
        FreeCashFlowModel::Explicit { flows } => {
            if flows.len() > years {
                warnings.push(format!(
                    "{} free cash flows given; only the first {years} are used",
                    flows.len()
                ));
            }
            flows.iter().take(years).copied().collect()
        }
        FreeCashFlowModel::Conversion { conversion } => {
            ebitda_path.iter().map(|e| e * conversion).collect()
        }
    };

    // --- Debt ---
    let schedule = debt_schedule::build_sweep_schedule(&SweepScheduleInput {
        entry_debt,
        interest_rate: input.interest_rate,
        amortization_pct: input.amortization_pct,
        sweep_pct: input.sweep_pct,
        free_cash_flows,
    })?;
    for w in schedule.warnings {
        warnings.push(format!("Debt schedule: {w}"));
    }
    let periods = schedule.result.periods;
    let final_debt = schedule.result.final_balance;

    let mut projections = Vec::with_capacity(years);
    let mut total_distributions = Decimal::ZERO;
    let mut retained_cash = Decimal::ZERO;
    for (p, e) in periods.iter().zip(ebitda_path.iter()) {
        let residual = p.residual_cash.max(Decimal::ZERO);
        let distribution = if input.distribute_residual_cash {
            residual
        } else {
            retained_cash += residual;
            Decimal::ZERO
        };
        total_distributions += distribution;
        projections.push(LboYear {
            year: p.year,
            ebitda: *e,
            free_cash_flow: p.free_cash_flow,
            interest: p.interest,
            scheduled_amortization: p.scheduled_amortization,
            cash_sweep: p.cash_sweep,
            closing_debt: p.closing_balance,
            distribution,
        });
    }

    // --- Exit ---
    let exit_ebitda = ebitda_path.last().copied().unwrap_or(input.entry_ebitda);
    let exit_ev = exit_ebitda * input.exit_multiple;
    let exit_equity = exit_ev - final_debt;
    if exit_equity <= Decimal::ZERO {
        warnings.push("Exit equity is not positive; sponsor equity is wiped out".into());
    }
    if !input.distribute_residual_cash && retained_cash > Decimal::ZERO {
        warnings.push(format!(
            "Retained cash of {} is excluded from exit equity",
            retained_cash.round_dp(0)
        ));
    }

    // --- Returns ---
    let moic = (exit_equity + total_distributions) / total_equity;
    let sponsor_proceeds = (exit_equity + total_distributions) * sponsor_ownership;

    let (irr, irr_method) = if total_distributions.is_zero() {
        let irr = if exit_equity <= Decimal::ZERO {
            dec!(-1)
        } else {
            time_value::single_flow_irr(total_equity, exit_equity, input.hold_years)?
        };
        (irr, IrrMethod::ClosedForm)
    } else {
        let mut flows = Vec::with_capacity(years + 1);
        flows.push(-total_equity);
        flows.extend(projections.iter().map(|y| y.distribution));
        if let Some(last) = flows.last_mut() {
            *last += exit_equity;
        }
        (time_value::irr(&flows, dec!(0.15))?, IrrMethod::RootFinding)
    };

    let entry_leverage = if input.entry_ebitda.is_zero() {
        Decimal::ZERO
    } else {
        entry_debt / input.entry_ebitda
    };
    let exit_leverage = if exit_ebitda.is_zero() {
        warnings.push("Exit EBITDA is zero; exit leverage undefined".into());
        Decimal::ZERO
    } else {
        final_debt / exit_ebitda
    };

    let output = LboOutput {
        entry_ev,
        entry_debt,
        sponsor_equity,
        rollover_equity: input.rollover_equity,
        sponsor_ownership,
        equity_to_seller: sources_uses.equity_to_seller,
        sources_uses,
        projections,
        debt_schedule: periods,
        exit_ebitda,
        exit_ev,
        final_debt,
        exit_equity,
        retained_cash,
        total_distributions,
        sponsor_proceeds,
        moic,
        irr,
        irr_method,
        entry_leverage,
        exit_leverage,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Leveraged Buyout (amortization + cash sweep, exit at multiple)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub(crate) fn validate_lbo_input(input: &LboInput) -> EngineResult<()> {
    if input.hold_years == 0 {
        return Err(ValuationError::invalid(
            "hold_years",
            "Hold period must be at least 1 year",
        ));
    }
    match &input.entry {
        EntryValuation::Direct { enterprise_value } => {
            if *enterprise_value <= Decimal::ZERO {
                return Err(ValuationError::invalid(
                    "entry.enterprise_value",
                    "Entry enterprise value must be positive",
                ));
            }
        }
        EntryValuation::Multiple { multiple } => {
            if *multiple <= Decimal::ZERO {
                return Err(ValuationError::invalid(
                    "entry.multiple",
                    "Entry multiple must be positive",
                ));
            }
            if input.entry_ebitda <= Decimal::ZERO {
                return Err(ValuationError::invalid(
                    "entry_ebitda",
                    "Entry EBITDA must be positive to price at a multiple",
                ));
            }
        }
    }
    if input.debt_weight < Decimal::ZERO || input.debt_weight >= Decimal::ONE {
        return Err(ValuationError::invalid(
            "debt_weight",
            "Debt weight must be within [0, 1)",
        ));
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
    if input.ebitda_growth <= dec!(-1) {
        return Err(ValuationError::invalid(
            "ebitda_growth",
            "Growth must exceed -100%",
        ));
    }
    if input.exit_multiple <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "exit_multiple",
            "Exit multiple must be positive",
        ));
    }
    for (field, v) in [
        ("transaction_fees", input.transaction_fees),
        ("rollover_equity", input.rollover_equity),
    ] {
        if v < Decimal::ZERO {
            return Err(ValuationError::invalid(field, "Cannot be negative"));
        }
    }
    match &input.free_cash_flow {
        FreeCashFlowModel::Explicit { flows } => {
            if flows.len() < input.hold_years as usize {
                return Err(ValuationError::invalid(
                    "free_cash_flow.flows",
                    format!(
                        "{} flows given for a {}-year hold",
                        flows.len(),
                        input.hold_years
                    ),
                ));
            }
        }
        FreeCashFlowModel::Conversion { conversion } => {
            if *conversion < Decimal::ZERO || *conversion > Decimal::ONE {
                return Err(ValuationError::invalid(
                    "free_cash_flow.conversion",
                    "Conversion must be between 0 and 1",
                ));
            }
        }
    }
    Ok(())
}
