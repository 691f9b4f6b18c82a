use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::*;
use crate::EngineResult;

/// Deal priced at a multiple of EBITDA with equity paid part cash, part rollover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealConsiderationInput {
    pub ebitda: Money,
    pub multiple: Multiple,
    pub net_debt: Money,
    /// Share of equity paid in cash; the rest is rolled over
    pub cash_pct: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealConsiderationOutput {
    pub enterprise_value: Money,
    pub net_debt: Money,
    pub equity_value: Money,
    /// Rounded to whole currency units
    pub cash_consideration: Money,
    /// Equity less cash, so the two always sum to equity
    pub rollover_equity: Money,
    pub cash_pct: Rate,
}

/// EV = EBITDA * multiple; equity = EV - net debt;
/// cash = round(equity * cash_pct); rollover = equity - cash.
pub fn calculate_deal_consideration(
    input: &DealConsiderationInput,
) -> EngineResult<ComputationOutput<DealConsiderationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.ebitda <= Decimal::ZERO {
        return Err(ValuationError::invalid("deal.ebitda", "EBITDA must be positive"));
    }
    if input.multiple <= Decimal::ZERO {
        return Err(ValuationError::invalid("deal.multiple", "Multiple must be positive"));
    }
    if input.cash_pct < Decimal::ZERO || input.cash_pct > Decimal::ONE {
        return Err(ValuationError::invalid(
            "deal.cash_pct",
            "Cash share must be between 0 and 1",
        ));
    }

    let enterprise_value = input.ebitda * input.multiple;
    let equity_value = enterprise_value - input.net_debt;
    if equity_value <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "deal.net_debt",
            format!("Net debt of {} leaves no equity to pay out", input.net_debt),
        ));
    }

    let cash_consideration = (equity_value * input.cash_pct)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let rollover_equity = equity_value - cash_consideration;

    if input.cash_pct < Decimal::new(5, 1) {
        warnings.push(format!(
            "Seller rolls over {} of equity; most consideration is at risk",
            Decimal::ONE - input.cash_pct
        ));
    }

    let output = DealConsiderationOutput {
        enterprise_value,
        net_debt: input.net_debt,
        equity_value,
        cash_consideration,
        rollover_equity,
        cash_pct: input.cash_pct,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Deal consideration at EV/EBITDA multiple",
        input,
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_seventy_thirty_split() {
        let out = calculate_deal_consideration(&DealConsiderationInput {
            ebitda: dec!(687626),
            multiple: dec!(7.0),
            net_debt: dec!(1948120),
            cash_pct: dec!(0.70),
        })
        .unwrap()
        .result;
        assert_eq!(out.enterprise_value, dec!(4813382));
        assert_eq!(out.equity_value, dec!(2865262));
        assert_eq!(out.cash_consideration, dec!(2005683));
        assert_eq!(out.rollover_equity, dec!(859579));
        assert_eq!(
            out.cash_consideration + out.rollover_equity,
            out.equity_value
        );
    }

    #[test]
    fn test_net_debt_above_ev_rejected() {
        let res = calculate_deal_consideration(&DealConsiderationInput {
            ebitda: dec!(100),
            multiple: dec!(5),
            net_debt: dec!(600),
            cash_pct: dec!(0.7),
        });
        assert!(res.is_err());
    }

    #[test]
    fn test_all_rollover() {
        let out = calculate_deal_consideration(&DealConsiderationInput {
            ebitda: dec!(100.25),
            multiple: dec!(6),
            net_debt: dec!(1.5),
            cash_pct: Decimal::ZERO,
        })
        .unwrap();
        assert_eq!(out.result.cash_consideration, Decimal::ZERO);
        assert_eq!(out.result.rollover_equity, dec!(600));
        assert_eq!(out.warnings.len(), 1);
    }
}
