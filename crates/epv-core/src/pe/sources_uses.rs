use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::*;
use crate::EngineResult;

/// Entry funding. Sponsor equity is the plug that balances the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesUsesInput {
    /// Purchase enterprise value
    pub enterprise_value: Money,
    /// Seller's net debt repaid out of the purchase price
    #[serde(default)]
    pub existing_net_debt: Money,
    /// New acquisition debt
    pub new_debt: Money,
    /// Equity rolled over by the seller
    #[serde(default)]
    pub rollover_equity: Money,
    #[serde(default)]
    pub transaction_fees: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingLine {
    pub label: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesUsesOutput {
    pub sources: Vec<FundingLine>,
    pub uses: Vec<FundingLine>,
    pub total_sources: Money,
    pub total_uses: Money,
    pub sponsor_equity: Money,
    /// EV less the seller's net debt
    pub equity_to_seller: Money,
}

fn line(label: &str, amount: Money) -> FundingLine {
    FundingLine {
        label: label.to_string(),
        amount,
    }
}

/// Sources & uses of funds at entry.
///
/// Uses: equity purchase (EV - existing net debt), net debt refinanced, fees.
/// Sources: new debt, seller rollover, sponsor equity (plug).
pub fn build_sources_uses(
    input: &SourcesUsesInput,
) -> EngineResult<ComputationOutput<SourcesUsesOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.enterprise_value <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "enterprise_value",
            "Enterprise value must be positive",
        ));
    }
    for (field, v) in [
        ("new_debt", input.new_debt),
        ("rollover_equity", input.rollover_equity),
        ("transaction_fees", input.transaction_fees),
    ] {
        if v < Decimal::ZERO {
            return Err(ValuationError::invalid(field, "Cannot be negative"));
        }
    }

    let equity_to_seller = input.enterprise_value - input.existing_net_debt;
    if equity_to_seller < Decimal::ZERO {
        warnings.push("Existing net debt exceeds enterprise value; seller equity is negative".into());
    }

    let mut uses = vec![line("Purchase of equity", equity_to_seller)];
    if !input.existing_net_debt.is_zero() {
        uses.push(line("Refinance existing net debt", input.existing_net_debt));
    }
    if input.transaction_fees > Decimal::ZERO {
        uses.push(line("Transaction fees", input.transaction_fees));
    }
    let total_uses: Money = uses.iter().map(|l| l.amount).sum();

    let sponsor_equity = total_uses - input.new_debt - input.rollover_equity;
    if sponsor_equity <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "new_debt",
            "Debt and rollover fund the entire purchase; sponsor equity must be positive",
        ));
    }

    let mut sources = vec![line("Acquisition debt", input.new_debt)];
    if input.rollover_equity > Decimal::ZERO {
        sources.push(line("Seller rollover", input.rollover_equity));
    }
    sources.push(line("Sponsor equity", sponsor_equity));
    let total_sources: Money = sources.iter().map(|l| l.amount).sum();

    let output = SourcesUsesOutput {
        sources,
        uses,
        total_sources,
        total_uses,
        sponsor_equity,
        equity_to_seller,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sources & Uses of Funds",
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
    fn test_sponsor_equity_plug() {
        let out = build_sources_uses(&SourcesUsesInput {
            enterprise_value: dec!(5000),
            existing_net_debt: dec!(1500),
            new_debt: dec!(3000),
            rollover_equity: Decimal::ZERO,
            transaction_fees: dec!(100),
        })
        .unwrap()
        .result;
        assert_eq!(out.equity_to_seller, dec!(3500));
        assert_eq!(out.total_uses, dec!(5100));
        assert_eq!(out.sponsor_equity, dec!(2100));
        assert_eq!(out.total_sources, out.total_uses);
    }

    #[test]
    fn test_fully_debt_funded_rejected() {
        let res = build_sources_uses(&SourcesUsesInput {
            enterprise_value: dec!(1000),
            existing_net_debt: Decimal::ZERO,
            new_debt: dec!(1000),
            rollover_equity: Decimal::ZERO,
            transaction_fees: Decimal::ZERO,
        });
        assert!(res.is_err());
    }
}
