use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::operations::pnl::PnlLines;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Direction of an adjustment relative to reported EBITDA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentSign {
    /// Increases EBITDA (expense removed)
    AddBack,
    /// Decreases EBITDA (expense added)
    Deduction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentCategory {
    OwnerCompensation,
    Marketing,
    InterestReclass,
    RentReset,
    OneTime,
    #[default]
    Other,
}

/// One line of the EBITDA bridge. `amount` is a non-negative magnitude;
/// direction comes from `sign`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationAdjustment {
    pub label: String,
    pub amount: Money,
    pub sign: AdjustmentSign,
    #[serde(default)]
    pub category: AdjustmentCategory,
}

impl NormalizationAdjustment {
    /// Build an adjustment from a signed EBITDA effect.
    pub fn from_signed(label: impl Into<String>, effect: Money, category: AdjustmentCategory) -> Self {
        let sign = if effect < Decimal::ZERO {
            AdjustmentSign::Deduction
        } else {
            AdjustmentSign::AddBack
        };
        NormalizationAdjustment {
            label: label.into(),
            amount: effect.abs(),
            sign,
            category,
        }
    }

    /// Effect on EBITDA: positive for add-backs, negative for deductions.
    pub fn signed_amount(&self) -> Money {
        match self.sign {
            AdjustmentSign::AddBack => self.amount,
            AdjustmentSign::Deduction => -self.amount,
        }
    }
}

/// Standard normalizations derived from the P&L rather than typed in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizationPolicy {
    /// Normalize marketing to this fraction of revenue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marketing_target_pct: Option<Rate>,
    /// Add back interest expense that was booked above EBITDA
    #[serde(default)]
    pub reclass_interest: bool,
    /// Market-rate replacement compensation for the owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_market_compensation: Option<Money>,
    /// Market rent the business would pay at arm's length
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_rent: Option<Money>,
}

/// Input for the EBITDA bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationInput {
    pub pnl: PnlLines,
    #[serde(default)]
    pub policy: NormalizationPolicy,
    /// Explicit items (one-time costs etc.), applied after the policy items
    #[serde(default)]
    pub adjustments: Vec<NormalizationAdjustment>,
}

/// A single step of the bridge walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStep {
    pub label: String,
    pub category: AdjustmentCategory,
    /// Signed EBITDA effect
    pub amount: Money,
    /// EBITDA after this step
    pub running_ebitda: Money,
}

/// Ordered walk from reported to normalized EBITDA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EbitdaBridge {
    pub revenue: Money,
    pub reported_ebitda: Money,
    pub steps: Vec<BridgeStep>,
    pub total_adjustments: Money,
    pub normalized_ebitda: Money,
    pub normalized_margin: Rate,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Walk reported EBITDA to normalized EBITDA.
///
/// Policy items come first (marketing to target, interest reclass, owner
/// compensation to market, rent reset), then explicit adjustments in the
/// order given. Every step is reported individually.
pub fn build_ebitda_bridge(
    input: &NormalizationInput,
) -> EngineResult<ComputationOutput<EbitdaBridge>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_normalization_input(input)?;

    let pnl = &input.pnl;
    let mut adjustments = derive_policy_adjustments(pnl, &input.policy, &mut warnings);
    adjustments.extend(input.adjustments.iter().cloned());

    let mut running = pnl.ebitda;
    let mut steps = Vec::with_capacity(adjustments.len());
    for adj in &adjustments {
        let amount = adj.signed_amount();
        running += amount;
        steps.push(BridgeStep {
            label: adj.label.clone(),
            category: adj.category,
            amount,
            running_ebitda: running,
        });
    }

    let total_adjustments: Money = steps.iter().map(|s| s.amount).sum();
    let normalized_ebitda = pnl.ebitda + total_adjustments;
    let normalized_margin = if pnl.revenue.is_zero() {
        Decimal::ZERO
    } else {
        normalized_ebitda / pnl.revenue
    };

    if normalized_ebitda <= Decimal::ZERO {
        warnings.push(format!(
            "Normalized EBITDA of {normalized_ebitda} is not positive; earnings power is nil"
        ));
    }

    let output = EbitdaBridge {
        revenue: pnl.revenue,
        reported_ebitda: pnl.ebitda,
        steps,
        total_adjustments,
        normalized_ebitda,
        normalized_margin,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "EBITDA normalization bridge",
        &serde_json::json!({
            "reported_ebitda": pnl.ebitda.to_string(),
            "policy": input.policy,
            "explicit_adjustments": input.adjustments.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Marketing normalization: the under-spend `target × revenue − actual`.
/// The EBITDA effect is its negation.
pub fn marketing_normalization(revenue: Money, actual_spend: Money, target_pct: Rate) -> Money {
    target_pct * revenue - actual_spend
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn derive_policy_adjustments(
    pnl: &PnlLines,
    policy: &NormalizationPolicy,
    warnings: &mut Vec<String>,
) -> Vec<NormalizationAdjustment> {
    let mut out = Vec::new();

    if let Some(target) = policy.marketing_target_pct {
        let under_spend = marketing_normalization(pnl.revenue, pnl.marketing_spend, target);
        if !under_spend.is_zero() {
            out.push(NormalizationAdjustment::from_signed(
                format!("Marketing normalized to {}% of revenue", (target * Decimal::ONE_HUNDRED).normalize()),
                -under_spend,
                AdjustmentCategory::Marketing,
            ));
        }
    }

    if policy.reclass_interest {
        if pnl.interest_in_opex.is_zero() {
            warnings.push("Interest reclass requested but no interest is booked above EBITDA".into());
        } else {
            out.push(NormalizationAdjustment::from_signed(
                "Interest expense reclassified below EBITDA",
                pnl.interest_in_opex,
                AdjustmentCategory::InterestReclass,
            ));
        }
    }

    if let Some(market) = policy.owner_market_compensation {
        let excess = pnl.owner_compensation - market;
        if !excess.is_zero() {
            out.push(NormalizationAdjustment::from_signed(
                "Owner compensation to market rate",
                excess,
                AdjustmentCategory::OwnerCompensation,
            ));
        }
    }

    if let Some(market) = policy.market_rent {
        let excess = pnl.rent_expense - market;
        if !excess.is_zero() {
            out.push(NormalizationAdjustment::from_signed(
                "Rent reset to market",
                excess,
                AdjustmentCategory::RentReset,
            ));
        }
    }

    out
}

fn validate_normalization_input(input: &NormalizationInput) -> EngineResult<()> {
    if let Some(target) = input.policy.marketing_target_pct {
        if target < Decimal::ZERO || target > Decimal::ONE {
            return Err(ValuationError::invalid(
                "normalization.policy.marketing_target_pct",
                "Marketing target must be between 0 and 1",
            ));
        }
    }
    if let Some(comp) = input.policy.owner_market_compensation {
        if comp < Decimal::ZERO {
            return Err(ValuationError::invalid(
                "normalization.policy.owner_market_compensation",
                "Market compensation cannot be negative",
            ));
        }
    }
    if let Some(rent) = input.policy.market_rent {
        if rent < Decimal::ZERO {
            return Err(ValuationError::invalid(
                "normalization.policy.market_rent",
                "Market rent cannot be negative",
            ));
        }
    }
    for adj in &input.adjustments {
        if adj.amount < Decimal::ZERO {
            return Err(ValuationError::invalid(
                format!("normalization.adjustments[{}]", adj.label),
                "Adjustment amount is a magnitude; use `sign` for direction",
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
