use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::*;
use crate::valuation::drivers::{evaluate, ValuationDrivers, ValuationResult};
use crate::EngineResult;

/// Multiplicative adjustment applied to the base drivers.
///
/// revenue' = revenue * revenue_multiplier
/// ebit'    = ebit * ebit_multiplier * revenue_multiplier
/// wacc'    = wacc + wacc_delta
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioAdjustment {
    pub revenue_multiplier: Multiple,
    pub ebit_multiplier: Multiple,
    pub wacc_delta: Rate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetName {
    Base,
    Bull,
    Bear,
}

const PRESETS: [(PresetName, ScenarioAdjustment); 3] = [
    (
        PresetName::Base,
        ScenarioAdjustment {
            revenue_multiplier: dec!(1.00),
            ebit_multiplier: dec!(1.00),
            wacc_delta: dec!(0.000),
        },
    ),
    (
        PresetName::Bull,
        ScenarioAdjustment {
            revenue_multiplier: dec!(1.10),
            ebit_multiplier: dec!(1.05),
            wacc_delta: dec!(-0.010),
        },
    ),
    (
        PresetName::Bear,
        ScenarioAdjustment {
            revenue_multiplier: dec!(0.85),
            ebit_multiplier: dec!(0.90),
            wacc_delta: dec!(0.020),
        },
    ),
];

impl PresetName {
    pub fn adjustment(&self) -> ScenarioAdjustment {
        PRESETS
            .iter()
            .find(|(name, _)| name == self)
            .map(|(_, adj)| *adj)
            .unwrap_or(ScenarioAdjustment::IDENTITY)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PresetName::Base => "Base",
            PresetName::Bull => "Bull",
            PresetName::Bear => "Bear",
        }
    }
}

impl ScenarioAdjustment {
    pub const IDENTITY: ScenarioAdjustment = ScenarioAdjustment {
        revenue_multiplier: Decimal::ONE,
        ebit_multiplier: Decimal::ONE,
        wacc_delta: Decimal::ZERO,
    };
}

/// Which scenario to value: a preset from the table or a custom record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioSelection {
    Preset(PresetName),
    Custom {
        name: String,
        adjustment: ScenarioAdjustment,
    },
}

impl Default for ScenarioSelection {
    fn default() -> Self {
        ScenarioSelection::Preset(PresetName::Base)
    }
}

impl ScenarioSelection {
    pub fn name(&self) -> &str {
        match self {
            ScenarioSelection::Preset(p) => p.label(),
            ScenarioSelection::Custom { name, .. } => name,
        }
    }

    pub fn adjustment(&self) -> ScenarioAdjustment {
        match self {
            ScenarioSelection::Preset(p) => p.adjustment(),
            ScenarioSelection::Custom { adjustment, .. } => *adjustment,
        }
    }
}

/// Bear, Base, Bull in that order.
pub fn standard_scenarios() -> Vec<ScenarioCase> {
    [PresetName::Bear, PresetName::Base, PresetName::Bull]
        .into_iter()
        .map(|p| ScenarioCase {
            selection: ScenarioSelection::Preset(p),
            probability: None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Return new drivers with the adjustment applied. The base is untouched.
pub fn apply_scenario(
    base: &ValuationDrivers,
    adjustment: &ScenarioAdjustment,
) -> EngineResult<ValuationDrivers> {
    validate_adjustment(adjustment)?;

    let wacc = base.wacc + adjustment.wacc_delta;
    if wacc <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "scenario.wacc_delta",
            format!("Adjusted WACC of {wacc} is not positive"),
        ));
    }

    let mut next = base.clone();
    next.revenue = base.revenue * adjustment.revenue_multiplier;
    next.ebit = base.ebit * adjustment.ebit_multiplier * adjustment.revenue_multiplier;
    next.wacc = wacc;
    Ok(next)
}

pub(crate) fn validate_adjustment(adjustment: &ScenarioAdjustment) -> EngineResult<()> {
    if adjustment.revenue_multiplier < Decimal::ZERO {
        return Err(ValuationError::invalid(
            "scenario.revenue_multiplier",
            "Multiplier cannot be negative",
        ));
    }
    if adjustment.ebit_multiplier < Decimal::ZERO {
        return Err(ValuationError::invalid(
            "scenario.ebit_multiplier",
            "Multiplier cannot be negative",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCase {
    pub selection: ScenarioSelection,
    #[serde(default)]
    pub probability: Option<Rate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioComparisonInput {
    pub base: ValuationDrivers,
    /// Empty means Bear / Base / Bull
    #[serde(default)]
    pub scenarios: Vec<ScenarioCase>,
}

/// Valuation under one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioValuation {
    pub name: String,
    pub adjustment: ScenarioAdjustment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<Rate>,
    pub revenue: Money,
    pub ebit: Money,
    pub valuation: ValuationResult,
    pub deviation_from_base: Money,
    pub deviation_pct: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpvRange {
    pub low: Money,
    pub high: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub base: ValuationResult,
    pub scenarios: Vec<ScenarioValuation>,
    pub epv_range: EpvRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability_weighted_ev: Option<Money>,
}

/// Value the base drivers under one scenario.
pub fn evaluate_scenario(
    base: &ValuationDrivers,
    selection: &ScenarioSelection,
) -> EngineResult<(ValuationDrivers, ValuationResult)> {
    let drivers = apply_scenario(base, &selection.adjustment())?;
    let valuation = evaluate(&drivers)?;
    Ok((drivers, valuation))
}

/// Value each scenario, report its deviation from base, the EPV range and
/// (when every scenario carries a probability) the probability-weighted EV.
pub fn compare_scenarios(
    input: &ScenarioComparisonInput,
) -> EngineResult<ComputationOutput<ScenarioComparison>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let cases = if input.scenarios.is_empty() {
        standard_scenarios()
    } else {
        input.scenarios.clone()
    };

    let weighted = validate_probabilities(&cases, &mut warnings)?;
    for case in &cases {
        validate_adjustment(&case.selection.adjustment())?;
    }

    let base = evaluate(&input.base)?;
    let base_ev = base.enterprise_value;

    let mut scenarios = Vec::with_capacity(cases.len());
    let mut probability_weighted_ev = Decimal::ZERO;

    for case in &cases {
        let (drivers, valuation) = evaluate_scenario(&input.base, &case.selection)?;
        let deviation = valuation.enterprise_value - base_ev;
        let deviation_pct = if base_ev.is_zero() {
            if !deviation.is_zero() {
                warnings.push(format!(
                    "Base EV is zero; cannot compute deviation_pct for scenario '{}'",
                    case.selection.name()
                ));
            }
            Decimal::ZERO
        } else {
            deviation / base_ev
        };

        if let Some(p) = case.probability {
            probability_weighted_ev += p * valuation.enterprise_value;
        }

        scenarios.push(ScenarioValuation {
            name: case.selection.name().to_string(),
            adjustment: case.selection.adjustment(),
            probability: case.probability,
            revenue: drivers.revenue,
            ebit: drivers.ebit,
            valuation,
            deviation_from_base: deviation,
            deviation_pct,
        });
    }

    let low = scenarios
        .iter()
        .map(|s| s.valuation.enterprise_value)
        .min()
        .unwrap_or(base_ev);
    let high = scenarios
        .iter()
        .map(|s| s.valuation.enterprise_value)
        .max()
        .unwrap_or(base_ev);

    let output = ScenarioComparison {
        base,
        scenarios,
        epv_range: EpvRange { low, high },
        probability_weighted_ev: weighted.then_some(probability_weighted_ev),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Scenario comparison (multiplicative adjustments to base drivers)",
        &serde_json::json!({
            "num_scenarios": cases.len(),
            "base_wacc": input.base.wacc.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Either every scenario has a probability (summing to 1) or none does.
fn validate_probabilities(
    cases: &[ScenarioCase],
    warnings: &mut Vec<String>,
) -> EngineResult<bool> {
    let given = cases.iter().filter(|c| c.probability.is_some()).count();
    if given == 0 {
        return Ok(false);
    }
    if given != cases.len() {
        return Err(ValuationError::invalid(
            "scenarios.probability",
            "Either every scenario or none must carry a probability",
        ));
    }

    for c in cases {
        let p = c.probability.unwrap_or_default();
        if p < Decimal::ZERO || p > Decimal::ONE {
            return Err(ValuationError::invalid(
                format!("scenario:{} probability", c.selection.name()),
                "Probability must be between 0 and 1",
            ));
        }
    }

    let total: Decimal = cases.iter().filter_map(|c| c.probability).sum();
    let tolerance = dec!(0.001);
    if (total - Decimal::ONE).abs() > tolerance {
        return Err(ValuationError::invalid(
            "scenarios.probability",
            format!("Probabilities must sum to 1.0 (got {total})"),
        ));
    }
    if total != Decimal::ONE {
        warnings.push(format!(
            "Probabilities sum to {total}; treated as approximately 1.0"
        ));
    }
    Ok(true)
}
