use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::monte_carlo::simulation::SimulationConfig;
use crate::normalization::bridge::{NormalizationAdjustment, NormalizationPolicy};
use crate::operations::pnl::{OperatingModel, ReportedPnl};
use crate::pe::lbo::{EntryValuation, FreeCashFlowModel};
use crate::scenarios::scenario::{ScenarioCase, ScenarioSelection};
use crate::scenarios::sensitivity::SensitivityVariable;
use crate::types::{Money, Multiple, Rate};
use crate::valuation::maintenance_capex::MaintenanceCapexModel;
use crate::valuation::net_debt::NetDebtMethod;
use crate::valuation::wacc::CapitalStructureInputs;
use crate::EngineResult;

/// Where the P&L comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PnlSource {
    /// Built from service lines and a cost structure
    Operating(OperatingModel),
    /// Taken as reported
    Reported(ReportedPnl),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizationConfig {
    #[serde(default)]
    pub policy: NormalizationPolicy,
    #[serde(default)]
    pub adjustments: Vec<NormalizationAdjustment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpvAssumptions {
    /// Overrides the P&L's D&A when set
    #[serde(default)]
    pub depreciation_amortization: Option<Money>,
    #[serde(default)]
    pub maintenance_capex: MaintenanceCapexModel,
    #[serde(default)]
    pub net_debt: NetDebtMethod,
    #[serde(default)]
    pub reproduction_value: Option<Money>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Scenario that downstream views (simulation, sensitivity) run on
    #[serde(default)]
    pub selection: ScenarioSelection,
    /// Scenarios to compare; empty means Bear / Base / Bull
    #[serde(default)]
    pub compare: Vec<ScenarioCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoWayGrid {
    pub variable_1: SensitivityVariable,
    pub variable_2: SensitivityVariable,
}

fn default_swing() -> Rate {
    dec!(0.10)
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityConfig {
    #[serde(default)]
    pub one_way: Vec<SensitivityVariable>,
    #[serde(default)]
    pub two_way: Vec<TwoWayGrid>,
    #[serde(default = "default_true")]
    pub tornado: bool,
    #[serde(default = "default_swing")]
    pub tornado_swing_pct: Rate,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        SensitivityConfig {
            one_way: Vec::new(),
            two_way: Vec::new(),
            tornado: true,
            tornado_swing_pct: default_swing(),
        }
    }
}

fn default_sweep() -> Rate {
    Decimal::ONE
}

/// LBO terms. Entry EBITDA and the seller's net debt come from the case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboConfig {
    pub entry: EntryValuation,
    pub debt_weight: Rate,
    pub interest_rate: Rate,
    #[serde(default)]
    pub amortization_pct: Rate,
    #[serde(default = "default_sweep")]
    pub sweep_pct: Rate,
    #[serde(default)]
    pub ebitda_growth: Rate,
    pub free_cash_flow: FreeCashFlowModel,
    #[serde(default)]
    pub distribute_residual_cash: bool,
    pub hold_years: u32,
    pub exit_multiple: Multiple,
    #[serde(default)]
    pub transaction_fees: Money,
    #[serde(default)]
    pub rollover_equity: Money,
}

/// Deal terms. EBITDA and net debt come from the case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealConfig {
    pub multiple: Multiple,
    pub cash_pct: Rate,
}

fn default_locations() -> u32 {
    1
}

/// Everything needed to value one business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialCase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_locations")]
    pub locations: u32,
    pub pnl: PnlSource,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    pub capital: CapitalStructureInputs,
    #[serde(default)]
    pub epv: EpvAssumptions,
    #[serde(default)]
    pub scenario: ScenarioConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<SensitivityConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lbo: Option<LboConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal: Option<DealConfig>,
}

impl FinancialCase {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
