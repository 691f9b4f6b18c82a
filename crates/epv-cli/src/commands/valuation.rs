use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use epv_core::valuation::epv::{self, EpvInput};
use epv_core::valuation::maintenance_capex::MaintenanceCapexModel;
use epv_core::valuation::wacc::{self, CapitalStructureInputs};

use crate::input;

/// Arguments for WACC calculation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct WaccArgs {
    /// Risk-free rate (e.g. 0.045 for 4.5%)
    #[arg(long)]
    pub risk_free_rate: Option<Decimal>,

    /// Equity risk premium (e.g. 0.055 for 5.5%)
    #[arg(long, alias = "erp")]
    pub equity_risk_premium: Option<Decimal>,

    /// Equity beta (unlevered when --relever is set)
    #[arg(long)]
    pub beta: Option<Decimal>,

    /// Small-company size premium
    #[arg(long)]
    pub size_premium: Option<Decimal>,

    /// Company-specific risk premium
    #[arg(long)]
    pub specific_risk: Option<Decimal>,

    /// Pre-tax cost of debt
    #[arg(long)]
    pub cost_of_debt: Option<Decimal>,

    /// Marginal corporate tax rate
    #[arg(long)]
    pub tax_rate: Option<Decimal>,

    /// Target debt weight in the capital structure
    #[arg(long)]
    pub debt_weight: Option<Decimal>,

    /// Re-lever beta to the target debt weight (Hamada)
    #[arg(long)]
    pub relever: bool,

    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_wacc(args: WaccArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let capital: CapitalStructureInputs = if args.input.is_some() {
        input::load(args.input.as_deref(), "WACC")?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        CapitalStructureInputs {
            risk_free_rate: args
                .risk_free_rate
                .ok_or("--risk-free-rate is required (or provide --input)")?,
            equity_risk_premium: args
                .equity_risk_premium
                .ok_or("--equity-risk-premium is required (or provide --input)")?,
            beta: args.beta.unwrap_or(dec!(1.0)),
            size_premium: args.size_premium.unwrap_or_default(),
            specific_premium: args.specific_risk.unwrap_or_default(),
            cost_of_debt: args
                .cost_of_debt
                .ok_or("--cost-of-debt is required (or provide --input)")?,
            tax_rate: args
                .tax_rate
                .ok_or("--tax-rate is required (or provide --input)")?,
            target_debt_weight: args
                .debt_weight
                .ok_or("--debt-weight is required (or provide --input)")?,
            relever: args.relever,
        }
    };

    let result = wacc::calculate_wacc(&capital)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for a standalone EPV calculation
#[derive(Args)]
pub struct EpvArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Annual revenue
    #[arg(long)]
    pub revenue: Option<Decimal>,

    /// Normalized EBIT
    #[arg(long)]
    pub ebit: Option<Decimal>,

    /// Tax rate
    #[arg(long)]
    pub tax_rate: Option<Decimal>,

    /// Discount rate (WACC)
    #[arg(long)]
    pub wacc: Option<Decimal>,

    /// Depreciation & amortization
    #[arg(long)]
    pub da: Option<Decimal>,

    /// Maintenance capex as a fraction of revenue
    #[arg(long)]
    pub capex_pct: Option<Decimal>,

    /// Cash on hand
    #[arg(long)]
    pub cash: Option<Decimal>,

    /// Debt outstanding
    #[arg(long)]
    pub debt: Option<Decimal>,
}

pub fn run_epv(args: EpvArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let epv_input: EpvInput = if args.input.is_some() {
        input::load(args.input.as_deref(), "EPV")?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        EpvInput {
            revenue: args
                .revenue
                .ok_or("--revenue is required (or provide --input)")?,
            ebit: args.ebit.ok_or("--ebit is required (or provide --input)")?,
            tax_rate: args
                .tax_rate
                .ok_or("--tax-rate is required (or provide --input)")?,
            depreciation_amortization: args.da.unwrap_or_default(),
            maintenance_capex: MaintenanceCapexModel::PercentOfRevenue {
                pct: args.capex_pct.unwrap_or_default(),
            },
            locations: 1,
            wacc: args.wacc.ok_or("--wacc is required (or provide --input)")?,
            cash: args.cash.unwrap_or_default(),
            debt: args.debt.unwrap_or_default(),
            reproduction_value: None,
        }
    };

    let result = epv::calculate_epv(&epv_input)?;
    Ok(serde_json::to_value(result)?)
}
