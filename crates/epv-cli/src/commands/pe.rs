use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use epv_core::pe::consideration::{self, DealConsiderationInput};
use epv_core::pe::lbo::{self, LboInput};

use crate::input;

/// Arguments for LBO model
#[derive(Args)]
pub struct LboArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_lbo(args: LboArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let lbo_input: LboInput = input::load(args.input.as_deref(), "LBO model")?;
    let result = lbo::build_lbo(&lbo_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for deal consideration
#[derive(Args)]
pub struct DealArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Normalized EBITDA
    #[arg(long)]
    pub ebitda: Option<Decimal>,

    /// EV / EBITDA multiple
    #[arg(long)]
    pub multiple: Option<Decimal>,

    /// Net debt assumed by the buyer
    #[arg(long, allow_hyphen_values = true)]
    pub net_debt: Option<Decimal>,

    /// Share of equity paid in cash (rest is rolled over)
    #[arg(long)]
    pub cash_pct: Option<Decimal>,
}

pub fn run_deal(args: DealArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let deal_input: DealConsiderationInput = if args.input.is_some() {
        input::load(args.input.as_deref(), "deal consideration")?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        DealConsiderationInput {
            ebitda: args.ebitda.ok_or("--ebitda is required (or provide --input)")?,
            multiple: args
                .multiple
                .ok_or("--multiple is required (or provide --input)")?,
            net_debt: args.net_debt.unwrap_or_default(),
            cash_pct: args
                .cash_pct
                .ok_or("--cash-pct is required (or provide --input)")?,
        }
    };
    let result = consideration::calculate_deal_consideration(&deal_input)?;
    Ok(serde_json::to_value(result)?)
}
