use clap::Args;
use serde_json::Value;

use epv_core::scenarios::scenario::{self, ScenarioComparisonInput};

use crate::input;

/// Arguments for a scenario comparison
#[derive(Args)]
pub struct ScenariosArgs {
    /// Path to JSON/YAML input file ({ base, scenarios })
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_scenarios(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let comparison: ScenarioComparisonInput =
        input::load(args.input.as_deref(), "scenario comparison")?;
    let result = scenario::compare_scenarios(&comparison)?;
    Ok(serde_json::to_value(result)?)
}
