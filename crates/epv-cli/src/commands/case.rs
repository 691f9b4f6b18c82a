use clap::Args;
use serde_json::Value;

use epv_core::case::FinancialCase;
use epv_core::engine;
use epv_core::scenarios::scenario::{PresetName, ScenarioSelection};

use crate::input;

/// Arguments for a full case valuation
#[derive(Args)]
pub struct ValueArgs {
    /// Path to a JSON or YAML case file
    #[arg(long)]
    pub input: Option<String>,

    /// Preset scenario to run downstream views on (overrides the case)
    #[arg(long, value_enum)]
    pub scenario: Option<ScenarioPreset>,

    /// Monte Carlo trial count (overrides the case)
    #[arg(long)]
    pub runs: Option<u32>,

    /// Monte Carlo seed (overrides the case)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip the Monte Carlo simulation even if the case configures one
    #[arg(long)]
    pub no_simulation: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ScenarioPreset {
    Base,
    Bull,
    Bear,
}

impl From<ScenarioPreset> for PresetName {
    fn from(p: ScenarioPreset) -> Self {
        match p {
            ScenarioPreset::Base => PresetName::Base,
            ScenarioPreset::Bull => PresetName::Bull,
            ScenarioPreset::Bear => PresetName::Bear,
        }
    }
}

pub fn run_value(args: ValueArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut case: FinancialCase = input::load(args.input.as_deref(), "case valuation")?;

    if let Some(preset) = args.scenario {
        case.scenario.selection = ScenarioSelection::Preset(preset.into());
    }
    if args.no_simulation {
        case.simulation = None;
    }
    if let Some(sim) = case.simulation.as_mut() {
        if let Some(runs) = args.runs {
            sim.runs = runs;
        }
        if args.seed.is_some() {
            sim.seed = args.seed;
        }
    }

    let result = engine::evaluate_case(&case)?;
    Ok(serde_json::to_value(result)?)
}
