use clap::{Args, ValueEnum};
use serde_json::Value;

use epv_core::monte_carlo::simulation::{self, SimulationInput};
use epv_core::scenarios::sensitivity::{self, OneWayInput, TornadoInput, TwoWayInput};

use crate::input;

/// Arguments for the Monte Carlo EPV simulation
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to JSON/YAML input file ({ base, config })
    #[arg(long)]
    pub input: Option<String>,

    /// Trial count (overrides the input)
    #[arg(long)]
    pub runs: Option<u32>,

    /// Seed (overrides the input)
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut sim_input: SimulationInput = input::load(args.input.as_deref(), "Monte Carlo simulation")?;
    if let Some(runs) = args.runs {
        sim_input.config.runs = runs;
    }
    if args.seed.is_some() {
        sim_input.config.seed = args.seed;
    }
    let result = simulation::run_simulation(&sim_input)?;
    Ok(serde_json::to_value(result)?)
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SensitivityMode {
    OneWay,
    TwoWay,
    Tornado,
}

/// Arguments for sensitivity analysis
#[derive(Args)]
pub struct SensitivityArgs {
    /// Which analysis the input describes
    #[arg(long, value_enum, default_value = "tornado")]
    pub mode: SensitivityMode,

    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let path = args.input.as_deref();
    let value = match args.mode {
        SensitivityMode::OneWay => {
            let one_way: OneWayInput = input::load(path, "one-way sensitivity")?;
            serde_json::to_value(sensitivity::one_way_sensitivity(&one_way)?)?
        }
        SensitivityMode::TwoWay => {
            let two_way: TwoWayInput = input::load(path, "two-way sensitivity")?;
            serde_json::to_value(sensitivity::two_way_sensitivity(&two_way)?)?
        }
        SensitivityMode::Tornado => {
            let tornado: TornadoInput = input::load(path, "tornado analysis")?;
            serde_json::to_value(sensitivity::tornado(&tornado)?)?
        }
    };
    Ok(value)
}
