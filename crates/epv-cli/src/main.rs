mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::case::ValueArgs;
use commands::pe::{DealArgs, LboArgs};
use commands::risk::{SensitivityArgs, SimulateArgs};
use commands::scenarios::ScenariosArgs;
use commands::valuation::{EpvArgs, WaccArgs};

/// Earnings Power Value, Monte Carlo risk and LBO engine
#[derive(Parser)]
#[command(
    name = "epv",
    version,
    about = "Earnings Power Value valuation and risk simulation",
    long_about = "A CLI for valuing small operating businesses on Earnings Power Value \
                  with decimal precision. Runs the full case (P&L, EBITDA bridge, WACC, \
                  EPV, scenarios, Monte Carlo, sensitivity, LBO, deal consideration) or \
                  any of those views on its own."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Value a full case file end to end
    Value(ValueArgs),
    /// Calculate Weighted Average Cost of Capital (CAPM build-up)
    Wacc(WaccArgs),
    /// Earnings Power Value from normalized EBIT
    Epv(EpvArgs),
    /// Compare Bear / Base / Bull or custom scenarios
    Scenarios(ScenariosArgs),
    /// Monte Carlo simulation of EPV
    Simulate(SimulateArgs),
    /// One-way, two-way or tornado sensitivity of EPV
    Sensitivity(SensitivityArgs),
    /// Leveraged buyout with cash sweep
    Lbo(LboArgs),
    /// Deal consideration split between cash and rollover
    Deal(DealArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Value(args) => commands::case::run_value(args),
        Commands::Wacc(args) => commands::valuation::run_wacc(args),
        Commands::Epv(args) => commands::valuation::run_epv(args),
        Commands::Scenarios(args) => commands::scenarios::run_scenarios(args),
        Commands::Simulate(args) => commands::risk::run_simulate(args),
        Commands::Sensitivity(args) => commands::risk::run_sensitivity(args),
        Commands::Lbo(args) => commands::pe::run_lbo(args),
        Commands::Deal(args) => commands::pe::run_deal(args),
        Commands::Version => {
            println!("epv {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
