//! Command-line interface definitions for misc-sim.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drive the misc device registry from a TOML scenario.
#[derive(Parser)]
#[command(name = "misc-sim", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Only show errors from the registry log.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Show debug output from the registry (pass twice for trace).
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Run a scenario and print the outcome of every step.
    Run(ScenarioArgs),
    /// Parse and validate a scenario without running it.
    Check(ScenarioArgs),
}

/// Arguments shared by `run` and `check`.
#[derive(Parser)]
pub struct ScenarioArgs {
    /// Path to the scenario file.
    pub scenario: PathBuf,
}
