//! Host-side simulator for the Hadron misc device registry.
//!
//! Loads a TOML scenario, runs it against a registry wired to an in-memory
//! node table and loader, and prints one line per step followed by the
//! resulting `/dev` nodes.

mod cli;
mod config;
mod sim;

use std::fmt;

use anyhow::Result;
use clap::Parser;
use hadron_misc::log::{self, LogLevel};

use crate::config::Scenario;
use crate::sim::Simulator;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    init_logging(&cli);

    match cli.command {
        cli::Command::Run(ref args) => cmd_run(&Scenario::load(&args.scenario)?),
        cli::Command::Check(ref args) => cmd_check(&Scenario::load(&args.scenario)?),
    }
}

fn stderr_sink(level: LogLevel, args: fmt::Arguments<'_>) {
    eprintln!("[{}] {args}", level.name());
}

fn init_logging(cli: &cli::Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => LogLevel::Error,
        (false, 0) => LogLevel::Warn,
        (false, 1) => LogLevel::Debug,
        (false, _) => LogLevel::Trace,
    };
    // SAFETY: `stderr_sink` only writes to stderr and never re-enters the registry.
    unsafe { log::set_log_fn(stderr_sink) };
    log::set_max_level(level);
}

fn cmd_run(scenario: &Scenario) -> Result<()> {
    let mut sim = Simulator::new(scenario);
    for line in sim.run(scenario) {
        println!("{line}");
    }

    for request in sim.load_requests() {
        println!("load request: {request}");
    }
    println!(
        "registered: {}, open sessions: {}",
        sim.registry().len(),
        sim.open_sessions()
    );

    let nodes = sim.nodes();
    println!("nodes: {}", nodes.len());
    for (minor, path) in nodes {
        println!("  {minor:>3} {path}");
    }
    Ok(())
}

fn cmd_check(scenario: &Scenario) -> Result<()> {
    println!(
        "ok: {} driver(s), {} step(s), {} dynamic minor(s)",
        scenario.drivers.len(),
        scenario.steps.len(),
        scenario.registry.dynamic_minors
    );
    Ok(())
}
