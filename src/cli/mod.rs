//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{PlanCommand, PluginsCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Dependency-aware ETL, ELT and ETLT pipeline runner
#[derive(Debug, Parser, Clone)]
#[command(name = "flowline")]
#[command(version)]
#[command(about = "Runs ETL, ELT and ETLT pipelines defined in YAML", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run every pipeline of a configuration file
    Run(RunCommand),

    /// Validate a configuration file and build its pipelines
    Validate(ValidateCommand),

    /// Show the dispatch rounds without running anything
    Plan(PlanCommand),

    /// List registered plugins
    Plugins(PluginsCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
