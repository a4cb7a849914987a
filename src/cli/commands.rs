//! CLI command definitions

use clap::Args;

/// Run every pipeline of a configuration file
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the run configuration YAML file
    #[arg(short, long)]
    pub file: String,

    /// Override `settings.concurrency`
    #[arg(short, long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,
}

/// Validate a configuration file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the run configuration YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output the resolved configuration as JSON
    #[arg(long)]
    pub json: bool,
}

/// Show dispatch rounds
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to the run configuration YAML file
    #[arg(short, long)]
    pub file: String,
}

/// List registered plugins
#[derive(Debug, Args, Clone)]
pub struct PluginsCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse a strictly positive worker count
pub fn parse_concurrency(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("concurrency must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("Invalid concurrency '{}': {}", s, e)),
    }
}
