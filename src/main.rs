use anyhow::{Context, Result};
use flowline::cli::commands::{PlanCommand, PluginsCommand, RunCommand, ValidateCommand};
use flowline::cli::output::*;
use flowline::cli::{Cli, Command};
use flowline::core::{OrchestratorConfig, PluginRegistry, RunConfig};
use flowline::execution::{Orchestrator, OrchestratorEvent};
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set logging subscriber")?;

    let registry = PluginRegistry::with_builtins();

    match &cli.command {
        Command::Run(cmd) => run_pipelines(cmd, &registry).await?,
        Command::Validate(cmd) => validate_config(cmd, &registry)?,
        Command::Plan(cmd) => plan_rounds(cmd, &registry)?,
        Command::Plugins(cmd) => list_plugins(cmd, &registry)?,
    }

    Ok(())
}

async fn run_pipelines(cmd: &RunCommand, registry: &PluginRegistry) -> Result<()> {
    let config = RunConfig::from_file(&cmd.file, registry).context("Failed to load run configuration")?;
    let mut pipelines = config.build_pipelines(registry)?;

    let mut settings: OrchestratorConfig = config.settings;
    if let Some(concurrency) = cmd.concurrency {
        settings = settings.with_concurrency(concurrency);
    }

    println!(
        "{} Loaded {} pipeline(s) from {} (concurrency {})",
        INFO,
        style(pipelines.len()).bold(),
        style(&cmd.file).dim(),
        style(settings.concurrency).cyan()
    );

    let progress = create_progress_bar(pipelines.len());
    let bar = progress.clone();
    let orchestrator = Orchestrator::new(settings)?.with_event_handler(move |event| {
        if let OrchestratorEvent::PipelineCompleted { .. } = &event {
            bar.inc(1);
        }
        bar.println(format_event(&event));
    });

    let result = orchestrator.execute_pipelines(&mut pipelines).await;
    progress.finish_and_clear();

    println!();
    for pipeline in &pipelines {
        println!("  {} {}", style(&pipeline.name).bold(), format_status(pipeline.status()));
    }

    match result {
        Ok(executed) => {
            println!(
                "\n{} {} pipeline(s) completed {}",
                CHECK,
                style(executed.len()).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        Err(e) => {
            println!("\n{} Run {}", CROSS, style("failed").red());
            error!("{:#}", anyhow::Error::from(e));
            std::process::exit(1);
        }
    }
}

fn validate_config(cmd: &ValidateCommand, registry: &PluginRegistry) -> Result<()> {
    println!("{} Validating configuration...", INFO);

    let result = RunConfig::from_file(&cmd.file, registry)
        .and_then(|config| config.build_pipelines(registry).map(|pipelines| (config, pipelines)));

    match result {
        Ok((config, pipelines)) => {
            println!("{} Configuration is valid!", CHECK);
            println!("  Concurrency: {}", style(config.settings.concurrency).cyan());
            println!("  Pipelines: {}", style(pipelines.len()).cyan());
            for pipeline in &pipelines {
                println!("  {}", format_pipeline(pipeline));
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(config.as_written())?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn plan_rounds(cmd: &PlanCommand, registry: &PluginRegistry) -> Result<()> {
    let config = RunConfig::from_file(&cmd.file, registry).context("Failed to load run configuration")?;
    let pipelines = config.build_pipelines(registry)?;
    let orchestrator = Orchestrator::new(config.settings)?;

    match orchestrator.plan(&pipelines) {
        Ok(rounds) => {
            println!(
                "{} {} round(s), at most {} pipeline(s) at a time:",
                INFO,
                style(rounds.len()).bold(),
                style(orchestrator.concurrency()).cyan()
            );
            println!("{}", format_plan(&rounds));
            Ok(())
        }
        Err(e) => {
            println!("{} {}", WARN, style(e).red());
            std::process::exit(1);
        }
    }
}

fn list_plugins(cmd: &PluginsCommand, registry: &PluginRegistry) -> Result<()> {
    let names = registry.names();
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }

    println!("{} Registered plugins:", INFO);
    for (kind, plugins) in &names {
        println!("  {}: {}", style(kind).bold(), style(plugins.join(", ")).cyan());
    }
    Ok(())
}
