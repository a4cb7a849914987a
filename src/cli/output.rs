//! CLI output formatting

use crate::{
    core::{Pipeline, PipelineStatus},
    execution::OrchestratorEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar over `total` pipelines
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a pipeline status for display
pub fn format_status(status: &PipelineStatus) -> String {
    match status {
        PipelineStatus::Pending => style("PENDING").dim().to_string(),
        PipelineStatus::Running { .. } => style("RUNNING").yellow().to_string(),
        PipelineStatus::Completed { .. } => style("COMPLETED").green().to_string(),
        PipelineStatus::Failed { .. } => style("FAILED").red().to_string(),
        PipelineStatus::Cancelled { .. } => style("CANCELLED").yellow().to_string(),
    }
}

/// Format an orchestrator event for display
pub fn format_event(event: &OrchestratorEvent) -> String {
    match event {
        OrchestratorEvent::RunStarted { run_id, pipelines } => format!(
            "{} Starting run {} ({} pipelines)",
            ROCKET,
            style(&run_id.to_string()[..8]).dim(),
            style(pipelines).cyan()
        ),
        OrchestratorEvent::RoundStarted { round, pipelines } => format!(
            "{} Round {}: {}",
            INFO,
            style(round).bold(),
            style(pipelines.join(", ")).cyan()
        ),
        OrchestratorEvent::PipelineStarted {
            name,
            pipeline_type,
            worker,
        } => format!(
            "{} {} [{}] on worker {}",
            SPINNER,
            style(name).cyan(),
            pipeline_type,
            style(worker).dim()
        ),
        OrchestratorEvent::PipelineCompleted { name, duration } => format!(
            "{} {} ({})",
            CHECK,
            style(name).green(),
            style(format_duration(*duration)).dim()
        ),
        OrchestratorEvent::PipelineFailed { name, step_id, error } => match step_id {
            Some(step) => format!(
                "{} {} at step {}: {}",
                CROSS,
                style(name).red(),
                style(step).bold(),
                style(error).dim()
            ),
            None => format!("{} {}: {}", CROSS, style(name).red(), style(error).dim()),
        },
        OrchestratorEvent::RunFinished {
            run_id,
            executed,
            success,
        } => {
            let status = if *success {
                format!("{} completed", style("successfully").green())
            } else {
                style("failed").red().to_string()
            };
            format!(
                "{} Run ({}) {} with {} pipeline(s) executed",
                INFO,
                style(&run_id.to_string()[..8]).dim(),
                status,
                executed.len()
            )
        }
    }
}

/// One line per pipeline with its phases and steps
pub fn format_pipeline(pipeline: &Pipeline) -> String {
    let mut lines = vec![format!(
        "{} [{}] {}",
        style(&pipeline.name).bold(),
        pipeline.pipeline_type,
        format_status(pipeline.status())
    )];
    let needs = pipeline.sorted_needs();
    if !needs.is_empty() {
        lines.push(format!(
            "    needs: {}",
            style(needs.into_iter().collect::<Vec<_>>().join(", ")).dim()
        ));
    }
    for (kind, steps) in pipeline.outline() {
        lines.push(format!("    {}: {}", kind, style(steps.join(", ")).cyan()));
    }
    lines.join("\n")
}

/// Numbered dispatch rounds
pub fn format_plan(rounds: &[Vec<String>]) -> String {
    rounds
        .iter()
        .enumerate()
        .map(|(index, names)| format!("  {} {}", style(format!("round {}:", index + 1)).bold(), names.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{:.1}s", duration.as_secs_f64())
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}
