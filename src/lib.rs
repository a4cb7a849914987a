//! flowline - ETL, ELT and ETLT pipeline orchestration

pub mod cli;
pub mod core;
pub mod execution;
pub mod plugins;

// Re-export commonly used types
pub use core::{Data, Pipeline, PipelineStatus, PipelineType, PluginKind, PluginRegistry, RunConfig};
pub use execution::{Orchestrator, OrchestratorError, OrchestratorEvent, PipelineError};
