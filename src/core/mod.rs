//! Core domain models
//!
//! This module defines the plugin capabilities, phases and pipelines, the
//! plugin registry and the YAML run configuration.

pub mod config;
pub mod error;
pub mod phase;
pub mod pipeline;
pub mod plugin;
pub mod registry;
pub mod state;

pub use config::{OrchestratorConfig, PipelineConfig, RunConfig, StepConfig};
pub use error::ValidationError;
pub use phase::{ExtractPhase, LoadPhase, Phase, PhaseKind, PhaseSteps, TransformLoadPhase, TransformPhase};
pub use pipeline::{Pipeline, PipelineType};
pub use plugin::{
    Data, Extract, Load, MergeExtract, Plugin, PluginKind, PluginStep, PostProcess, PreProcess, SecretManager,
    Transform, TransformLoad,
};
pub use registry::{PluginConstructor, PluginRegistry, RegistryError};
pub use state::PipelineStatus;
