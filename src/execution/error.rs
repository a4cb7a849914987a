//! Error types for phase, strategy and orchestrator failures

use crate::core::{phase::PhaseKind, pipeline::PipelineType};
use thiserror::Error;

/// A single step failure inside a concurrent group
#[derive(Debug, Error)]
#[error("step '{step_id}' failed: {source}")]
pub struct StepFailure {
    pub step_id: String,
    #[source]
    pub source: anyhow::Error,
}

impl StepFailure {
    pub fn new(step_id: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            step_id: step_id.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
#[error("extract step '{step_id}' failed: {source}")]
pub struct ExtractError {
    pub step_id: String,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
#[error("transform step '{step_id}' failed: {source}")]
pub struct TransformError {
    pub step_id: String,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
#[error("load step '{step_id}' failed: {source}")]
pub struct LoadError {
    pub step_id: String,
    #[source]
    pub source: anyhow::Error,
}

impl From<StepFailure> for ExtractError {
    fn from(failure: StepFailure) -> Self {
        Self {
            step_id: failure.step_id,
            source: failure.source,
        }
    }
}

impl From<StepFailure> for TransformError {
    fn from(failure: StepFailure) -> Self {
        Self {
            step_id: failure.step_id,
            source: failure.source,
        }
    }
}

impl From<StepFailure> for LoadError {
    fn from(failure: StepFailure) -> Self {
        Self {
            step_id: failure.step_id,
            source: failure.source,
        }
    }
}

/// Failure of one phase, tagged by phase family
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl PhaseError {
    /// Id of the step that raised the error
    pub fn step_id(&self) -> &str {
        match self {
            PhaseError::Extract(e) => &e.step_id,
            PhaseError::Transform(e) => &e.step_id,
            PhaseError::Load(e) => &e.step_id,
        }
    }
}

/// Failure of a pipeline strategy
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{pipeline_type} strategy failed for pipeline '{pipeline}': {source}")]
    Phase {
        pipeline: String,
        pipeline_type: PipelineType,
        #[source]
        source: PhaseError,
    },

    #[error("pipeline '{pipeline}' has no {phase} phase")]
    MissingPhase { pipeline: String, phase: PhaseKind },

    #[error("transform task for pipeline '{pipeline}' did not complete: {reason}")]
    TransformTask { pipeline: String, reason: String },
}

impl PipelineError {
    /// Id of the failing step, when the failure came from a plugin
    pub fn step_id(&self) -> Option<&str> {
        match self {
            PipelineError::Phase { source, .. } => Some(source.step_id()),
            _ => None,
        }
    }
}

/// Failure of a whole orchestrated run
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("nothing to execute: no pipelines were supplied")]
    NothingToExecute,

    #[error("concurrency must be greater than zero")]
    InvalidConcurrency,

    #[error("duplicate pipeline name '{0}'")]
    DuplicatePipeline(String),

    #[error("circular or unsatisfiable dependencies, cannot schedule: {}", .pending.join(", "))]
    CircularDependency { pending: Vec<String> },

    #[error("pipeline '{pipeline}' failed: {source}")]
    PipelineFailed {
        pipeline: String,
        #[source]
        source: PipelineError,
    },

    #[error("pipeline '{pipeline}' strategy returned without completing")]
    Incomplete { pipeline: String },

    #[error("worker task failed: {0}")]
    Worker(String),
}
