//! Construction-time validation errors

use crate::core::{phase::PhaseKind, pipeline::PipelineType, plugin::PluginKind};
use thiserror::Error;

/// Structural problems found while building phases and pipelines
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{phase} phase requires at least one step")]
    EmptySteps { phase: PhaseKind },

    #[error("duplicate step id '{id}' in {phase} phase")]
    DuplicateStepId { phase: PhaseKind, id: String },

    #[error("{phase} phase has {steps} steps and needs a merge step")]
    MergeRequired { phase: PhaseKind, steps: usize },

    #[error("{phase} phase has a single step, merge step '{merge}' is not allowed")]
    MergeForbidden { phase: PhaseKind, merge: String },

    #[error("step '{id}' in {phase} phase is a {found} plugin, expected {expected}")]
    WrongCapability {
        phase: PhaseKind,
        id: String,
        expected: PluginKind,
        found: PluginKind,
    },

    #[error("{phase} phase does not accept {section} steps")]
    UnsupportedSection {
        phase: PhaseKind,
        section: &'static str,
    },

    #[error("{pipeline_type} pipeline '{pipeline}' is missing phases: {}", join_kinds(.missing))]
    MissingPhases {
        pipeline: String,
        pipeline_type: PipelineType,
        missing: Vec<PhaseKind>,
    },

    #[error("{pipeline_type} pipeline '{pipeline}' has unexpected phases: {}", join_kinds(.unexpected))]
    UnexpectedPhases {
        pipeline: String,
        pipeline_type: PipelineType,
        unexpected: Vec<PhaseKind>,
    },

    #[error("phase stored under {key} is a {actual} phase")]
    MismatchedPhase { key: PhaseKind, actual: PhaseKind },

    #[error("pipeline name must not be empty")]
    EmptyName,
}

fn join_kinds(kinds: &[PhaseKind]) -> String {
    kinds
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
