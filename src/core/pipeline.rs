//! Pipeline domain model

use crate::core::{
    error::ValidationError,
    phase::{ExtractPhase, LoadPhase, Phase, PhaseKind, TransformLoadPhase, TransformPhase},
    state::PipelineStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Pipeline type, which fixes the phase set and the execution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineType {
    #[serde(rename = "ETL", alias = "etl")]
    Etl,
    #[serde(rename = "ELT", alias = "elt")]
    Elt,
    #[serde(rename = "ETLT", alias = "etlt")]
    Etlt,
}

impl PipelineType {
    /// Phases every pipeline of this type must define
    pub fn mandatory_phases(&self) -> &'static [PhaseKind] {
        match self {
            PipelineType::Etl => &[PhaseKind::Extract, PhaseKind::Load],
            PipelineType::Elt => &[PhaseKind::Extract, PhaseKind::Load, PhaseKind::TransformAtLoad],
            PipelineType::Etlt => &[
                PhaseKind::Extract,
                PhaseKind::Transform,
                PhaseKind::Load,
                PhaseKind::TransformAtLoad,
            ],
        }
    }

    /// Phases a pipeline of this type may define
    pub fn optional_phases(&self) -> &'static [PhaseKind] {
        match self {
            PipelineType::Etl => &[PhaseKind::Transform],
            PipelineType::Elt | PipelineType::Etlt => &[],
        }
    }
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineType::Etl => "ETL",
            PipelineType::Elt => "ELT",
            PipelineType::Etlt => "ETLT",
        };
        f.write_str(name)
    }
}

/// A named, typed aggregate of phases
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name, unique within a run
    pub name: String,

    pub pipeline_type: PipelineType,

    phases: HashMap<PhaseKind, Phase>,

    /// Names of pipelines that must complete before this one starts
    needs: Option<HashSet<String>>,

    /// Only written by the orchestrator
    status: PipelineStatus,
}

impl Pipeline {
    /// Create a pipeline, checking the phase set against the pipeline type
    pub fn new(
        name: impl Into<String>,
        pipeline_type: PipelineType,
        phases: HashMap<PhaseKind, Phase>,
        needs: Option<HashSet<String>>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }

        for (key, phase) in &phases {
            if phase.kind() != *key {
                return Err(ValidationError::MismatchedPhase {
                    key: *key,
                    actual: phase.kind(),
                });
            }
        }

        let mut missing: Vec<PhaseKind> = pipeline_type
            .mandatory_phases()
            .iter()
            .filter(|kind| !phases.contains_key(kind))
            .copied()
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(ValidationError::MissingPhases {
                pipeline: name,
                pipeline_type,
                missing,
            });
        }

        let mut unexpected: Vec<PhaseKind> = phases
            .keys()
            .filter(|kind| {
                !pipeline_type.mandatory_phases().contains(kind)
                    && !pipeline_type.optional_phases().contains(kind)
            })
            .copied()
            .collect();
        if !unexpected.is_empty() {
            unexpected.sort();
            return Err(ValidationError::UnexpectedPhases {
                pipeline: name,
                pipeline_type,
                unexpected,
            });
        }

        Ok(Pipeline {
            name,
            pipeline_type,
            phases,
            needs: needs.filter(|n| !n.is_empty()),
            status: PipelineStatus::Pending,
        })
    }

    pub fn phase(&self, kind: PhaseKind) -> Option<&Phase> {
        self.phases.get(&kind)
    }

    pub fn extract(&self) -> Option<&ExtractPhase> {
        match self.phases.get(&PhaseKind::Extract) {
            Some(Phase::Extract(phase)) => Some(phase),
            _ => None,
        }
    }

    pub fn transform(&self) -> Option<&TransformPhase> {
        match self.phases.get(&PhaseKind::Transform) {
            Some(Phase::Transform(phase)) => Some(phase),
            _ => None,
        }
    }

    pub fn load(&self) -> Option<&LoadPhase> {
        match self.phases.get(&PhaseKind::Load) {
            Some(Phase::Load(phase)) => Some(phase),
            _ => None,
        }
    }

    pub fn transform_at_load(&self) -> Option<&TransformLoadPhase> {
        match self.phases.get(&PhaseKind::TransformAtLoad) {
            Some(Phase::TransformLoad(phase)) => Some(phase),
            _ => None,
        }
    }

    /// Present phase kinds in execution order
    pub fn phase_kinds(&self) -> Vec<PhaseKind> {
        let mut kinds: Vec<PhaseKind> = self.phases.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn needs(&self) -> Option<&HashSet<String>> {
        self.needs.as_ref()
    }

    /// Check if every dependency is contained in the executed set
    pub fn dependencies_met(&self, executed: &HashSet<String>) -> bool {
        self.needs
            .as_ref()
            .map_or(true, |needs| needs.iter().all(|dep| executed.contains(dep)))
    }

    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    pub fn is_executed(&self) -> bool {
        self.status.is_executed()
    }

    pub(crate) fn set_status(&mut self, status: PipelineStatus) {
        self.status = status;
    }

    /// Structural outline: phase kinds with their step ids
    pub fn outline(&self) -> Vec<(PhaseKind, Vec<String>)> {
        self.phase_kinds()
            .into_iter()
            .filter_map(|kind| {
                self.phases
                    .get(&kind)
                    .map(|phase| (kind, phase.step_ids().into_iter().map(String::from).collect()))
            })
            .collect()
    }

    /// Sorted dependency names, for display
    pub fn sorted_needs(&self) -> BTreeSet<&str> {
        self.needs
            .iter()
            .flat_map(|needs| needs.iter().map(String::as_str))
            .collect()
    }
}
