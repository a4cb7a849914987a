//! Phase domain model
//!
//! A phase is one stage of a pipeline holding an ordered list of plugin
//! steps plus optional pre, post and merge steps. All structural invariants
//! are checked when a phase is constructed, so the executor never sees an
//! invalid phase.

use crate::core::{
    error::ValidationError,
    plugin::{
        Extract, Load, MergeExtract, Plugin, PluginKind, PluginStep, PostProcess, PreProcess, Transform,
        TransformLoad,
    },
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Kind of phase within a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Extract,
    Transform,
    Load,
    TransformAtLoad,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseKind::Extract => "extract",
            PhaseKind::Transform => "transform",
            PhaseKind::Load => "load",
            PhaseKind::TransformAtLoad => "transform_at_load",
        };
        f.write_str(name)
    }
}

/// Extract steps run concurrently, their results merged when there are several
#[derive(Clone)]
pub struct ExtractPhase {
    steps: Vec<Arc<dyn Extract>>,
    pre: Vec<Arc<dyn PreProcess>>,
    merge: Option<Arc<dyn MergeExtract>>,
}

impl ExtractPhase {
    pub fn new(
        steps: Vec<Arc<dyn Extract>>,
        pre: Vec<Arc<dyn PreProcess>>,
        merge: Option<Arc<dyn MergeExtract>>,
    ) -> Result<Self, ValidationError> {
        let phase = PhaseKind::Extract;
        if steps.is_empty() {
            return Err(ValidationError::EmptySteps { phase });
        }
        match (&merge, steps.len()) {
            (None, n) if n > 1 => return Err(ValidationError::MergeRequired { phase, steps: n }),
            (Some(merge), 1) => {
                return Err(ValidationError::MergeForbidden {
                    phase,
                    merge: merge.id().to_string(),
                })
            }
            _ => {}
        }

        let ids = steps
            .iter()
            .map(|s| s.id())
            .chain(pre.iter().map(|s| s.id()))
            .chain(merge.iter().map(|s| s.id()));
        ensure_unique_ids(phase, ids)?;

        Ok(Self { steps, pre, merge })
    }

    pub fn steps(&self) -> &[Arc<dyn Extract>] {
        &self.steps
    }

    pub fn pre(&self) -> &[Arc<dyn PreProcess>] {
        &self.pre
    }

    pub fn merge(&self) -> Option<&Arc<dyn MergeExtract>> {
        self.merge.as_ref()
    }
}

/// Transform steps run as a sequential fold
#[derive(Clone, Default)]
pub struct TransformPhase {
    steps: Vec<Arc<dyn Transform>>,
}

impl TransformPhase {
    pub fn new(steps: Vec<Arc<dyn Transform>>) -> Result<Self, ValidationError> {
        ensure_unique_ids(PhaseKind::Transform, steps.iter().map(|s| s.id()))?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Arc<dyn Transform>] {
        &self.steps
    }
}

#[derive(Clone)]
pub struct LoadPhase {
    steps: Vec<Arc<dyn Load>>,
    pre: Vec<Arc<dyn PreProcess>>,
    post: Vec<Arc<dyn PostProcess>>,
}

impl LoadPhase {
    pub fn new(
        steps: Vec<Arc<dyn Load>>,
        pre: Vec<Arc<dyn PreProcess>>,
        post: Vec<Arc<dyn PostProcess>>,
    ) -> Result<Self, ValidationError> {
        let phase = PhaseKind::Load;
        if steps.is_empty() {
            return Err(ValidationError::EmptySteps { phase });
        }

        let ids = steps
            .iter()
            .map(|s| s.id())
            .chain(pre.iter().map(|s| s.id()))
            .chain(post.iter().map(|s| s.id()));
        ensure_unique_ids(phase, ids)?;

        Ok(Self { steps, pre, post })
    }

    pub fn steps(&self) -> &[Arc<dyn Load>] {
        &self.steps
    }

    pub fn pre(&self) -> &[Arc<dyn PreProcess>] {
        &self.pre
    }

    pub fn post(&self) -> &[Arc<dyn PostProcess>] {
        &self.post
    }
}

#[derive(Clone)]
pub struct TransformLoadPhase {
    steps: Vec<Arc<dyn TransformLoad>>,
}

impl TransformLoadPhase {
    pub fn new(steps: Vec<Arc<dyn TransformLoad>>) -> Result<Self, ValidationError> {
        let phase = PhaseKind::TransformAtLoad;
        if steps.is_empty() {
            return Err(ValidationError::EmptySteps { phase });
        }
        ensure_unique_ids(phase, steps.iter().map(|s| s.id()))?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Arc<dyn TransformLoad>] {
        &self.steps
    }
}

/// Any of the four phase variants
#[derive(Clone, Debug)]
pub enum Phase {
    Extract(ExtractPhase),
    Transform(TransformPhase),
    Load(LoadPhase),
    TransformLoad(TransformLoadPhase),
}

/// Capability-tagged steps of one phase, as produced by the plugin registry
#[derive(Debug, Clone, Default)]
pub struct PhaseSteps {
    pub steps: Vec<PluginStep>,
    pub pre: Vec<PluginStep>,
    pub post: Vec<PluginStep>,
    pub merge: Option<PluginStep>,
}

macro_rules! take_capability {
    ($phase:expr, $step:expr, $variant:ident) => {
        match $step {
            PluginStep::$variant(plugin) => Ok(plugin),
            other => Err(ValidationError::WrongCapability {
                phase: $phase,
                id: other.id().to_string(),
                expected: PluginKind::$variant,
                found: other.kind(),
            }),
        }
    };
}

impl Phase {
    /// Build a phase of the given kind from capability-tagged steps
    pub fn build(kind: PhaseKind, parts: PhaseSteps) -> Result<Self, ValidationError> {
        let PhaseSteps { steps, pre, post, merge } = parts;

        let unsupported = |section: &'static str| -> Result<Self, ValidationError> {
            Err(ValidationError::UnsupportedSection { phase: kind, section })
        };

        match kind {
            PhaseKind::Extract => {
                if !post.is_empty() {
                    return unsupported("post");
                }
                let steps = steps
                    .into_iter()
                    .map(|s| take_capability!(kind, s, Extract))
                    .collect::<Result<Vec<_>, _>>()?;
                let pre = pre
                    .into_iter()
                    .map(|s| take_capability!(kind, s, Pre))
                    .collect::<Result<Vec<_>, _>>()?;
                let merge = merge
                    .map(|s| take_capability!(kind, s, MergeExtract))
                    .transpose()?;
                Ok(Phase::Extract(ExtractPhase::new(steps, pre, merge)?))
            }
            PhaseKind::Transform => {
                if !pre.is_empty() {
                    return unsupported("pre");
                }
                if !post.is_empty() {
                    return unsupported("post");
                }
                if merge.is_some() {
                    return unsupported("merge");
                }
                let steps = steps
                    .into_iter()
                    .map(|s| take_capability!(kind, s, Transform))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Phase::Transform(TransformPhase::new(steps)?))
            }
            PhaseKind::Load => {
                if merge.is_some() {
                    return unsupported("merge");
                }
                let steps = steps
                    .into_iter()
                    .map(|s| take_capability!(kind, s, Load))
                    .collect::<Result<Vec<_>, _>>()?;
                let pre = pre
                    .into_iter()
                    .map(|s| take_capability!(kind, s, Pre))
                    .collect::<Result<Vec<_>, _>>()?;
                let post = post
                    .into_iter()
                    .map(|s| take_capability!(kind, s, Post))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Phase::Load(LoadPhase::new(steps, pre, post)?))
            }
            PhaseKind::TransformAtLoad => {
                if !pre.is_empty() {
                    return unsupported("pre");
                }
                if !post.is_empty() {
                    return unsupported("post");
                }
                if merge.is_some() {
                    return unsupported("merge");
                }
                let steps = steps
                    .into_iter()
                    .map(|s| take_capability!(kind, s, TransformLoad))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Phase::TransformLoad(TransformLoadPhase::new(steps)?))
            }
        }
    }

    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Extract(_) => PhaseKind::Extract,
            Phase::Transform(_) => PhaseKind::Transform,
            Phase::Load(_) => PhaseKind::Load,
            Phase::TransformLoad(_) => PhaseKind::TransformAtLoad,
        }
    }

    /// Ids of the phase's main steps, in declaration order
    pub fn step_ids(&self) -> Vec<&str> {
        match self {
            Phase::Extract(p) => p.steps.iter().map(|s| s.id()).collect(),
            Phase::Transform(p) => p.steps.iter().map(|s| s.id()).collect(),
            Phase::Load(p) => p.steps.iter().map(|s| s.id()).collect(),
            Phase::TransformLoad(p) => p.steps.iter().map(|s| s.id()).collect(),
        }
    }
}

fn ensure_unique_ids<'a>(
    phase: PhaseKind,
    ids: impl IntoIterator<Item = &'a str>,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateStepId {
                phase,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

fn ids<'a, T: Plugin + ?Sized + 'a>(steps: &'a [Arc<T>]) -> Vec<&'a str> {
    steps.iter().map(|s| s.id()).collect()
}

impl fmt::Debug for ExtractPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractPhase")
            .field("steps", &ids(&self.steps))
            .field("pre", &ids(&self.pre))
            .field("merge", &self.merge.as_ref().map(|m| m.id()))
            .finish()
    }
}

impl fmt::Debug for TransformPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformPhase")
            .field("steps", &ids(&self.steps))
            .finish()
    }
}

impl fmt::Debug for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadPhase")
            .field("steps", &ids(&self.steps))
            .field("pre", &ids(&self.pre))
            .field("post", &ids(&self.post))
            .finish()
    }
}

impl fmt::Debug for TransformLoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformLoadPhase")
            .field("steps", &ids(&self.steps))
            .finish()
    }
}
