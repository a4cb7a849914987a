//! Phase executor - runs the steps of a single phase

use crate::{
    core::{
        phase::{ExtractPhase, LoadPhase, TransformLoadPhase, TransformPhase},
        plugin::{Data, Plugin, PostProcess, PreProcess},
    },
    execution::{
        error::{ExtractError, LoadError, StepFailure, TransformError},
        group::run_concurrent,
    },
};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of running a single step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Data>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn succeeded(id: impl Into<String>, result: Option<Data>) -> Self {
        Self {
            id: id.into(),
            success: true,
            result,
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Executes phases; stateless, so strategies copy it freely
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseExecutor;

impl PhaseExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run pre-processing steps concurrently, keyed by step id
    pub async fn run_pre(&self, steps: &[Arc<dyn PreProcess>]) -> Result<HashMap<String, Data>, StepFailure> {
        let members = steps
            .iter()
            .map(|step| {
                let step = Arc::clone(step);
                (step.id().to_string(), async move { step.pre_process().await })
            })
            .collect();
        let values = run_concurrent(members).await?;
        Ok(keyed(steps.iter().map(|step| step.id()), values))
    }

    /// Run post-processing steps concurrently, keyed by step id
    pub async fn run_post(&self, steps: &[Arc<dyn PostProcess>]) -> Result<HashMap<String, Data>, StepFailure> {
        let members = steps
            .iter()
            .map(|step| {
                let step = Arc::clone(step);
                (step.id().to_string(), async move { step.post_process().await })
            })
            .collect();
        let values = run_concurrent(members).await?;
        Ok(keyed(steps.iter().map(|step| step.id()), values))
    }

    /// Run every extract step concurrently alongside the pre steps.
    ///
    /// A single extract returns its value unchanged. Several extracts are
    /// combined by the merge step, which receives a mapping from step id to
    /// extracted value.
    pub async fn run_extract(&self, phase: &ExtractPhase) -> Result<Data, ExtractError> {
        let members = phase
            .steps()
            .iter()
            .map(|step| {
                let step = Arc::clone(step);
                (step.id().to_string(), async move { step.extract().await })
            })
            .collect();

        let (pre, mut extracted) = tokio::try_join!(self.run_pre(phase.pre()), run_concurrent(members))?;
        if !pre.is_empty() {
            debug!("Extract pre steps finished: {:?}", pre.keys().collect::<Vec<_>>());
        }

        if extracted.len() == 1 {
            if let Some(data) = extracted.pop() {
                return Ok(data);
            }
        }

        let merge = phase.merge().ok_or_else(|| ExtractError {
            step_id: phase.steps().first().map(|s| s.id().to_string()).unwrap_or_default(),
            source: anyhow::anyhow!("{} extract steps produced data but no merge step is defined", extracted.len()),
        })?;

        info!("Merging {} extracted results with '{}'", extracted.len(), merge.id());
        let mapping = keyed(phase.steps().iter().map(|step| step.id()), extracted);
        merge.merge(mapping).map_err(|source| ExtractError {
            step_id: merge.id().to_string(),
            source,
        })
    }

    /// Apply transform steps in declaration order. Blocking; strategies call
    /// it off the async runtime.
    pub fn run_transform(&self, phase: &TransformPhase, data: Data) -> Result<Data, TransformError> {
        let mut data = data;
        for step in phase.steps() {
            debug!("Applying transform '{}'", step.id());
            data = match panic::catch_unwind(AssertUnwindSafe(|| step.transform(data))) {
                Ok(result) => result.map_err(|source| TransformError {
                    step_id: step.id().to_string(),
                    source,
                })?,
                Err(_) => {
                    return Err(TransformError {
                        step_id: step.id().to_string(),
                        source: anyhow::anyhow!("transform step panicked"),
                    })
                }
            };
        }
        Ok(data)
    }

    /// Deliver `data` to every load step concurrently, then run post steps.
    ///
    /// The same value is shared by all load steps.
    pub async fn run_load(&self, phase: &LoadPhase, data: Data) -> Result<Vec<StepOutcome>, LoadError> {
        let data = Arc::new(data);
        let members = phase
            .steps()
            .iter()
            .map(|step| {
                let step = Arc::clone(step);
                let data = Arc::clone(&data);
                (step.id().to_string(), async move { step.load(&data).await })
            })
            .collect();

        let (pre, loaded) = tokio::try_join!(self.run_pre(phase.pre()), run_concurrent(members))?;
        if !pre.is_empty() {
            debug!("Load pre steps finished: {:?}", pre.keys().collect::<Vec<_>>());
        }

        let post = self.run_post(phase.post()).await?;
        let mut outcomes: Vec<StepOutcome> = phase
            .steps()
            .iter()
            .zip(loaded)
            .map(|(step, ())| StepOutcome::succeeded(step.id(), None))
            .collect();
        outcomes.extend(
            phase
                .post()
                .iter()
                .map(|step| StepOutcome::succeeded(step.id(), post.get(step.id()).cloned())),
        );
        Ok(outcomes)
    }

    /// Run transform-at-load steps concurrently
    pub async fn run_transform_load(&self, phase: &TransformLoadPhase) -> Result<Vec<StepOutcome>, LoadError> {
        let members = phase
            .steps()
            .iter()
            .map(|step| {
                let step = Arc::clone(step);
                (step.id().to_string(), async move { step.transform_load().await })
            })
            .collect();
        let done = run_concurrent(members).await?;
        Ok(phase
            .steps()
            .iter()
            .zip(done)
            .map(|(step, ())| StepOutcome::succeeded(step.id(), None))
            .collect())
    }
}

fn keyed<'a>(ids: impl Iterator<Item = &'a str>, values: Vec<Data>) -> HashMap<String, Data> {
    ids.map(String::from).zip(values).collect()
}
