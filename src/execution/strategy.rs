//! Pipeline strategies - phase sequencing per pipeline type

use crate::{
    core::{
        phase::PhaseKind,
        pipeline::{Pipeline, PipelineType},
        plugin::Data,
    },
    execution::{
        error::{PhaseError, PipelineError},
        executor::PhaseExecutor,
    },
};
use async_trait::async_trait;
use tracing::{debug, info};

/// Runs the phases of one pipeline in the order its type prescribes
#[async_trait]
pub trait PipelineStrategy: Send + Sync {
    fn pipeline_type(&self) -> PipelineType;

    /// Execute the pipeline. `Ok(true)` means every phase completed.
    async fn execute(&self, pipeline: &Pipeline) -> Result<bool, PipelineError>;
}

/// extract, optional transform, load
#[derive(Debug, Clone, Copy, Default)]
pub struct EtlStrategy {
    executor: PhaseExecutor,
}

/// extract, load, transform at load
#[derive(Debug, Clone, Copy, Default)]
pub struct EltStrategy {
    executor: PhaseExecutor,
}

/// extract, transform, load, transform at load
#[derive(Debug, Clone, Copy, Default)]
pub struct EtltStrategy {
    executor: PhaseExecutor,
}

impl EtlStrategy {
    pub fn new(executor: PhaseExecutor) -> Self {
        Self { executor }
    }
}

impl EltStrategy {
    pub fn new(executor: PhaseExecutor) -> Self {
        Self { executor }
    }
}

impl EtltStrategy {
    pub fn new(executor: PhaseExecutor) -> Self {
        Self { executor }
    }
}

/// Strategy for a pipeline type
pub fn strategy_for(pipeline_type: PipelineType, executor: PhaseExecutor) -> Box<dyn PipelineStrategy> {
    match pipeline_type {
        PipelineType::Etl => Box::new(EtlStrategy::new(executor)),
        PipelineType::Elt => Box::new(EltStrategy::new(executor)),
        PipelineType::Etlt => Box::new(EtltStrategy::new(executor)),
    }
}

#[async_trait]
impl PipelineStrategy for EtlStrategy {
    fn pipeline_type(&self) -> PipelineType {
        PipelineType::Etl
    }

    async fn execute(&self, pipeline: &Pipeline) -> Result<bool, PipelineError> {
        let data = extract(self.executor, pipeline).await?;
        let data = if pipeline.transform().is_some() {
            transform(self.executor, pipeline, data).await?
        } else {
            data
        };
        load(self.executor, pipeline, data).await?;
        Ok(true)
    }
}

#[async_trait]
impl PipelineStrategy for EltStrategy {
    fn pipeline_type(&self) -> PipelineType {
        PipelineType::Elt
    }

    async fn execute(&self, pipeline: &Pipeline) -> Result<bool, PipelineError> {
        let data = extract(self.executor, pipeline).await?;
        load(self.executor, pipeline, data).await?;
        transform_at_load(self.executor, pipeline).await?;
        Ok(true)
    }
}

#[async_trait]
impl PipelineStrategy for EtltStrategy {
    fn pipeline_type(&self) -> PipelineType {
        PipelineType::Etlt
    }

    async fn execute(&self, pipeline: &Pipeline) -> Result<bool, PipelineError> {
        let data = extract(self.executor, pipeline).await?;
        let data = transform(self.executor, pipeline, data).await?;
        load(self.executor, pipeline, data).await?;
        transform_at_load(self.executor, pipeline).await?;
        Ok(true)
    }
}

fn phase_failed(pipeline: &Pipeline, source: impl Into<PhaseError>) -> PipelineError {
    PipelineError::Phase {
        pipeline: pipeline.name.clone(),
        pipeline_type: pipeline.pipeline_type,
        source: source.into(),
    }
}

fn missing(pipeline: &Pipeline, phase: PhaseKind) -> PipelineError {
    PipelineError::MissingPhase {
        pipeline: pipeline.name.clone(),
        phase,
    }
}

async fn extract(executor: PhaseExecutor, pipeline: &Pipeline) -> Result<Data, PipelineError> {
    let phase = pipeline.extract().ok_or_else(|| missing(pipeline, PhaseKind::Extract))?;
    info!("[{}] extract: {} step(s)", pipeline.name, phase.steps().len());
    executor
        .run_extract(phase)
        .await
        .map_err(|e| phase_failed(pipeline, e))
}

/// Transforms are CPU-bound and run on the blocking pool so the async
/// runtime keeps servicing I/O-bound steps of other pipelines.
async fn transform(executor: PhaseExecutor, pipeline: &Pipeline, data: Data) -> Result<Data, PipelineError> {
    let phase = pipeline
        .transform()
        .cloned()
        .ok_or_else(|| missing(pipeline, PhaseKind::Transform))?;
    info!("[{}] transform: {} step(s)", pipeline.name, phase.steps().len());

    let result = tokio::task::spawn_blocking(move || executor.run_transform(&phase, data))
        .await
        .map_err(|join_error| PipelineError::TransformTask {
            pipeline: pipeline.name.clone(),
            reason: join_error.to_string(),
        })?;
    result.map_err(|e| phase_failed(pipeline, e))
}

async fn load(executor: PhaseExecutor, pipeline: &Pipeline, data: Data) -> Result<(), PipelineError> {
    let phase = pipeline.load().ok_or_else(|| missing(pipeline, PhaseKind::Load))?;
    info!("[{}] load: {} step(s)", pipeline.name, phase.steps().len());
    let outcomes = executor
        .run_load(phase, data)
        .await
        .map_err(|e| phase_failed(pipeline, e))?;
    debug!("[{}] load outcomes: {:?}", pipeline.name, outcomes);
    Ok(())
}

async fn transform_at_load(executor: PhaseExecutor, pipeline: &Pipeline) -> Result<(), PipelineError> {
    let phase = pipeline
        .transform_at_load()
        .ok_or_else(|| missing(pipeline, PhaseKind::TransformAtLoad))?;
    info!("[{}] transform at load: {} step(s)", pipeline.name, phase.steps().len());
    let outcomes = executor
        .run_transform_load(phase)
        .await
        .map_err(|e| phase_failed(pipeline, e))?;
    debug!("[{}] transform at load outcomes: {:?}", pipeline.name, outcomes);
    Ok(())
}
