//! Orchestrator - runs a set of pipelines honoring their dependencies

use crate::{
    core::{config::OrchestratorConfig, pipeline::Pipeline, pipeline::PipelineType, state::PipelineStatus},
    execution::{
        error::{OrchestratorError, PipelineError},
        executor::PhaseExecutor,
        scheduler::RoundScheduler,
        strategy::strategy_for,
    },
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur during an orchestrated run
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    RunStarted {
        run_id: Uuid,
        pipelines: usize,
    },
    RoundStarted {
        round: usize,
        pipelines: Vec<String>,
    },
    PipelineStarted {
        name: String,
        pipeline_type: PipelineType,
        worker: usize,
    },
    PipelineCompleted {
        name: String,
        duration: Duration,
    },
    PipelineFailed {
        name: String,
        step_id: Option<String>,
        error: String,
    },
    RunFinished {
        run_id: Uuid,
        executed: Vec<String>,
        success: bool,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(OrchestratorEvent) + Send + Sync>;

type StatusBoard = Arc<Mutex<HashMap<String, PipelineStatus>>>;
type WorkQueue = Arc<Mutex<VecDeque<Pipeline>>>;

/// Runs pipelines round by round with a bounded worker pool
pub struct Orchestrator {
    config: OrchestratorConfig,
    executor: PhaseExecutor,
    event_handlers: Vec<EventHandler>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Result<Self, OrchestratorError> {
        if config.concurrency == 0 {
            return Err(OrchestratorError::InvalidConcurrency);
        }
        Ok(Self {
            config,
            executor: PhaseExecutor::new(),
            event_handlers: Vec::new(),
        })
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(OrchestratorEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    fn emit_event(&self, event: OrchestratorEvent) {
        emit(&self.event_handlers, event);
    }

    /// The dispatch rounds a run would use, without executing anything
    pub fn plan(&self, pipelines: &[Pipeline]) -> Result<Vec<Vec<String>>, OrchestratorError> {
        check_pipelines(pipelines)?;
        RoundScheduler::plan(pipelines)
    }

    /// Execute every pipeline, returning the names of all executed pipelines.
    ///
    /// Each round runs to completion before the next one is selected. A
    /// failing pipeline aborts its round and the run; pipelines of that
    /// round still running are marked cancelled.
    pub async fn execute_pipelines(&self, pipelines: &mut [Pipeline]) -> Result<HashSet<String>, OrchestratorError> {
        check_pipelines(pipelines)?;
        // An unschedulable graph fails before anything is dispatched
        if let Err(e) = RoundScheduler::plan(pipelines) {
            error!("Refusing to start run: {}", e);
            return Err(e);
        }

        let run_id = Uuid::new_v4();
        info!("Starting run {} with {} pipeline(s)", run_id, pipelines.len());
        self.emit_event(OrchestratorEvent::RunStarted {
            run_id,
            pipelines: pipelines.len(),
        });

        let mut scheduler = RoundScheduler::new(pipelines);
        let mut round = 0;

        loop {
            let ready = match scheduler.next_round(pipelines) {
                Ok(ready) => ready,
                Err(e) => {
                    error!("Run {} cannot continue: {}", run_id, e);
                    self.finish(run_id, scheduler.executed(), false);
                    return Err(e);
                }
            };
            if ready.is_empty() {
                break;
            }

            round += 1;
            let names: Vec<String> = ready.iter().map(|&i| pipelines[i].name.clone()).collect();
            info!("Run {} round {}: {}", run_id, round, names.join(", "));
            self.emit_event(OrchestratorEvent::RoundStarted {
                round,
                pipelines: names.clone(),
            });

            let queue: VecDeque<Pipeline> = ready.iter().map(|&i| pipelines[i].clone()).collect();
            let board = StatusBoard::default();
            let result = self.run_round(queue, board.clone()).await;

            let statuses = std::mem::take(&mut *board.lock().await);
            apply_statuses(pipelines, statuses);

            if let Err(e) = result {
                error!("Run {} failed in round {}: {}", run_id, round, e);
                self.finish(run_id, scheduler.executed(), false);
                return Err(e);
            }
            scheduler.complete_round(names);
        }

        let executed = scheduler.into_executed();
        info!("Run {} completed: {} pipeline(s) executed", run_id, executed.len());
        self.finish(run_id, &executed, true);
        Ok(executed)
    }

    fn finish(&self, run_id: Uuid, executed: &HashSet<String>, success: bool) {
        let mut executed: Vec<String> = executed.iter().cloned().collect();
        executed.sort();
        self.emit_event(OrchestratorEvent::RunFinished {
            run_id,
            executed,
            success,
        });
    }

    /// Drain `queue` with a fixed number of workers. The first failure
    /// cancels the remaining workers.
    async fn run_round(&self, queue: VecDeque<Pipeline>, board: StatusBoard) -> Result<(), OrchestratorError> {
        let queue: WorkQueue = Arc::new(Mutex::new(queue));
        let handlers: Arc<[EventHandler]> = self.event_handlers.clone().into();

        let mut workers = JoinSet::new();
        for worker in 0..self.config.concurrency {
            workers.spawn(worker_loop(
                worker,
                queue.clone(),
                board.clone(),
                self.executor,
                handlers.clone(),
            ));
        }

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let error = match joined {
                Ok(Ok(processed)) => {
                    debug!("Worker finished after {} pipeline(s)", processed);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(join_error) if join_error.is_cancelled() => continue,
                Err(join_error) => OrchestratorError::Worker(join_error.to_string()),
            };
            if first_error.is_none() {
                workers.abort_all();
                first_error = Some(error);
            } else {
                warn!("Additional failure in the same round: {}", error);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn emit(handlers: &[EventHandler], event: OrchestratorEvent) {
    for handler in handlers {
        handler(event.clone());
    }
}

fn check_pipelines(pipelines: &[Pipeline]) -> Result<(), OrchestratorError> {
    if pipelines.is_empty() {
        return Err(OrchestratorError::NothingToExecute);
    }
    let mut seen = HashSet::new();
    for pipeline in pipelines {
        if !seen.insert(pipeline.name.as_str()) {
            return Err(OrchestratorError::DuplicatePipeline(pipeline.name.clone()));
        }
    }
    Ok(())
}

/// Copy worker statuses back; entries still running were cancelled
fn apply_statuses(pipelines: &mut [Pipeline], statuses: HashMap<String, PipelineStatus>) {
    for pipeline in pipelines.iter_mut() {
        if let Some(status) = statuses.get(&pipeline.name) {
            let status = match status {
                PipelineStatus::Running { .. } => status.cancel(),
                other => other.clone(),
            };
            pipeline.set_status(status);
        }
    }
}

async fn worker_loop(
    worker: usize,
    queue: WorkQueue,
    board: StatusBoard,
    executor: PhaseExecutor,
    handlers: Arc<[EventHandler]>,
) -> Result<usize, OrchestratorError> {
    let mut processed = 0;
    loop {
        let next = queue.lock().await.pop_front();
        let Some(pipeline) = next else {
            return Ok(processed);
        };

        let running = PipelineStatus::running();
        board.lock().await.insert(pipeline.name.clone(), running.clone());
        info!("Worker {} starting {} pipeline '{}'", worker, pipeline.pipeline_type, pipeline.name);
        emit(
            &handlers,
            OrchestratorEvent::PipelineStarted {
                name: pipeline.name.clone(),
                pipeline_type: pipeline.pipeline_type,
                worker,
            },
        );

        let started = Instant::now();
        let result = strategy_for(pipeline.pipeline_type, executor).execute(&pipeline).await;

        match result {
            Ok(true) => {
                board.lock().await.insert(pipeline.name.clone(), running.complete());
                info!("Pipeline '{}' completed in {:?}", pipeline.name, started.elapsed());
                emit(
                    &handlers,
                    OrchestratorEvent::PipelineCompleted {
                        name: pipeline.name.clone(),
                        duration: started.elapsed(),
                    },
                );
                processed += 1;
            }
            Ok(false) => {
                let error = OrchestratorError::Incomplete {
                    pipeline: pipeline.name.clone(),
                };
                fail(&board, &handlers, &pipeline, &running, None, error.to_string()).await;
                return Err(error);
            }
            Err(e) => {
                fail(
                    &board,
                    &handlers,
                    &pipeline,
                    &running,
                    e.step_id().map(String::from),
                    e.to_string(),
                )
                .await;
                return Err(pipeline_failed(&pipeline, e));
            }
        }
    }
}

async fn fail(
    board: &StatusBoard,
    handlers: &[EventHandler],
    pipeline: &Pipeline,
    running: &PipelineStatus,
    step_id: Option<String>,
    message: String,
) {
    error!("Pipeline '{}' failed: {}", pipeline.name, message);
    board
        .lock()
        .await
        .insert(pipeline.name.clone(), running.fail(message.clone()));
    emit(
        handlers,
        OrchestratorEvent::PipelineFailed {
            name: pipeline.name.clone(),
            step_id,
            error: message,
        },
    );
}

fn pipeline_failed(pipeline: &Pipeline, source: PipelineError) -> OrchestratorError {
    OrchestratorError::PipelineFailed {
        pipeline: pipeline.name.clone(),
        source,
    }
}
