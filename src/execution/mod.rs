//! Pipeline execution: phases, strategies and the orchestrator

pub mod error;
pub mod executor;
mod group;
pub mod orchestrator;
pub mod scheduler;
pub mod strategy;

pub use error::{ExtractError, LoadError, OrchestratorError, PhaseError, PipelineError, StepFailure, TransformError};
pub use executor::{PhaseExecutor, StepOutcome};
pub use orchestrator::{EventHandler, Orchestrator, OrchestratorEvent};
pub use scheduler::RoundScheduler;
pub use strategy::{strategy_for, EltStrategy, EtlStrategy, EtltStrategy, PipelineStrategy};
