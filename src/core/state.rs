//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution status of a single pipeline within a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    /// Pipeline has not started
    #[default]
    Pending,
    /// Pipeline strategy is executing
    Running {
        started_at: DateTime<Utc>,
    },
    /// Strategy completed without error
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Strategy raised a phase error
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Pipeline was interrupted because a sibling failed
    Cancelled {
        started_at: DateTime<Utc>,
        cancelled_at: DateTime<Utc>,
    },
}

impl PipelineStatus {
    pub fn running() -> Self {
        PipelineStatus::Running {
            started_at: Utc::now(),
        }
    }

    /// Transition a running pipeline to completed
    pub fn complete(&self) -> Self {
        PipelineStatus::Completed {
            started_at: self.started_at().unwrap_or_else(Utc::now),
            completed_at: Utc::now(),
        }
    }

    /// Transition a running pipeline to failed
    pub fn fail(&self, error: String) -> Self {
        PipelineStatus::Failed {
            error,
            started_at: self.started_at().unwrap_or_else(Utc::now),
            failed_at: Utc::now(),
        }
    }

    pub fn cancel(&self) -> Self {
        PipelineStatus::Cancelled {
            started_at: self.started_at().unwrap_or_else(Utc::now),
            cancelled_at: Utc::now(),
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PipelineStatus::Pending => None,
            PipelineStatus::Running { started_at }
            | PipelineStatus::Completed { started_at, .. }
            | PipelineStatus::Failed { started_at, .. }
            | PipelineStatus::Cancelled { started_at, .. } => Some(*started_at),
        }
    }

    /// Whether the pipeline has been executed successfully
    pub fn is_executed(&self) -> bool {
        matches!(self, PipelineStatus::Completed { .. })
    }

    /// Check if the status is final for this run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed { .. } | PipelineStatus::Failed { .. } | PipelineStatus::Cancelled { .. }
        )
    }
}
