//! Round scheduler - determines which pipelines run next

use crate::{core::pipeline::Pipeline, execution::error::OrchestratorError};
use std::collections::HashSet;

/// Tracks executed pipelines and selects dispatch rounds.
///
/// A round holds every pending pipeline whose dependencies are all in the
/// executed set. The next round is only selected once the previous one has
/// been reported through [`RoundScheduler::complete_round`].
#[derive(Debug, Default, Clone)]
pub struct RoundScheduler {
    executed: HashSet<String>,
}

impl RoundScheduler {
    /// Seed the executed set from pipelines that already completed
    pub fn new(pipelines: &[Pipeline]) -> Self {
        Self {
            executed: pipelines
                .iter()
                .filter(|p| p.is_executed())
                .map(|p| p.name.clone())
                .collect(),
        }
    }

    /// Indices of the pipelines eligible for the next round.
    ///
    /// Empty when nothing is pending. Errors when pipelines are pending but
    /// none of them can ever become eligible.
    pub fn next_round(&self, pipelines: &[Pipeline]) -> Result<Vec<usize>, OrchestratorError> {
        let pending: Vec<usize> = (0..pipelines.len())
            .filter(|&i| !self.executed.contains(&pipelines[i].name))
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let ready: Vec<usize> = pending
            .iter()
            .copied()
            .filter(|&i| pipelines[i].dependencies_met(&self.executed))
            .collect();

        if ready.is_empty() {
            let mut names: Vec<String> = pending.iter().map(|&i| pipelines[i].name.clone()).collect();
            names.sort();
            return Err(OrchestratorError::CircularDependency { pending: names });
        }
        Ok(ready)
    }

    pub fn complete_round<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.executed.extend(names.into_iter().map(Into::into));
    }

    pub fn executed(&self) -> &HashSet<String> {
        &self.executed
    }

    pub fn into_executed(self) -> HashSet<String> {
        self.executed
    }

    /// Dry run: the rounds a full execution would dispatch, names sorted
    pub fn plan(pipelines: &[Pipeline]) -> Result<Vec<Vec<String>>, OrchestratorError> {
        let mut scheduler = Self::new(pipelines);
        let mut rounds = Vec::new();
        loop {
            let ready = scheduler.next_round(pipelines)?;
            if ready.is_empty() {
                return Ok(rounds);
            }
            let mut names: Vec<String> = ready.iter().map(|&i| pipelines[i].name.clone()).collect();
            names.sort();
            scheduler.complete_round(names.clone());
            rounds.push(names);
        }
    }
}
