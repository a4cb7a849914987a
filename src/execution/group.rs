//! Fan-out/fan-in over concurrent step tasks
//!
//! Every member is spawned on the runtime, the group waits for all of them
//! and the first failure cancels the members still running. Results come
//! back in member order, whatever the completion order was.

use crate::execution::{error::StepFailure, executor::StepOutcome};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub(crate) async fn run_concurrent<T, F>(members: Vec<(String, F)>) -> Result<Vec<T>, StepFailure>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let total = members.len();
    let mut ids = Vec::with_capacity(total);
    let mut tasks = JoinSet::new();

    for (index, (id, member)) in members.into_iter().enumerate() {
        ids.push(id);
        tasks.spawn(async move { (index, AssertUnwindSafe(member).catch_unwind().await) });
    }

    let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
    let mut settled = Vec::with_capacity(total);
    let mut first_failure: Option<StepFailure> = None;

    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok((index, Ok(Ok(value)))) => {
                settled.push(StepOutcome::succeeded(&ids[index], None));
                results[index] = Some(value);
                continue;
            }
            Ok((index, Ok(Err(error)))) => StepFailure::new(&ids[index], error),
            Ok((index, Err(panic))) => StepFailure::new(
                &ids[index],
                anyhow::anyhow!("step panicked: {}", panic_message(panic.as_ref())),
            ),
            // Expected: siblings cancelled after the first failure.
            Err(join_error) if join_error.is_cancelled() => continue,
            Err(join_error) => StepFailure::new("<unknown>", anyhow::anyhow!("step task failed: {join_error}")),
        };

        settled.push(StepOutcome::failed(&failure.step_id, failure.source.to_string()));
        if first_failure.is_none() {
            first_failure = Some(failure);
            tasks.abort_all();
        }
    }

    if let Some(failure) = first_failure {
        warn!(
            step_id = %failure.step_id,
            settled = ?settled,
            cancelled = total - settled.len(),
            "Concurrent step group failed"
        );
        return Err(failure);
    }

    debug!("Concurrent step group of {} completed", total);

    results
        .into_iter()
        .zip(ids)
        .map(|(value, id)| {
            value.ok_or_else(|| StepFailure::new(id, anyhow::anyhow!("step finished without a result")))
        })
        .collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
