//! Test: blocking transforms do not stall other pipelines

use crate::helpers::*;
use async_trait::async_trait;
use flowline::core::{Data, Extract, OrchestratorConfig, PipelineType, Plugin, TransformPhase};
use flowline::execution::Orchestrator;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Extract made of several short awaits, so it needs the runtime thread often
struct ChattyExtract;

impl Plugin for ChattyExtract {
    fn id(&self) -> &str {
        "chatty"
    }
}

#[async_trait]
impl Extract for ChattyExtract {
    async fn extract(&self) -> anyhow::Result<Data> {
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(json!([]))
    }
}

/// On a single-threaded runtime the 300ms blocking transform overlaps the
/// 300ms async extract of the other pipeline.
#[tokio::test(flavor = "current_thread")]
async fn test_blocking_transform_runs_off_the_runtime() {
    let mut pipelines = vec![
        PipelineBuilder::new("heavy", PipelineType::Etl)
            .extract(single_extract(MockExtract::new("src", json!([]))))
            .transform(
                TransformPhase::new(vec![Arc::new(FnTransform::blocking("crunch", Duration::from_millis(300)))])
                    .unwrap(),
            )
            .load(single_load(RecordingLoad::new("sink")))
            .build(),
        PipelineBuilder::new("io", PipelineType::Etl)
            .extract(single_extract(ChattyExtract))
            .load(single_load(RecordingLoad::new("sink")))
            .build(),
    ];

    let orchestrator = Orchestrator::new(OrchestratorConfig::default().with_concurrency(2)).unwrap();
    let start = Instant::now();
    orchestrator.execute_pipelines(&mut pipelines).await.unwrap();

    assert!(
        start.elapsed() < Duration::from_millis(500),
        "took {:?}, transform blocked the runtime",
        start.elapsed()
    );
}
