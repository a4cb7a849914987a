//! Test: failures stop the run and name the step that caused them

use crate::helpers::*;
use flowline::core::{ExtractPhase, OrchestratorConfig, PipelineStatus, PipelineType, TransformPhase};
use flowline::execution::{Orchestrator, OrchestratorError, OrchestratorEvent, PhaseError, PipelineError};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn orchestrator() -> Orchestrator {
    Orchestrator::new(OrchestratorConfig::default().with_concurrency(2)).unwrap()
}

#[tokio::test]
async fn test_extract_failure_stops_dependents() {
    let downstream = MockExtract::new("downstream", json!([]));
    let downstream_calls = downstream.calls();

    let mut pipelines = vec![
        PipelineBuilder::new("broken", PipelineType::Etl)
            .extract(single_extract(MockExtract::new("api", json!([])).failing()))
            .load(single_load(RecordingLoad::new("sink")))
            .build(),
        PipelineBuilder::new("dependent", PipelineType::Etl)
            .extract(single_extract(downstream))
            .load(single_load(RecordingLoad::new("sink")))
            .needs(&["broken"])
            .build(),
    ];

    let err = orchestrator().execute_pipelines(&mut pipelines).await.unwrap_err();

    match &err {
        OrchestratorError::PipelineFailed { pipeline, source } => {
            assert_eq!(pipeline, "broken");
            assert_eq!(source.step_id(), Some("api"));
            assert!(matches!(
                source,
                PipelineError::Phase {
                    source: PhaseError::Extract(_),
                    pipeline_type: PipelineType::Etl,
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("could not reach its source"));
    assert!(matches!(pipelines[0].status(), PipelineStatus::Failed { .. }));
    assert_eq!(pipelines[1].status(), &PipelineStatus::Pending);
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 0);
}

/// A failing extract cancels its still-running siblings
#[tokio::test]
async fn test_failed_extract_cancels_siblings() {
    let log = EventLog::new();
    let extract = ExtractPhase::new(
        vec![
            Arc::new(MockExtract::new("slow", json!([])).with_delay(Duration::from_millis(300)).with_log(&log)),
            Arc::new(MockExtract::new("bad", json!([])).failing().with_log(&log)),
        ],
        vec![],
        Some(Arc::new(MappingMerge::new("merge"))),
    )
    .unwrap();
    let mut pipelines = vec![PipelineBuilder::new("p", PipelineType::Etl)
        .extract(extract)
        .load(single_load(RecordingLoad::new("sink")))
        .build()];

    let err = orchestrator().execute_pipelines(&mut pipelines).await.unwrap_err();
    assert!(err.to_string().contains("'bad'"));

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(log.contains("start:slow"));
    assert!(!log.contains("end:slow"));
}

#[tokio::test]
async fn test_transform_failure_skips_load() {
    let sink = RecordingLoad::new("sink");
    let received = sink.received();

    let mut pipelines = vec![PipelineBuilder::new("p", PipelineType::Etl)
        .extract(single_extract(MockExtract::new("src", json!("not a table"))))
        .transform(
            TransformPhase::new(vec![Arc::new(FnTransform::new("parse", |_| anyhow::bail!("unexpected token")))])
                .unwrap(),
        )
        .load(single_load(sink))
        .build()];

    let err = orchestrator().execute_pipelines(&mut pipelines).await.unwrap_err();

    match err {
        OrchestratorError::PipelineFailed { source, .. } => {
            assert_eq!(source.step_id(), Some("parse"));
            assert!(matches!(source, PipelineError::Phase { source: PhaseError::Transform(_), .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_panicking_transform_is_reported() {
    let mut pipelines = vec![PipelineBuilder::new("p", PipelineType::Etl)
        .extract(single_extract(MockExtract::new("src", json!(1))))
        .transform(
            TransformPhase::new(vec![Arc::new(FnTransform::new("explode", |_| panic!("index out of range")))])
                .unwrap(),
        )
        .load(single_load(RecordingLoad::new("sink")))
        .build()];

    let err = orchestrator().execute_pipelines(&mut pipelines).await.unwrap_err();
    match err {
        OrchestratorError::PipelineFailed { source, .. } => assert_eq!(source.step_id(), Some("explode")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_failed_transform_at_load_fails_pipeline() {
    let log = EventLog::new();
    let mut pipelines = vec![PipelineBuilder::new("elt", PipelineType::Elt)
        .extract(single_extract(MockExtract::new("src", json!([]))))
        .load(single_load(RecordingLoad::new("raw")))
        .transform_at_load(
            flowline::core::TransformLoadPhase::new(vec![Arc::new(LoggingStep::new("summary", &log).failing())])
                .unwrap(),
        )
        .build()];

    let err = orchestrator().execute_pipelines(&mut pipelines).await.unwrap_err();
    match err {
        OrchestratorError::PipelineFailed { source, .. } => {
            assert!(matches!(source, PipelineError::Phase { source: PhaseError::Load(_), .. }));
            assert_eq!(source.step_id(), Some("summary"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_failure_events_are_emitted() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let orchestrator = orchestrator().with_event_handler(move |event| sink.lock().unwrap().push(event));

    let mut pipelines = vec![PipelineBuilder::new("broken", PipelineType::Etl)
        .extract(single_extract(MockExtract::new("api", json!([])).failing()))
        .load(single_load(RecordingLoad::new("sink")))
        .build()];
    orchestrator.execute_pipelines(&mut pipelines).await.unwrap_err();

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(e,
        OrchestratorEvent::PipelineFailed { name, step_id: Some(step), .. } if name == "broken" && step == "api")));
    assert!(matches!(events.last(), Some(OrchestratorEvent::RunFinished { success: false, .. })));
}

#[tokio::test]
async fn test_empty_input_is_an_error() {
    let err = orchestrator().execute_pipelines(&mut []).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NothingToExecute));
}
