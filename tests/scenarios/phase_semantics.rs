//! Test: data flow between phases and inside each phase

use crate::helpers::*;
use flowline::core::{ExtractPhase, LoadPhase, OrchestratorConfig, PipelineType, TransformLoadPhase, TransformPhase};
use flowline::execution::Orchestrator;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn run(pipeline: flowline::core::Pipeline) {
    let orchestrator = Orchestrator::new(OrchestratorConfig::default()).unwrap();
    orchestrator.execute_pipelines(&mut [pipeline]).await.unwrap();
}

/// Several extracts reach the merge step keyed by step id
#[tokio::test]
async fn test_merge_receives_every_extract() {
    let sink = RecordingLoad::new("sink");
    let received = sink.received();

    let extract = ExtractPhase::new(
        vec![
            Arc::new(MockExtract::new("customers", json!([{"id": 1}])).with_delay(Duration::from_millis(30))),
            Arc::new(MockExtract::new("orders", json!([{"order_id": 7}]))),
        ],
        vec![],
        Some(Arc::new(MappingMerge::new("by_id"))),
    )
    .unwrap();

    run(PipelineBuilder::new("merge", PipelineType::Etl)
        .extract(extract)
        .load(single_load(sink))
        .build())
    .await;

    assert_eq!(
        *received.lock().unwrap(),
        vec![json!({"customers": [{"id": 1}], "orders": [{"order_id": 7}]})]
    );
}

/// One extract step feeds its value straight to the next phase
#[tokio::test]
async fn test_single_extract_passes_raw_value() {
    let sink = RecordingLoad::new("sink");
    let received = sink.received();

    run(PipelineBuilder::new("raw", PipelineType::Etl)
        .extract(single_extract(MockExtract::new("only", json!("x"))))
        .load(single_load(sink))
        .build())
    .await;

    assert_eq!(*received.lock().unwrap(), vec![json!("x")]);
}

/// Transforms compose in declaration order: [f, g] applies g(f(x))
#[tokio::test]
async fn test_transforms_compose_in_order() {
    let sink = RecordingLoad::new("sink");
    let received = sink.received();

    let f = FnTransform::new("f", |data| Ok(json!(data.as_i64().unwrap_or_default() + 1)));
    let g = FnTransform::new("g", |data| Ok(json!(data.as_i64().unwrap_or_default() * 10)));

    run(PipelineBuilder::new("compose", PipelineType::Etl)
        .extract(single_extract(MockExtract::new("n", json!(4))))
        .transform(TransformPhase::new(vec![Arc::new(f), Arc::new(g)]).unwrap())
        .load(single_load(sink))
        .build())
    .await;

    assert_eq!(*received.lock().unwrap(), vec![json!(50)]);
}

/// Two 200ms loads finish together, not one after the other
#[tokio::test]
async fn test_loads_run_concurrently_with_same_data() {
    let warehouse = RecordingLoad::new("warehouse").with_delay(Duration::from_millis(200));
    let archive = RecordingLoad::new("archive").with_delay(Duration::from_millis(200));
    let (a, b) = (warehouse.received(), archive.received());

    let load = LoadPhase::new(vec![Arc::new(warehouse), Arc::new(archive)], vec![], vec![]).unwrap();
    let pipeline = PipelineBuilder::new("fan_out", PipelineType::Etl)
        .extract(single_extract(MockExtract::new("src", json!([1, 2]))))
        .load(load)
        .build();

    let start = Instant::now();
    run(pipeline).await;
    assert!(start.elapsed() < Duration::from_millis(300));

    assert_eq!(*a.lock().unwrap(), vec![json!([1, 2])]);
    assert_eq!(*b.lock().unwrap(), vec![json!([1, 2])]);
}

/// Pre steps run with the loads; post steps only once the loads are done
#[tokio::test]
async fn test_pre_and_post_around_loads() {
    let log = EventLog::new();
    let load = LoadPhase::new(
        vec![Arc::new(RecordingLoad::new("sink").with_delay(Duration::from_millis(50)).with_log(&log))],
        vec![Arc::new(LoggingStep::new("truncate", &log))],
        vec![Arc::new(LoggingStep::new("analyze", &log))],
    )
    .unwrap();

    run(PipelineBuilder::new("hooks", PipelineType::Etl)
        .extract(single_extract(MockExtract::new("src", json!([]))))
        .load(load)
        .build())
    .await;

    assert!(log.position("truncate") < log.position("analyze"));
    assert!(log.position("end:sink") < log.position("analyze"));
}

#[tokio::test]
async fn test_elt_transforms_after_load() {
    let log = EventLog::new();
    run(PipelineBuilder::new("elt", PipelineType::Elt)
        .extract(single_extract(MockExtract::new("src", json!([])).with_log(&log)))
        .load(single_load(RecordingLoad::new("raw").with_log(&log)))
        .transform_at_load(TransformLoadPhase::new(vec![Arc::new(LoggingStep::new("summarize", &log))]).unwrap())
        .build())
    .await;

    assert_eq!(
        log.entries(),
        vec!["start:src", "end:src", "start:raw", "end:raw", "summarize"]
    );
}

#[tokio::test]
async fn test_etlt_runs_all_four_phases() {
    let log = EventLog::new();
    let sink = RecordingLoad::new("staging").with_log(&log);
    let received = sink.received();

    run(PipelineBuilder::new("etlt", PipelineType::Etlt)
        .extract(single_extract(MockExtract::new("src", json!(2)).with_log(&log)))
        .transform(TransformPhase::new(vec![Arc::new(FnTransform::new("square", |d| {
            let n = d.as_i64().unwrap_or_default();
            Ok(json!(n * n))
        }))])
        .unwrap())
        .load(single_load(sink))
        .transform_at_load(TransformLoadPhase::new(vec![Arc::new(LoggingStep::new("publish", &log))]).unwrap())
        .build())
    .await;

    assert_eq!(*received.lock().unwrap(), vec![json!(4)]);
    assert!(log.position("end:staging") < log.position("publish"));
}
