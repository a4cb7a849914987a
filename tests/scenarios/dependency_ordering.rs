//! Test: pipelines start only after everything they need has completed

use crate::helpers::*;
use flowline::core::{OrchestratorConfig, PipelineStatus};
use flowline::execution::{Orchestrator, OrchestratorError};
use std::time::{Duration, Instant};

fn orchestrator(concurrency: usize) -> Orchestrator {
    Orchestrator::new(OrchestratorConfig::default().with_concurrency(concurrency)).unwrap()
}

/// A diamond: report needs orders and customers, archive needs report
#[tokio::test]
async fn test_dependencies_complete_first() {
    let log = EventLog::new();
    let mut pipelines = vec![
        timed_etl("archive", &["report"], 10, &log),
        timed_etl("report", &["orders", "customers"], 10, &log),
        timed_etl("orders", &[], 60, &log),
        timed_etl("customers", &[], 20, &log),
    ];

    let executed = orchestrator(4).execute_pipelines(&mut pipelines).await.unwrap();

    assert_eq!(sorted(&executed), vec!["archive", "customers", "orders", "report"]);
    assert!(log.position("end:orders") < log.position("start:report"));
    assert!(log.position("end:customers") < log.position("start:report"));
    assert!(log.position("end:report") < log.position("start:archive"));
    assert!(pipelines.iter().all(|p| matches!(p.status(), PipelineStatus::Completed { .. })));
}

/// A pipeline whose dependency finished early still waits for its round
#[tokio::test]
async fn test_rounds_are_barriers() {
    let log = EventLog::new();
    let mut pipelines = vec![
        timed_etl("slow", &[], 150, &log),
        timed_etl("fast", &[], 5, &log),
        timed_etl("after_fast", &["fast"], 5, &log),
    ];

    orchestrator(4).execute_pipelines(&mut pipelines).await.unwrap();

    assert!(log.position("end:slow") < log.position("start:after_fast"));
}

#[tokio::test]
async fn test_cycle_executes_nothing() {
    let log = EventLog::new();
    let mut pipelines = vec![
        timed_etl("a", &["b"], 0, &log),
        timed_etl("b", &["a"], 0, &log),
    ];

    let err = orchestrator(2).execute_pipelines(&mut pipelines).await.unwrap_err();

    match err {
        OrchestratorError::CircularDependency { pending } => assert_eq!(pending, vec!["a", "b"]),
        other => panic!("expected a circular dependency error, got {other}"),
    }
    assert!(log.entries().is_empty());
    assert!(pipelines.iter().all(|p| p.status() == &PipelineStatus::Pending));
}

/// A cycle anywhere in the graph stops the run before unrelated pipelines start
#[tokio::test]
async fn test_cycle_blocks_independent_pipelines() {
    let log = EventLog::new();
    let mut pipelines = vec![
        timed_etl("free", &[], 0, &log),
        timed_etl("a", &["b"], 0, &log),
        timed_etl("b", &["a"], 0, &log),
    ];

    let err = orchestrator(2).execute_pipelines(&mut pipelines).await.unwrap_err();

    match err {
        OrchestratorError::CircularDependency { pending } => assert_eq!(pending, vec!["a", "b"]),
        other => panic!("expected a circular dependency error, got {other}"),
    }
    assert!(log.entries().is_empty());
    assert_eq!(pipelines[0].status(), &PipelineStatus::Pending);
}

#[tokio::test]
async fn test_concurrency_bounds_parallelism() {
    let log = EventLog::new();
    let make = || {
        vec![
            timed_etl("one", &[], 100, &log),
            timed_etl("two", &[], 100, &log),
            timed_etl("three", &[], 100, &log),
        ]
    };

    let mut pipelines = make();
    let start = Instant::now();
    orchestrator(3).execute_pipelines(&mut pipelines).await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(250));

    let mut pipelines = make();
    let start = Instant::now();
    orchestrator(1).execute_pipelines(&mut pipelines).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_plan_matches_execution_rounds() {
    let log = EventLog::new();
    let pipelines = vec![
        timed_etl("c", &["a", "b"], 0, &log),
        timed_etl("a", &[], 0, &log),
        timed_etl("b", &["a"], 0, &log),
    ];

    let rounds = orchestrator(2).plan(&pipelines).unwrap();
    assert_eq!(rounds, vec![vec!["a"], vec!["b"], vec!["c"]]);
    assert!(log.entries().is_empty());
}
