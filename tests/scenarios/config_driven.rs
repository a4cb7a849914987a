//! Test: pipelines built from YAML through the plugin registry

use async_trait::async_trait;
use flowline::core::{Data, Load, Plugin, PluginKind, PluginRegistry, PluginStep, RunConfig};
use flowline::execution::Orchestrator;
use serde_json::json;
use std::sync::{Arc, Mutex};

type Store = Arc<Mutex<Vec<(String, Data)>>>;

/// Load plugin collecting values in memory, keyed by step id
struct MemoryLoad {
    id: String,
    store: Store,
}

impl Plugin for MemoryLoad {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Load for MemoryLoad {
    async fn load(&self, data: &Data) -> anyhow::Result<()> {
        self.store.lock().unwrap().push((self.id.clone(), data.clone()));
        Ok(())
    }
}

fn registry(store: &Store) -> PluginRegistry {
    let mut registry = PluginRegistry::with_builtins();
    let store = store.clone();
    registry
        .register(PluginKind::Load, "memory", move |config| {
            Ok(PluginStep::Load(Arc::new(MemoryLoad {
                id: config.step_id().to_string(),
                store: store.clone(),
            })))
        })
        .unwrap();
    registry
}

const RUN: &str = r#"
settings:
  concurrency: 2
pipelines:
  people:
    type: ETL
    phases:
      extract:
        steps:
          - plugin: rows
            id: staff
            rows:
              - { id: 1, name: Ada, team: core }
              - { id: 2, name: Grace, team: core }
          - plugin: rows
            id: contractors
            rows:
              - { id: 3, name: Linus, team: kernel }
        merge:
          plugin: concat
          order: [staff, contractors]
      transform:
        steps:
          - plugin: aggregate
            group_by: [team]
            aggregations:
              - { function: count, column: id, alias: members }
      load:
        steps:
          - plugin: memory
            id: teams
  audit:
    type: ETL
    needs: [people]
    phases:
      extract:
        steps:
          - plugin: rows
            rows:
              - { event: "${FLOWLINE_SCENARIO_EVENT}" }
      load:
        steps:
          - plugin: memory
            id: audit_log
"#;

#[tokio::test]
async fn test_yaml_pipelines_run_end_to_end() {
    std::env::set_var("FLOWLINE_SCENARIO_EVENT", "nightly");
    let store = Store::default();
    let registry = registry(&store);

    let config = RunConfig::from_yaml(RUN, &registry).unwrap();
    let mut pipelines = config.build_pipelines(&registry).unwrap();
    let orchestrator = Orchestrator::new(config.settings).unwrap();

    let rounds = orchestrator.plan(&pipelines).unwrap();
    assert_eq!(rounds, vec![vec!["people"], vec!["audit"]]);

    let executed = orchestrator.execute_pipelines(&mut pipelines).await.unwrap();
    assert_eq!(executed.len(), 2);

    let store = store.lock().unwrap();
    assert_eq!(
        *store,
        vec![
            (
                "teams".to_string(),
                json!([{"team": "core", "members": 2}, {"team": "kernel", "members": 1}])
            ),
            ("audit_log".to_string(), json!([{"event": "nightly"}])),
        ]
    );
}

#[test]
fn test_unknown_plugin_is_rejected_at_build() {
    let registry = PluginRegistry::with_builtins();
    let config = RunConfig::from_yaml(
        r#"
pipelines:
  p:
    type: ETL
    phases:
      extract:
        steps:
          - plugin: rows
      load:
        steps:
          - plugin: memory
"#,
        &registry,
    )
    .unwrap();

    let err = config.build_pipelines(&registry).unwrap_err();
    assert!(format!("{:#}", err).contains("no load plugin registered under 'memory'"));
}
