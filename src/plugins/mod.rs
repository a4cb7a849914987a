//! Built-in plugins
//!
//! Tabular data is carried as a JSON array of row objects.

pub mod console;
pub mod merge;
pub mod rows;
pub mod secrets;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod transform;

use crate::core::{
    config::StepConfig,
    plugin::{Data, PluginKind, PluginStep},
    registry::PluginRegistry,
};
use anyhow::{bail, Result};
use serde_json::Map;
use std::sync::Arc;
use tracing::warn;

/// A single table row
pub type Row = Map<String, Data>;

/// Register every built-in plugin
pub fn register_builtins(registry: &mut PluginRegistry) {
    add(registry, PluginKind::Extract, "rows", |config| {
        Ok(PluginStep::Extract(Arc::new(rows::RowsExtract::from_config(config)?)))
    });
    add(registry, PluginKind::Load, "console", |config| {
        Ok(PluginStep::Load(Arc::new(console::ConsoleLoad::from_config(config)?)))
    });
    add(registry, PluginKind::MergeExtract, "join", |config| {
        Ok(PluginStep::MergeExtract(Arc::new(merge::Join::from_config(config)?)))
    });
    add(registry, PluginKind::MergeExtract, "concat", |config| {
        Ok(PluginStep::MergeExtract(Arc::new(merge::Concat::from_config(config)?)))
    });
    add(registry, PluginKind::Transform, "drop_columns", |config| {
        Ok(PluginStep::Transform(Arc::new(transform::DropColumns::from_config(config)?)))
    });
    add(registry, PluginKind::Transform, "select_columns", |config| {
        Ok(PluginStep::Transform(Arc::new(transform::SelectColumns::from_config(config)?)))
    });
    add(registry, PluginKind::Transform, "aggregate", |config| {
        Ok(PluginStep::Transform(Arc::new(transform::Aggregate::from_config(config)?)))
    });
    add(registry, PluginKind::SecretManager, "env", |config| {
        Ok(PluginStep::SecretManager(Arc::new(secrets::EnvSecrets::from_config(config)?)))
    });

    #[cfg(feature = "sqlite")]
    sqlite::register(registry);
}

fn add<F>(registry: &mut PluginRegistry, kind: PluginKind, name: &str, constructor: F)
where
    F: Fn(&StepConfig) -> Result<PluginStep> + Send + Sync + 'static,
{
    if let Err(e) = registry.register(kind, name, constructor) {
        warn!("Built-in plugin not registered: {}", e);
    }
}

/// Borrow the rows of a table value
pub fn table<'a>(data: &'a Data, step: &str) -> Result<Vec<&'a Row>> {
    let Some(items) = data.as_array() else {
        bail!("step '{}' expects an array of rows, got {}", step, kind_of(data));
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item.as_object() {
            Some(row) => Ok(row),
            None => bail!("step '{}': row {} is {}, not an object", step, index, kind_of(item)),
        })
        .collect()
}

/// Take ownership of the rows of a table value
pub fn into_table(data: Data, step: &str) -> Result<Vec<Row>> {
    let Data::Array(items) = data else {
        bail!("step '{}' expects an array of rows, got {}", step, kind_of(&data));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Data::Object(row) => Ok(row),
            other => bail!("step '{}': row {} is {}, not an object", step, index, kind_of(&other)),
        })
        .collect()
}

pub fn from_table(rows: Vec<Row>) -> Data {
    Data::Array(rows.into_iter().map(Data::Object).collect())
}

fn kind_of(value: &Data) -> &'static str {
    match value {
        Data::Null => "null",
        Data::Bool(_) => "a boolean",
        Data::Number(_) => "a number",
        Data::String(_) => "a string",
        Data::Array(_) => "an array",
        Data::Object(_) => "an object",
    }
}
