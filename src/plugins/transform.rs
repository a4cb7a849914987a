//! Column and aggregation transforms over row tables

use super::{from_table, into_table, Row};
use crate::core::{
    config::StepConfig,
    plugin::{Data, Plugin, Transform},
};
use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::Number;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ColumnsOptions {
    columns: Vec<String>,
}

/// Removes the listed columns from every row; absent columns are ignored
#[derive(Debug, Clone)]
pub struct DropColumns {
    id: String,
    columns: Vec<String>,
}

impl DropColumns {
    pub fn from_config(config: &StepConfig) -> Result<Self> {
        let options: ColumnsOptions = config.options()?;
        Ok(Self {
            id: config.step_id().to_string(),
            columns: options.columns,
        })
    }
}

impl Plugin for DropColumns {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Transform for DropColumns {
    fn transform(&self, data: Data) -> Result<Data> {
        let mut rows = into_table(data, &self.id)?;
        for row in &mut rows {
            for column in &self.columns {
                row.remove(column);
            }
        }
        Ok(from_table(rows))
    }
}

/// Keeps only the listed columns; a missing column becomes null
#[derive(Debug, Clone)]
pub struct SelectColumns {
    id: String,
    columns: Vec<String>,
}

impl SelectColumns {
    pub fn from_config(config: &StepConfig) -> Result<Self> {
        let options: ColumnsOptions = config.options()?;
        Ok(Self {
            id: config.step_id().to_string(),
            columns: options.columns,
        })
    }
}

impl Plugin for SelectColumns {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Transform for SelectColumns {
    fn transform(&self, data: Data) -> Result<Data> {
        let rows = into_table(data, &self.id)?
            .into_iter()
            .map(|mut row| {
                self.columns
                    .iter()
                    .map(|column| (column.clone(), row.remove(column).unwrap_or(Data::Null)))
                    .collect::<Row>()
            })
            .collect();
        Ok(from_table(rows))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Aggregation {
    pub function: AggregateFunction,
    pub column: String,
    /// Output column, defaults to `{function}_{column}`
    #[serde(default)]
    pub alias: Option<String>,
}

impl Aggregation {
    fn output(&self) -> String {
        self.alias.clone().unwrap_or_else(|| {
            let function = match self.function {
                AggregateFunction::Count => "count",
                AggregateFunction::Sum => "sum",
                AggregateFunction::Min => "min",
                AggregateFunction::Max => "max",
                AggregateFunction::Avg => "avg",
            };
            format!("{}_{}", function, self.column)
        })
    }

    /// Fold the non-null values of the group
    fn apply(&self, values: &[&Data]) -> Result<Data> {
        let present: Vec<&Data> = values.iter().copied().filter(|v| !v.is_null()).collect();
        match self.function {
            AggregateFunction::Count => Ok(Data::from(present.len() as u64)),
            AggregateFunction::Sum => sum(&present, &self.column),
            AggregateFunction::Avg => {
                if present.is_empty() {
                    return Ok(Data::Null);
                }
                let total = numbers(&present, &self.column)?.iter().sum::<f64>();
                Ok(float(total / present.len() as f64))
            }
            AggregateFunction::Min => Ok(extreme(&present, Ordering::Less)),
            AggregateFunction::Max => Ok(extreme(&present, Ordering::Greater)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AggregateOptions {
    #[serde(default)]
    group_by: Vec<String>,
    aggregations: Vec<Aggregation>,
}

/// Group rows by key columns and compute aggregates per group.
///
/// Groups appear in order of their first row.
#[derive(Debug, Clone)]
pub struct Aggregate {
    id: String,
    group_by: Vec<String>,
    aggregations: Vec<Aggregation>,
}

impl Aggregate {
    pub fn from_config(config: &StepConfig) -> Result<Self> {
        let options: AggregateOptions = config.options()?;
        if options.aggregations.is_empty() {
            bail!("aggregate step '{}' needs at least one aggregation", config.step_id());
        }
        Ok(Self {
            id: config.step_id().to_string(),
            group_by: options.group_by,
            aggregations: options.aggregations,
        })
    }
}

impl Plugin for Aggregate {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Transform for Aggregate {
    fn transform(&self, data: Data) -> Result<Data> {
        let rows = into_table(data, &self.id)?;

        let mut groups: Vec<(Vec<Data>, Vec<&Row>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for row in &rows {
            let key: Vec<Data> = self
                .group_by
                .iter()
                .map(|column| row.get(column).cloned().unwrap_or(Data::Null))
                .collect();
            let fingerprint = Data::Array(key.clone()).to_string();
            let position = *positions.entry(fingerprint).or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
            groups[position].1.push(row);
        }

        let mut output = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            let mut row: Row = self.group_by.iter().cloned().zip(key).collect();
            for aggregation in &self.aggregations {
                let values: Vec<&Data> = members
                    .iter()
                    .map(|member| member.get(&aggregation.column).unwrap_or(&Data::Null))
                    .collect();
                row.insert(aggregation.output(), aggregation.apply(&values)?);
            }
            output.push(row);
        }
        Ok(from_table(output))
    }
}

fn numbers(values: &[&Data], column: &str) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|value| match value.as_f64() {
            Some(n) => Ok(n),
            None => bail!("column '{}' holds a non-numeric value {}", column, value),
        })
        .collect()
}

/// Integer sum when every value is an integer, float sum otherwise
fn sum(values: &[&Data], column: &str) -> Result<Data> {
    let integers: Option<Vec<i64>> = values.iter().map(|v| v.as_i64()).collect();
    if let Some(integers) = integers {
        return Ok(Data::from(integers.iter().sum::<i64>()));
    }
    Ok(float(numbers(values, column)?.iter().sum()))
}

fn float(value: f64) -> Data {
    Number::from_f64(value).map_or(Data::Null, Data::Number)
}

fn compare(a: &Data, b: &Data) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn extreme(values: &[&Data], wanted: Ordering) -> Data {
    values
        .iter()
        .copied()
        .reduce(|best, value| if compare(value, best) == wanted { value } else { best })
        .cloned()
        .unwrap_or(Data::Null)
}
