//! Merge steps combining several extract results

use super::{from_table, into_table, Row};
use crate::core::{
    config::StepConfig,
    plugin::{Data, MergeExtract, Plugin},
};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinHow {
    #[default]
    Inner,
    Left,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JoinOptions {
    left: String,
    right: String,
    left_on: String,
    right_on: Option<String>,
    #[serde(default)]
    how: JoinHow,
}

/// Key join of two extract results.
///
/// Rows keep the left table's order. On a column name clash the left value
/// wins, except for the right join key which is dropped.
#[derive(Debug, Clone)]
pub struct Join {
    id: String,
    left: String,
    right: String,
    left_on: String,
    right_on: String,
    how: JoinHow,
}

impl Join {
    pub fn from_config(config: &StepConfig) -> Result<Self> {
        let options: JoinOptions = config.options()?;
        let right_on = options.right_on.unwrap_or_else(|| options.left_on.clone());
        Ok(Self {
            id: config.step_id().to_string(),
            left: options.left,
            right: options.right,
            left_on: options.left_on,
            right_on,
            how: options.how,
        })
    }

    fn side(&self, data: &mut HashMap<String, Data>, name: &str) -> Result<Vec<Row>> {
        let value = data
            .remove(name)
            .with_context(|| format!("join '{}' has no input from step '{}'", self.id, name))?;
        into_table(value, name)
    }
}

impl Plugin for Join {
    fn id(&self) -> &str {
        &self.id
    }
}

impl MergeExtract for Join {
    fn merge(&self, mut data: HashMap<String, Data>) -> Result<Data> {
        let left = self.side(&mut data, &self.left)?;
        let right = self.side(&mut data, &self.right)?;

        let mut index: HashMap<String, Vec<&Row>> = HashMap::new();
        for row in &right {
            if let Some(key) = row.get(&self.right_on).filter(|k| !k.is_null()) {
                index.entry(key.to_string()).or_default().push(row);
            }
        }

        let mut joined = Vec::new();
        for row in left {
            let matches = row
                .get(&self.left_on)
                .filter(|k| !k.is_null())
                .and_then(|key| index.get(&key.to_string()));

            match matches {
                Some(matches) => {
                    for other in matches {
                        let mut combined = row.clone();
                        for (column, value) in other.iter() {
                            if column != &self.right_on {
                                combined.entry(column.clone()).or_insert_with(|| value.clone());
                            }
                        }
                        joined.push(combined);
                    }
                }
                None if self.how == JoinHow::Left => joined.push(row),
                None => {}
            }
        }

        Ok(from_table(joined))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConcatOptions {
    #[serde(default)]
    order: Vec<String>,
}

/// Appends tables one after another
#[derive(Debug, Clone)]
pub struct Concat {
    id: String,
    order: Vec<String>,
}

impl Concat {
    pub fn from_config(config: &StepConfig) -> Result<Self> {
        let options: ConcatOptions = config.options()?;
        Ok(Self {
            id: config.step_id().to_string(),
            order: options.order,
        })
    }
}

impl Plugin for Concat {
    fn id(&self) -> &str {
        &self.id
    }
}

impl MergeExtract for Concat {
    fn merge(&self, mut data: HashMap<String, Data>) -> Result<Data> {
        // Sorted ids unless an explicit order is configured
        let order = if self.order.is_empty() {
            let mut ids: Vec<String> = data.keys().cloned().collect();
            ids.sort();
            ids
        } else {
            self.order.clone()
        };

        let mut rows = Vec::new();
        for id in &order {
            let Some(value) = data.remove(id) else {
                bail!("concat '{}' has no input from step '{}'", self.id, id);
            };
            rows.extend(into_table(value, id)?);
        }
        if !data.is_empty() {
            let mut left_over: Vec<&String> = data.keys().collect();
            left_over.sort();
            bail!("concat '{}' order does not mention {:?}", self.id, left_over);
        }
        Ok(from_table(rows))
    }
}
