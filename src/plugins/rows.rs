//! Inline rows declared in the run configuration

use crate::core::{
    config::StepConfig,
    plugin::{Data, Extract, Plugin},
};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RowsOptions {
    #[serde(default)]
    rows: Vec<Data>,
}

/// Extract step returning a fixed table
#[derive(Debug, Clone)]
pub struct RowsExtract {
    id: String,
    rows: Vec<Data>,
}

impl RowsExtract {
    pub fn new(id: impl Into<String>, rows: Vec<Data>) -> Self {
        Self { id: id.into(), rows }
    }

    pub fn from_config(config: &StepConfig) -> anyhow::Result<Self> {
        let options: RowsOptions = config.options()?;
        super::table(&Data::Array(options.rows.clone()), config.step_id())?;
        Ok(Self::new(config.step_id(), options.rows))
    }
}

impl Plugin for RowsExtract {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Extract for RowsExtract {
    async fn extract(&self) -> anyhow::Result<Data> {
        Ok(Data::Array(self.rows.clone()))
    }
}
