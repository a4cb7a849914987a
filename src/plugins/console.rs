//! Load step printing data to stdout

use crate::core::{
    config::StepConfig,
    plugin::{Data, Load, Plugin},
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConsoleOptions {
    #[serde(default)]
    pretty: bool,
}

#[derive(Debug, Clone)]
pub struct ConsoleLoad {
    id: String,
    pretty: bool,
}

impl ConsoleLoad {
    pub fn from_config(config: &StepConfig) -> anyhow::Result<Self> {
        let options: ConsoleOptions = config.options()?;
        Ok(Self {
            id: config.step_id().to_string(),
            pretty: options.pretty,
        })
    }

    fn render(&self, data: &Data) -> anyhow::Result<String> {
        let text = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(text)
    }
}

impl Plugin for ConsoleLoad {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Load for ConsoleLoad {
    async fn load(&self, data: &Data) -> anyhow::Result<()> {
        let text = self.render(data)?;
        debug!("Step '{}' writing {} bytes", self.id, text.len());
        println!("{}", text);
        Ok(())
    }
}
