//! Secret manager backed by environment variables

use crate::core::{
    config::StepConfig,
    plugin::{Plugin, SecretManager},
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvOptions {
    #[serde(default)]
    prefix: String,
}

/// Resolves `key` from the environment variable `{prefix}{key}`
#[derive(Debug, Clone)]
pub struct EnvSecrets {
    id: String,
    prefix: String,
}

impl EnvSecrets {
    pub fn new(id: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &StepConfig) -> anyhow::Result<Self> {
        let options: EnvOptions = config.options()?;
        Ok(Self::new(config.step_id(), options.prefix))
    }
}

impl Plugin for EnvSecrets {
    fn id(&self) -> &str {
        &self.id
    }
}

impl SecretManager for EnvSecrets {
    fn get_secret(&self, key: &str) -> anyhow::Result<Option<String>> {
        match std::env::var(format!("{}{}", self.prefix, key)) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("secret '{}' is not valid unicode: {}", key, e)),
        }
    }
}
