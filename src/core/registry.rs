//! Plugin registry
//!
//! Maps `(PluginKind, name)` to a constructor. The registry is filled once at
//! startup through explicit `register` calls and only read afterwards.

use crate::core::{
    config::StepConfig,
    plugin::{PluginKind, PluginStep},
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Builds a plugin step from its configuration block
pub type PluginConstructor = Arc<dyn Fn(&StepConfig) -> anyhow::Result<PluginStep> + Send + Sync>;

/// Error types for plugin lookup and construction
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no {kind} plugin registered under '{name}'")]
    NotFound { kind: PluginKind, name: String },

    #[error("{kind} plugin '{name}' is already registered")]
    AlreadyRegistered { kind: PluginKind, name: String },

    #[error("{kind} plugin '{name}' built a {found} step")]
    CapabilityMismatch {
        kind: PluginKind,
        name: String,
        found: PluginKind,
    },

    #[error("failed to construct {kind} plugin '{name}' (step '{id}'): {source}")]
    Construction {
        kind: PluginKind,
        name: String,
        id: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Default, Clone)]
pub struct PluginRegistry {
    constructors: HashMap<(PluginKind, String), PluginConstructor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in plugin
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::plugins::register_builtins(&mut registry);
        registry
    }

    /// Register a constructor, failing if the name is already taken for `kind`
    pub fn register<F>(&mut self, kind: PluginKind, name: &str, constructor: F) -> Result<(), RegistryError>
    where
        F: Fn(&StepConfig) -> anyhow::Result<PluginStep> + Send + Sync + 'static,
    {
        let key = (kind, name.to_string());
        if self.constructors.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered {
                kind,
                name: name.to_string(),
            });
        }
        self.constructors.insert(key, Arc::new(constructor));
        Ok(())
    }

    pub fn get(&self, kind: PluginKind, name: &str) -> Result<&PluginConstructor, RegistryError> {
        self.constructors
            .get(&(kind, name.to_string()))
            .ok_or_else(|| RegistryError::NotFound {
                kind,
                name: name.to_string(),
            })
    }

    pub fn contains(&self, kind: PluginKind, name: &str) -> bool {
        self.constructors.contains_key(&(kind, name.to_string()))
    }

    /// Construct a step and check it carries the requested capability
    pub fn create(&self, kind: PluginKind, config: &StepConfig) -> Result<PluginStep, RegistryError> {
        let constructor = self.get(kind, &config.plugin)?;
        let step = constructor(config).map_err(|source| RegistryError::Construction {
            kind,
            name: config.plugin.clone(),
            id: config.step_id().to_string(),
            source,
        })?;

        if step.kind() != kind {
            return Err(RegistryError::CapabilityMismatch {
                kind,
                name: config.plugin.clone(),
                found: step.kind(),
            });
        }
        Ok(step)
    }

    /// Registered plugin names grouped by capability
    pub fn names(&self) -> BTreeMap<PluginKind, Vec<&str>> {
        let mut names: BTreeMap<PluginKind, Vec<&str>> = BTreeMap::new();
        for (kind, name) in self.constructors.keys() {
            names.entry(*kind).or_default().push(name.as_str());
        }
        for list in names.values_mut() {
            list.sort_unstable();
        }
        names
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
