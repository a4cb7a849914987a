//! Run configuration from YAML

use crate::core::{
    phase::{Phase, PhaseKind, PhaseSteps},
    pipeline::{Pipeline, PipelineType},
    plugin::{PluginKind, PluginStep, SecretManager},
    registry::PluginRegistry,
};
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

const PLACEHOLDER_PATTERN: &str = r"\$\{\s*(secrets\.)?([A-Za-z_][A-Za-z0-9_]*)\s*\}";

/// Orchestrator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Maximum number of pipelines executing at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Top-level run configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub settings: OrchestratorConfig,

    /// Secret manager used for `${secrets.NAME}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<StepConfig>,

    /// Pipeline definitions keyed by name
    pub pipelines: BTreeMap<String, PipelineConfig>,

    /// Document as written, placeholders unresolved
    #[serde(skip)]
    source: Value,
}

/// Pipeline definition as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(rename = "type")]
    pub pipeline_type: PipelineType,

    pub phases: BTreeMap<PhaseKind, PhaseConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs: Option<Needs>,
}

/// A single dependency or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Needs {
    One(String),
    Many(Vec<String>),
}

impl Needs {
    pub fn names(&self) -> HashSet<String> {
        match self {
            Needs::One(name) => HashSet::from([name.clone()]),
            Needs::Many(names) => names.iter().cloned().collect(),
        }
    }
}

/// Steps of one phase as written in YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseConfig {
    #[serde(default)]
    pub steps: Vec<StepConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre: Vec<StepConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post: Vec<StepConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<StepConfig>,
}

/// A plugin invocation: plugin name, optional id and plugin-specific options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Registered plugin name
    pub plugin: String,

    /// Step id, defaults to the plugin name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Remaining keys, interpreted by the plugin
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

impl StepConfig {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            id: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Effective step id
    pub fn step_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.plugin)
    }

    /// Deserialize the plugin-specific options
    pub fn options<T: DeserializeOwned>(&self) -> Result<T> {
        let mapping: serde_yaml::Mapping = self
            .options
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), v.clone()))
            .collect();
        serde_yaml::from_value(Value::Mapping(mapping))
            .with_context(|| format!("invalid options for step '{}' ({})", self.step_id(), self.plugin))
    }
}

/// Capability expected from the main steps of a phase
fn step_capability(kind: PhaseKind) -> PluginKind {
    match kind {
        PhaseKind::Extract => PluginKind::Extract,
        PhaseKind::Transform => PluginKind::Transform,
        PhaseKind::Load => PluginKind::Load,
        PhaseKind::TransformAtLoad => PluginKind::TransformLoad,
    }
}

impl RunConfig {
    /// Load run configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P, registry: &PluginRegistry) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml(&content, registry)
    }

    /// Parse run configuration from a YAML string, resolving placeholders
    pub fn from_yaml(yaml: &str, registry: &PluginRegistry) -> Result<Self> {
        let mut document: Value = serde_yaml::from_str(yaml).context("invalid YAML document")?;
        let source = document.clone();
        let placeholder = Regex::new(PLACEHOLDER_PATTERN)?;

        let secrets = match document.get("secrets") {
            Some(block) => {
                let mut block = block.clone();
                substitute_variables(&mut block, &placeholder, None)?;
                let step: StepConfig =
                    serde_yaml::from_value(block).context("invalid secrets configuration")?;
                Some(build_secret_manager(registry, &step)?)
            }
            None => None,
        };

        substitute_variables(&mut document, &placeholder, secrets.as_deref())?;

        let mut config: RunConfig = serde_yaml::from_value(document).context("invalid run configuration")?;
        config.validate()?;
        config.source = source;
        Ok(config)
    }

    /// The configuration before substitution. Resolved environment values
    /// and secrets never appear in it, so this is what gets displayed.
    pub fn as_written(&self) -> &Value {
        &self.source
    }

    /// Validate cross-pipeline references and settings
    pub fn validate(&self) -> Result<()> {
        if self.settings.concurrency == 0 {
            anyhow::bail!("settings.concurrency must be greater than zero");
        }
        if self.pipelines.is_empty() {
            anyhow::bail!("no pipelines defined");
        }

        for (name, pipeline) in &self.pipelines {
            if name.trim().is_empty() {
                anyhow::bail!("pipeline names must not be empty");
            }
            let needs = pipeline.needs.as_ref().map(Needs::names).unwrap_or_default();
            for dep in &needs {
                if dep == name {
                    anyhow::bail!("Pipeline '{}' cannot depend on itself", name);
                }
                if !self.pipelines.contains_key(dep) {
                    anyhow::bail!("Pipeline '{}' depends on non-existent pipeline '{}'", name, dep);
                }
            }
        }

        Ok(())
    }

    /// Resolve every step through the registry and build validated pipelines
    pub fn build_pipelines(&self, registry: &PluginRegistry) -> Result<Vec<Pipeline>> {
        self.pipelines
            .iter()
            .map(|(name, config)| {
                config
                    .build(name, registry)
                    .with_context(|| format!("failed to build pipeline '{}'", name))
            })
            .collect()
    }
}

impl PipelineConfig {
    pub fn build(&self, name: &str, registry: &PluginRegistry) -> Result<Pipeline> {
        let mut phases = HashMap::new();

        for (kind, phase_config) in &self.phases {
            let create = |capability: PluginKind, step: &StepConfig| -> Result<PluginStep> {
                registry
                    .create(capability, step)
                    .with_context(|| format!("{} phase", kind))
            };

            let parts = PhaseSteps {
                steps: phase_config
                    .steps
                    .iter()
                    .map(|s| create(step_capability(*kind), s))
                    .collect::<Result<_>>()?,
                pre: phase_config
                    .pre
                    .iter()
                    .map(|s| create(PluginKind::Pre, s))
                    .collect::<Result<_>>()?,
                post: phase_config
                    .post
                    .iter()
                    .map(|s| create(PluginKind::Post, s))
                    .collect::<Result<_>>()?,
                merge: phase_config
                    .merge
                    .as_ref()
                    .map(|s| create(PluginKind::MergeExtract, s))
                    .transpose()?,
            };

            phases.insert(*kind, Phase::build(*kind, parts)?);
        }

        let needs = self.needs.as_ref().map(Needs::names);
        Ok(Pipeline::new(name, self.pipeline_type, phases, needs)?)
    }
}

fn build_secret_manager(registry: &PluginRegistry, step: &StepConfig) -> Result<Arc<dyn SecretManager>> {
    match registry.create(PluginKind::SecretManager, step)? {
        PluginStep::SecretManager(manager) => Ok(manager),
        other => anyhow::bail!("plugin '{}' is not a secret manager ({})", step.plugin, other.kind()),
    }
}

/// Replace `${NAME}` and `${secrets.NAME}` placeholders in every string value
fn substitute_variables(value: &mut Value, placeholder: &Regex, secrets: Option<&dyn SecretManager>) -> Result<()> {
    match value {
        Value::String(text) => {
            if let Some(resolved) = resolve_placeholders(text, placeholder, secrets)? {
                *value = resolved;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                substitute_variables(item, placeholder, secrets)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                substitute_variables(item, placeholder, secrets)?;
            }
        }
        Value::Tagged(tagged) => substitute_variables(&mut tagged.value, placeholder, secrets)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

/// Resolve placeholders in one string. A string made of a single placeholder
/// is re-parsed as a YAML scalar so numbers and booleans keep their type.
fn resolve_placeholders(
    text: &str,
    placeholder: &Regex,
    secrets: Option<&dyn SecretManager>,
) -> Result<Option<Value>> {
    if !placeholder.is_match(text) {
        return Ok(None);
    }

    let lookup = |caps: &Captures| -> Result<String> {
        let name = &caps[2];
        if caps.get(1).is_some() {
            let manager = secrets
                .with_context(|| format!("secret '{}' referenced but no secret manager is configured", name))?;
            manager
                .get_secret(name)?
                .with_context(|| format!("secret '{}' not found", name))
        } else {
            std::env::var(name).with_context(|| format!("environment variable '{}' is not set", name))
        }
    };

    if let Some(caps) = placeholder.captures(text) {
        if caps.get(0).map(|m| m.as_str()) == Some(text.trim()) {
            let resolved = lookup(&caps)?;
            let scalar = match serde_yaml::from_str::<Value>(&resolved) {
                Ok(v @ (Value::Bool(_) | Value::Number(_))) => v,
                _ => Value::String(resolved),
            };
            return Ok(Some(scalar));
        }
    }

    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for caps in placeholder.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        output.push_str(&text[last..whole.start()]);
        output.push_str(&lookup(&caps)?);
        last = whole.end();
    }
    output.push_str(&text[last..]);
    Ok(Some(Value::String(output)))
}
