//! Plugin capability contract
//!
//! Every pipeline step implements exactly the capability traits its role
//! needs. Steps are held behind `Arc` so phases can be cloned cheaply and
//! handed to concurrent tasks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Data flowing between phases
pub type Data = serde_json::Value;

/// Common identity shared by all plugin steps
pub trait Plugin: Send + Sync {
    /// Stable step identifier, unique within its phase
    fn id(&self) -> &str;
}

/// Pulls data from a source
#[async_trait]
pub trait Extract: Plugin {
    async fn extract(&self) -> anyhow::Result<Data>;
}

/// Combines the results of several extract steps into one value
pub trait MergeExtract: Plugin {
    fn merge(&self, data: HashMap<String, Data>) -> anyhow::Result<Data>;
}

/// Synchronous, potentially CPU-heavy data transformation
pub trait Transform: Plugin {
    fn transform(&self, data: Data) -> anyhow::Result<Data>;
}

/// Writes data to a destination
#[async_trait]
pub trait Load: Plugin {
    async fn load(&self, data: &Data) -> anyhow::Result<()>;
}

/// Operates on already loaded destination state
#[async_trait]
pub trait TransformLoad: Plugin {
    async fn transform_load(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PreProcess: Plugin {
    async fn pre_process(&self) -> anyhow::Result<Data>;
}

#[async_trait]
pub trait PostProcess: Plugin {
    async fn post_process(&self) -> anyhow::Result<Data>;
}

/// Resolves secret values referenced from configuration
pub trait SecretManager: Plugin {
    /// Look up a secret, `None` when it is not known
    fn get_secret(&self, key: &str) -> anyhow::Result<Option<String>>;
}

/// Capability tag of a plugin step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Extract,
    MergeExtract,
    Transform,
    Load,
    TransformLoad,
    Pre,
    Post,
    SecretManager,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginKind::Extract => "extract",
            PluginKind::MergeExtract => "merge_extract",
            PluginKind::Transform => "transform",
            PluginKind::Load => "load",
            PluginKind::TransformLoad => "transform_load",
            PluginKind::Pre => "pre",
            PluginKind::Post => "post",
            PluginKind::SecretManager => "secret_manager",
        };
        f.write_str(name)
    }
}

/// A constructed plugin step tagged with its capability
#[derive(Clone)]
pub enum PluginStep {
    Extract(Arc<dyn Extract>),
    MergeExtract(Arc<dyn MergeExtract>),
    Transform(Arc<dyn Transform>),
    Load(Arc<dyn Load>),
    TransformLoad(Arc<dyn TransformLoad>),
    Pre(Arc<dyn PreProcess>),
    Post(Arc<dyn PostProcess>),
    SecretManager(Arc<dyn SecretManager>),
}

impl PluginStep {
    pub fn id(&self) -> &str {
        match self {
            PluginStep::Extract(p) => p.id(),
            PluginStep::MergeExtract(p) => p.id(),
            PluginStep::Transform(p) => p.id(),
            PluginStep::Load(p) => p.id(),
            PluginStep::TransformLoad(p) => p.id(),
            PluginStep::Pre(p) => p.id(),
            PluginStep::Post(p) => p.id(),
            PluginStep::SecretManager(p) => p.id(),
        }
    }

    pub fn kind(&self) -> PluginKind {
        match self {
            PluginStep::Extract(_) => PluginKind::Extract,
            PluginStep::MergeExtract(_) => PluginKind::MergeExtract,
            PluginStep::Transform(_) => PluginKind::Transform,
            PluginStep::Load(_) => PluginKind::Load,
            PluginStep::TransformLoad(_) => PluginKind::TransformLoad,
            PluginStep::Pre(_) => PluginKind::Pre,
            PluginStep::Post(_) => PluginKind::Post,
            PluginStep::SecretManager(_) => PluginKind::SecretManager,
        }
    }
}

impl fmt::Debug for PluginStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginStep")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}
