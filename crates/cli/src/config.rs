// crates/cli/src/config.rs
//! Settings file for the `jobtrail` binary.
//!
//! ```toml
//! [history]
//! namespace = "job_history"
//!
//! [history.defaults]
//! history_len = 200
//!
//! [history.classes.ReportJob]
//! history_len = 50
//!
//! [registry]
//! classes = ["ReportJob"]
//! gzip_args = ["ArchiveJob"]
//! ```

use std::path::Path;
use std::sync::Arc;

use jobtrail_core::{
    ConfigError, GzipArgs, HistorySettings, JobClass, JobRegistry, KeySpace, KvStore, ListQueue,
};
use serde::{Deserialize, Serialize};

/// Job classes the CLI may retry, and which of them compress their args.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub classes: Vec<String>,
    /// Classes whose args use the gzip envelope. Also registered.
    pub gzip_args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub history: HistorySettings,
    pub registry: RegistryConfig,
}

impl CliConfig {
    /// Read and validate `path`, or use defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.history.validate()?;
        Ok(config)
    }

    /// Registry with every configured class, enqueueing through the store.
    pub fn build_registry(&self, store: Arc<dyn KvStore>) -> JobRegistry {
        let keys = KeySpace::new(self.history.namespace.clone());
        let mut registry =
            JobRegistry::new().with_queue(Arc::new(ListQueue::new(store, keys)));
        for class_name in &self.registry.classes {
            registry = registry.register(class_name.clone(), JobClass::new());
        }
        for class_name in &self.registry.gzip_args {
            registry = registry.register(
                class_name.clone(),
                JobClass::new().with_decompressor(Arc::new(GzipArgs)),
            );
        }
        registry
    }
}
