use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Engine settings for the buildah backend.
///
/// Nothing here is read from ambient process state at build time: the CLI
/// loads a config file (or uses defaults) and hands the value to
/// [`BuildahBackend::new`](crate::BuildahBackend::new).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_buildah_bin")]
    pub buildah_bin: String,
    /// Overrides the detected store graph root.
    #[serde(default)]
    pub graph_root: Option<PathBuf>,
    /// Overrides the detected store run root.
    #[serde(default)]
    pub run_root: Option<PathBuf>,
    /// Compression used for pushes; empty selects gzip.
    #[serde(default)]
    pub default_compression: String,
    /// Extra environment for every engine invocation (e.g. `BUILDAH_LAYERS`).
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_buildah_bin() -> String {
    "buildah".to_owned()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buildah_bin: default_buildah_bin(),
            graph_root: None,
            run_root: None,
            default_compression: String::new(),
            env: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_store(mut self, graph_root: impl Into<PathBuf>, run_root: impl Into<PathBuf>) -> Self {
        self.graph_root = Some(graph_root.into());
        self.run_root = Some(run_root.into());
        self
    }

    /// Load `~/.config/stevedore/config.toml`, falling back to defaults when
    /// the file does not exist.
    pub fn load_default() -> Result<Self, RuntimeError> {
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            RuntimeError::Config(format!("invalid engine config {}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), RuntimeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(format!("serializing engine config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, RuntimeError> {
    let home = std::env::var("HOME").map_err(|_| RuntimeError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/stevedore/config.toml"))
}
