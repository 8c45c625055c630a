use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::AnalysisCache;

pub const CONFIG_FILE: &str = ".recheck.toml";

/// Top-level configuration from `.recheck.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// How to reach the external analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Executable to run. Unset means no process engine is configured.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Entry point inside the engine that performs the analysis.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_strategy() -> String {
    "editor-analyze".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            strategy: default_strategy(),
            env: BTreeMap::new(),
        }
    }
}

/// Where the analysis cache is kept between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Relative paths are resolved against the project root.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub persist: bool,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".recheck").join("cache.json")
}

fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            persist: true,
        }
    }
}

impl CacheConfig {
    pub fn resolve_path(&self, project_root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            project_root.join(&self.path)
        }
    }

    /// Load the persisted cache, or start empty when persistence is off.
    pub fn load_cache(&self, project_root: &Path) -> Result<AnalysisCache> {
        if !self.persist {
            return Ok(AnalysisCache::new());
        }
        AnalysisCache::load(&self.resolve_path(project_root))
    }

    /// Persist `cache`; does nothing when persistence is off.
    pub fn save_cache(&self, project_root: &Path, cache: &AnalysisCache) -> Result<()> {
        if !self.persist {
            return Ok(());
        }
        cache.save(&self.resolve_path(project_root))
    }
}

impl Config {
    /// Load configuration from a `.recheck.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse '{}'", path.display()))?;
        Ok(config)
    }

    /// Load from `.recheck.toml` in the given directory or any ancestor, or return defaults.
    pub fn load_or_default(dir: &Path) -> Self {
        let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut current = start.as_path();
        loop {
            let config_path = current.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!(
                            path = %config_path.display(),
                            "failed to load config: {e:#}. Using defaults."
                        );
                        Self::default()
                    }
                };
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Self::default()
    }

    /// Default TOML content for a new project.
    pub fn default_toml() -> String {
        r#"# recheck - incremental analysis configuration

[engine]
# Executable that reads an analysis request on stdin and answers on stdout
# command = "my-engine"
# args = ["--json"]
strategy = "editor-analyze"

[engine.env]
# ENGINE_LOG = "warn"

[cache]
path = ".recheck/cache.json"
persist = true
"#
        .to_string()
    }
}
