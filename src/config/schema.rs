use crate::config::expand_home;
use crate::error::{OllamaSaveError, Result};
use crate::models::layout::{StoreLayout, DEFAULT_NAMESPACE, DEFAULT_REGISTRY_HOST};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    #[serde(default = "default_registry_host")]
    pub registry_host: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ArchiveConfig {
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    #[serde(default)]
    pub dedup_blobs: bool,
    #[serde(default)]
    pub verify_digests: bool,
    #[serde(default = "default_true")]
    pub check_disk_space: bool,
}

// Default value functions
fn default_models_dir() -> String {
    "~/.ollama/models".to_string()
}
fn default_registry_host() -> String {
    DEFAULT_REGISTRY_HOST.to_string()
}
fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}
fn default_compression_level() -> u32 {
    6
}
fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            registry_host: default_registry_host(),
            namespace: default_namespace(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
            dedup_blobs: false,
            verify_digests: false,
            check_disk_space: default_true(),
        }
    }
}

impl Config {
    /// Load config from the default location, falling back to defaults if missing
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load config from an explicit file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            OllamaSaveError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            OllamaSaveError::Config(format!("Failed to parse {}: {e}", path.display()))
        })?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

impl StoreConfig {
    /// Build the store layout, expanding a leading `~` in the models directory
    pub fn layout(&self) -> Result<StoreLayout> {
        let root = expand_home(&self.models_dir)?;
        Ok(StoreLayout::new(root)
            .with_registry_host(&self.registry_host)
            .with_namespace(&self.namespace))
    }
}

impl ArchiveConfig {
    /// Compression level clamped to the gzip range
    #[must_use]
    pub fn level(&self) -> u32 {
        self.compression_level.min(9)
    }
}

/// Default config file path: `$XDG_CONFIG_HOME/ollama-save/config.toml` or `~/.config/...`
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => dirs::home_dir()?.join(".config"),
    };
    Some(base.join("ollama-save").join("config.toml"))
}
