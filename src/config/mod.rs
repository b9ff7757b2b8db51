//! Configuration module for ollama-save
//!
//! Loads config from `$XDG_CONFIG_HOME/ollama-save/config.toml` or `~/.config/ollama-save/config.toml`.
//! Falls back to embedded defaults if file doesn't exist.
//! Partial configs are merged with defaults using serde's default attributes.
//!
//! # Example
//!
//! ```no_run
//! use ollama_save::config::Config;
//!
//! let config = Config::load().expect("Failed to load config");
//! println!("Models directory: {}", config.store.models_dir);
//! println!("Registry host: {}", config.store.registry_host);
//! ```

pub mod schema;

pub use schema::{ArchiveConfig, Config, StoreConfig};

use crate::error::{OllamaSaveError, Result};
use std::path::PathBuf;

/// Expand a leading `~` to the current user's home directory
///
/// Only `~` on its own or followed by a separator is expanded; `~user` forms
/// and every other path are returned unchanged.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => rest,
        _ => return Ok(PathBuf::from(path)),
    };

    let home = dirs::home_dir().ok_or_else(|| {
        OllamaSaveError::Config(format!("Cannot expand '{path}': home directory not found"))
    })?;

    let rest = rest.trim_start_matches(['/', '\\']);
    if rest.is_empty() {
        Ok(home)
    } else {
        Ok(home.join(rest))
    }
}
