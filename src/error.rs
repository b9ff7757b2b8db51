use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for ollama-save
#[derive(Error, Debug)]
pub enum OllamaSaveError {
    #[error("Manifest not found for model {name}:{tag} (looked in {})\n\nTroubleshooting:\n- List installed models with: ollama list\n- Check the models directory (--models-dir or OLLAMA_MODELS)", path.display())]
    ManifestNotFound {
        name: String,
        tag: String,
        path: PathBuf,
    },

    #[error("Invalid manifest {}: {source}", path.display())]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed digest '{0}': expected sha256:<hex>")]
    MalformedDigest(String),

    #[error("Blob {digest} not found at {}\n\nTroubleshooting:\n- The model may be partially downloaded. Re-pull it with: ollama pull <model>", path.display())]
    BlobNotFound { digest: String, path: PathBuf },

    #[error("Invalid manifest path structure in archive: {0}")]
    InvalidManifestPath(String),

    #[error("Refusing to extract unsafe archive entry: {0}")]
    UnsafeEntryPath(String),

    #[error("Unsupported archive entry {path} ({kind})")]
    UnsupportedEntry { path: String, kind: String },

    #[error("No models in archive {}", .0.display())]
    EmptyArchive(PathBuf),

    #[error("Invalid model specifier '{0}': expected <name> or <name>:<tag>")]
    InvalidSpecifier(String),

    #[error("Digest mismatch for {path}: expected {expected}, got {actual}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Not enough disk space: {required} bytes required, {available} bytes available")]
    InsufficientSpace { required: u64, available: u64 },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.config/ollama-save/config.toml\n- Run with RUST_LOG=debug for more details")]
    Config(String),

    #[error("IO error at {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OllamaSaveError {
    /// Attach a path to an I/O failure
    pub fn file(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::File {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, OllamaSaveError>;
