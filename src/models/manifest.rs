use crate::error::{OllamaSaveError, Result};
use crate::models::digest::Digest;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// A layer entry in an Ollama manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestLayer {
    pub digest: String,
}

/// The config entry in an Ollama manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestConfig {
    pub digest: String,
}

/// Ollama model manifest; only the blob references are read, other fields are ignored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub config: ManifestConfig,
    #[serde(default)]
    pub layers: Vec<ManifestLayer>,
}

impl Manifest {
    /// Load and parse a manifest file
    ///
    /// A missing file surfaces as [`OllamaSaveError::File`] with `NotFound`;
    /// callers that know the model name map it to `ManifestNotFound`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read(path).map_err(|e| OllamaSaveError::file(path, e))?;
        Self::parse(path, &content)
    }

    /// Parse manifest bytes read from `path`
    pub fn parse(path: &Path, content: &[u8]) -> Result<Self> {
        serde_json::from_slice(content).map_err(|source| OllamaSaveError::InvalidManifest {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every blob this manifest references: config first, then layers in order
    pub fn blob_digests(&self) -> Result<Vec<Digest>> {
        std::iter::once(&self.config.digest)
            .chain(self.layers.iter().map(|layer| &layer.digest))
            .map(|digest| digest.parse())
            .collect()
    }
}

/// Whether an I/O error means the file is absent
pub(crate) fn is_not_found(err: &OllamaSaveError) -> bool {
    matches!(err, OllamaSaveError::File { source, .. } if source.kind() == ErrorKind::NotFound)
}
