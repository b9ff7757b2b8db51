//! Path resolution for the Ollama model store
//!
//! The store keeps manifests under `manifests/<registry-host>/<namespace>/<name>/<tag>`
//! and blobs under `blobs/sha256-<hex>`. Relative paths use forward slashes because
//! they double as archive entry names.

use crate::models::digest::Digest;
use crate::models::spec::ModelSpecifier;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_REGISTRY_HOST: &str = "registry.ollama.ai";
pub const DEFAULT_NAMESPACE: &str = "library";

pub const MANIFESTS_DIR: &str = "manifests";
pub const BLOBS_DIR: &str = "blobs";

/// Model store rooted at a directory, with the registry segment it serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
    registry_host: String,
    namespace: String,
}

impl StoreLayout {
    /// Layout with the default registry host and namespace
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registry_host: DEFAULT_REGISTRY_HOST.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    #[must_use]
    pub fn with_registry_host(mut self, host: impl Into<String>) -> Self {
        self.registry_host = host.into();
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn registry_host(&self) -> &str {
        &self.registry_host
    }

    /// Fixed prefix every manifest entry must start with, trailing slash included
    #[must_use]
    pub fn manifest_base_path(&self) -> String {
        format!(
            "{MANIFESTS_DIR}/{}/{}/",
            self.registry_host, self.namespace
        )
    }

    /// Relative manifest path for a model
    #[must_use]
    pub fn manifest_path(&self, spec: &ModelSpecifier) -> String {
        format!("{}{}/{}", self.manifest_base_path(), spec.name, spec.tag)
    }

    /// Absolute manifest file location in this store
    #[must_use]
    pub fn manifest_file(&self, spec: &ModelSpecifier) -> PathBuf {
        self.resolve(&self.manifest_path(spec))
    }

    /// Relative blob path for a digest
    #[must_use]
    pub fn blob_path(&self, digest: &Digest) -> String {
        format!("{BLOBS_DIR}/{}", digest.blob_file_name())
    }

    /// Absolute blob file location in this store
    #[must_use]
    pub fn blob_file(&self, digest: &Digest) -> PathBuf {
        self.resolve(&self.blob_path(digest))
    }

    /// Join a forward-slash relative path onto the store root
    #[must_use]
    pub fn resolve(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Whether an archive entry under `manifests/` belongs to this registry segment
    ///
    /// The entry must start with [`Self::manifest_base_path`], name at least one
    /// further segment, and contain no `.`/`..` or empty segments.
    #[must_use]
    pub fn is_valid_manifest_entry(&self, entry: &str) -> bool {
        let Some(rest) = entry.strip_prefix(&self.manifest_base_path()) else {
            return false;
        };
        !rest.is_empty()
            && entry.split('/').all(|segment| {
                !segment.is_empty() && segment != "." && segment != ".."
            })
    }
}

/// Whether a relative entry path stays inside the directory it is joined to
#[must_use]
pub fn is_contained(entry: &Path) -> bool {
    entry.components().next().is_some()
        && entry
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Relative manifest path using the default registry host
#[must_use]
pub fn manifest_path(name: &str, tag: &str) -> String {
    format!("{}{name}/{tag}", manifest_base_path())
}

/// Manifest prefix using the default registry host
#[must_use]
pub fn manifest_base_path() -> String {
    format!("{MANIFESTS_DIR}/{DEFAULT_REGISTRY_HOST}/{DEFAULT_NAMESPACE}/")
}

/// Absolute blob path for a raw `sha256:<hex>` digest string
pub fn blob_path(store_root: &Path, digest: &str) -> crate::error::Result<PathBuf> {
    let digest: Digest = digest.parse()?;
    Ok(store_root.join(BLOBS_DIR).join(digest.blob_file_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "a8ed5e3d8e2c7cb1d6e1d0f0d5e5d27b9c6d1f7bb4f0a1c6c3fbbf1d1b0f2e11";

    fn digest() -> Digest {
        format!("sha256:{HEX}").parse().unwrap()
    }

    #[test]
    fn test_default_manifest_paths() {
        assert_eq!(
            manifest_base_path(),
            "manifests/registry.ollama.ai/library/"
        );
        assert_eq!(
            manifest_path("llama3", "8b"),
            "manifests/registry.ollama.ai/library/llama3/8b"
        );

        let layout = StoreLayout::new("/store");
        let spec = ModelSpecifier::new("llama3", "8b").unwrap();
        assert_eq!(layout.manifest_path(&spec), manifest_path("llama3", "8b"));
        assert_eq!(layout.manifest_base_path(), manifest_base_path());
    }

    #[test]
    fn test_custom_registry_host() {
        let layout = StoreLayout::new("/store")
            .with_registry_host("registry.example.com")
            .with_namespace("team");
        assert_eq!(layout.manifest_base_path(), "manifests/registry.example.com/team/");
        assert!(layout.is_valid_manifest_entry("manifests/registry.example.com/team/m/t"));
        assert!(!layout.is_valid_manifest_entry("manifests/registry.ollama.ai/library/m/t"));
    }

    #[test]
    fn test_blob_paths() {
        let layout = StoreLayout::new("/store");
        assert_eq!(layout.blob_path(&digest()), format!("blobs/sha256-{HEX}"));
        assert_eq!(
            layout.blob_file(&digest()),
            PathBuf::from(format!("/store/blobs/sha256-{HEX}"))
        );
        assert_eq!(
            blob_path(Path::new("/store"), &format!("sha256:{HEX}")).unwrap(),
            PathBuf::from(format!("/store/blobs/sha256-{HEX}"))
        );
    }

    #[test]
    fn test_blob_path_rejects_malformed_digest() {
        let err = blob_path(Path::new("/store"), "sha256").unwrap_err();
        assert!(matches!(err, crate::error::OllamaSaveError::MalformedDigest(_)));
    }

    #[test]
    fn test_manifest_file_is_under_root() {
        let layout = StoreLayout::new("/store");
        let spec: ModelSpecifier = "mistral".parse().unwrap();
        assert_eq!(
            layout.manifest_file(&spec),
            PathBuf::from("/store/manifests/registry.ollama.ai/library/mistral/latest")
        );
    }

    #[test]
    fn test_manifest_entry_validation() {
        let layout = StoreLayout::new("/store");
        assert!(layout.is_valid_manifest_entry("manifests/registry.ollama.ai/library/llama3/8b"));
        assert!(!layout.is_valid_manifest_entry("manifests/registry.ollama.ai/library/"));
        assert!(!layout.is_valid_manifest_entry("manifests/evil/../../etc/passwd"));
        assert!(!layout.is_valid_manifest_entry(
            "manifests/registry.ollama.ai/library/../../../../etc/passwd"
        ));
        assert!(!layout.is_valid_manifest_entry("manifests/registry.ollama.ai/libraryx/a/b"));
        assert!(!layout.is_valid_manifest_entry("manifests/hub.docker.com/library/a/b"));
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained(Path::new("blobs/sha256-abc")));
        assert!(is_contained(Path::new("./blobs/x")));
        assert!(!is_contained(Path::new("")));
        assert!(!is_contained(Path::new("/etc/passwd")));
        assert!(!is_contained(Path::new("blobs/../../x")));
    }
}
