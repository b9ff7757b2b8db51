use crate::archive::entry::append_file;
use crate::config::ArchiveConfig;
use crate::error::{OllamaSaveError, Result};
use crate::models::manifest::is_not_found;
use crate::models::{Digest, Manifest, ModelSpecifier, StoreLayout};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use tar::Builder;

/// Default archive file name for `save`
pub const DEFAULT_OUTPUT: &str = "result.tar.gz";

/// Knobs for an export run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub compression_level: u32,
    /// Write each blob digest once per archive instead of once per model
    pub dedup_blobs: bool,
    /// Hash blobs while streaming and compare against their digest
    pub verify_digests: bool,
    pub check_disk_space: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from(&ArchiveConfig::default())
    }
}

impl From<&ArchiveConfig> for ExportOptions {
    fn from(config: &ArchiveConfig) -> Self {
        Self {
            compression_level: config.level(),
            dedup_blobs: config.dedup_blobs,
            verify_digests: config.verify_digests,
            check_disk_space: config.check_disk_space,
        }
    }
}

/// What an export wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub models: usize,
    pub manifests: usize,
    pub blobs: usize,
    pub duplicates_skipped: usize,
    pub bytes: u64,
}

/// One file scheduled for the archive
#[derive(Debug, Clone)]
struct PlannedEntry {
    source: PathBuf,
    archive_path: String,
    size: u64,
    /// Set for blobs, `None` for manifests
    digest: Option<Digest>,
}

#[derive(Debug, Default)]
struct ExportPlan {
    entries: Vec<PlannedEntry>,
    models: usize,
    duplicates_skipped: usize,
}

impl ExportPlan {
    fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// Packs models from a store into a gzip-compressed tar archive
#[derive(Debug, Clone)]
pub struct Exporter {
    layout: StoreLayout,
    options: ExportOptions,
}

impl Exporter {
    #[must_use]
    pub const fn new(layout: StoreLayout, options: ExportOptions) -> Self {
        Self { layout, options }
    }

    /// Export `specs` in order into `output`
    ///
    /// Every manifest and blob is resolved before the archive is opened, so the
    /// first missing or malformed input aborts the run. The archive is written
    /// beside `output` and only renamed into place once complete; on failure
    /// the incomplete file is removed.
    pub fn export(&self, specs: &[ModelSpecifier], output: &Path) -> Result<ExportReport> {
        let plan = self.plan(specs)?;

        if self.options.check_disk_space {
            check_disk_space(output, estimated_archive_size(&plan))?;
        }

        let partial = partial_path(output)?;
        let written = self.write(&plan, &partial).and_then(|report| {
            fs::rename(&partial, output)
                .map(|()| report)
                .map_err(|e| OllamaSaveError::file(output, e))
        });
        match written {
            Ok(report) => {
                tracing::info!(
                    "Exported {} model(s) to {} ({} manifests, {} blobs)",
                    report.models,
                    output.display(),
                    report.manifests,
                    report.blobs
                );
                Ok(report)
            }
            Err(e) => {
                discard_partial(&partial);
                Err(e)
            }
        }
    }

    fn plan(&self, specs: &[ModelSpecifier]) -> Result<ExportPlan> {
        let mut plan = ExportPlan::default();
        let mut seen: HashSet<Digest> = HashSet::new();

        for spec in specs {
            tracing::info!("Collecting {spec}");

            let manifest_file = self.layout.manifest_file(spec);
            let manifest = Manifest::load(&manifest_file).map_err(|e| {
                if is_not_found(&e) {
                    OllamaSaveError::ManifestNotFound {
                        name: spec.name.clone(),
                        tag: spec.tag.clone(),
                        path: manifest_file.clone(),
                    }
                } else {
                    e
                }
            })?;
            let size = fs::metadata(&manifest_file)
                .map_err(|e| OllamaSaveError::file(&manifest_file, e))?
                .len();

            plan.entries.push(PlannedEntry {
                source: manifest_file,
                archive_path: self.layout.manifest_path(spec),
                size,
                digest: None,
            });

            for digest in manifest.blob_digests()? {
                if self.options.dedup_blobs && seen.contains(&digest) {
                    tracing::debug!("Skipping duplicate blob {digest} for {spec}");
                    plan.duplicates_skipped += 1;
                    continue;
                }

                let blob_file = self.layout.blob_file(&digest);
                let metadata = match fs::metadata(&blob_file) {
                    Ok(metadata) if metadata.is_file() => metadata,
                    Ok(_) => {
                        return Err(OllamaSaveError::BlobNotFound {
                            digest: digest.to_string(),
                            path: blob_file,
                        })
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        return Err(OllamaSaveError::BlobNotFound {
                            digest: digest.to_string(),
                            path: blob_file,
                        })
                    }
                    Err(e) => return Err(OllamaSaveError::file(&blob_file, e)),
                };

                plan.entries.push(PlannedEntry {
                    source: blob_file,
                    archive_path: self.layout.blob_path(&digest),
                    size: metadata.len(),
                    digest: Some(digest.clone()),
                });
                seen.insert(digest);
            }

            plan.models += 1;
        }

        Ok(plan)
    }

    fn write(&self, plan: &ExportPlan, path: &Path) -> Result<ExportReport> {
        let file = File::create(path).map_err(|e| OllamaSaveError::file(path, e))?;
        let encoder = GzEncoder::new(
            BufWriter::new(file),
            Compression::new(self.options.compression_level),
        );
        let mut builder = Builder::new(encoder);

        let mut report = ExportReport {
            models: plan.models,
            duplicates_skipped: plan.duplicates_skipped,
            ..ExportReport::default()
        };

        for entry in &plan.entries {
            tracing::debug!("Adding {} ({} bytes)", entry.archive_path, entry.size);

            let expected = entry
                .digest
                .as_ref()
                .filter(|_| self.options.verify_digests);
            report.bytes += append_file(&mut builder, &entry.source, &entry.archive_path, expected)?;

            if entry.digest.is_some() {
                report.blobs += 1;
            } else {
                report.manifests += 1;
            }
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| OllamaSaveError::Archive(format!("Failed to finish tar stream: {e}")))?;
        let writer = encoder
            .finish()
            .map_err(|e| OllamaSaveError::Archive(format!("Failed to finish gzip stream: {e}")))?;
        let file = writer
            .into_inner()
            .map_err(|e| OllamaSaveError::file(path, e.into_error()))?;
        file.sync_all().map_err(|e| OllamaSaveError::file(path, e))?;

        Ok(report)
    }
}

/// Export with default options
pub fn export_models(
    layout: &StoreLayout,
    specs: &[ModelSpecifier],
    output: &Path,
) -> Result<ExportReport> {
    Exporter::new(layout.clone(), ExportOptions::default()).export(specs, output)
}

/// Sibling path the archive is written to before it is complete
fn partial_path(output: &Path) -> Result<PathBuf> {
    let name = output.file_name().ok_or_else(|| {
        OllamaSaveError::Archive(format!(
            "Output path {} does not name a file",
            output.display()
        ))
    })?;
    let mut partial = name.to_os_string();
    partial.push(".partial");
    Ok(output.with_file_name(partial))
}

fn discard_partial(partial: &Path) {
    match fs::remove_file(partial) {
        Ok(()) => tracing::warn!("Removed incomplete archive {}", partial.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            "Failed to remove incomplete archive {}: {e}",
            partial.display()
        ),
    }
}

/// Upper bound for the archive: content plus one header and padding block per entry
fn estimated_archive_size(plan: &ExportPlan) -> u64 {
    plan.total_bytes() + plan.entries.len() as u64 * 1024
}

/// Check the filesystem holding `output` can take `required` bytes
#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn check_disk_space(output: &Path, required: u64) -> Result<()> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let stats = nix::sys::statvfs::statvfs(dir)
        .map_err(|e| OllamaSaveError::file(dir, std::io::Error::from(e)))?;
    let available = stats.blocks_available() as u64 * stats.fragment_size() as u64;

    tracing::debug!(
        "Archive needs up to {required} bytes, {available} bytes available in {}",
        dir.display()
    );

    if available < required {
        return Err(OllamaSaveError::InsufficientSpace {
            required,
            available,
        });
    }

    Ok(())
}

#[cfg(not(unix))]
fn check_disk_space(_output: &Path, _required: u64) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = "sha256:1111111111111111111111111111111111111111111111111111111111111111";
    const LAYER: &str = "sha256:2222222222222222222222222222222222222222222222222222222222222222";

    fn store_with_model(dir: &Path, spec: &ModelSpecifier, blobs: &[&str]) -> StoreLayout {
        let layout = StoreLayout::new(dir);
        let manifest = format!(
            r#"{{"config":{{"digest":"{CONFIG}"}},"layers":[{{"digest":"{LAYER}"}}]}}"#
        );
        let manifest_file = layout.manifest_file(spec);
        fs::create_dir_all(manifest_file.parent().unwrap()).unwrap();
        fs::write(&manifest_file, manifest).unwrap();

        fs::create_dir_all(dir.join("blobs")).unwrap();
        for digest in blobs {
            let digest: Digest = digest.parse().unwrap();
            fs::write(layout.blob_file(&digest), digest.hex()).unwrap();
        }
        layout
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/out/result.tar.gz")).unwrap(),
            PathBuf::from("/tmp/out/result.tar.gz.partial")
        );
        assert_eq!(
            partial_path(Path::new("result.tar.gz")).unwrap(),
            PathBuf::from("result.tar.gz.partial")
        );
        assert!(partial_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_options_from_config() {
        let config = ArchiveConfig {
            compression_level: 12,
            dedup_blobs: true,
            verify_digests: true,
            check_disk_space: false,
        };
        let options = ExportOptions::from(&config);
        assert_eq!(options.compression_level, 9);
        assert!(options.dedup_blobs);
        assert!(options.verify_digests);
        assert!(!options.check_disk_space);
    }

    #[test]
    fn test_plan_order_and_sizes() {
        let temp_dir = TempDir::new().unwrap();
        let spec: ModelSpecifier = "tiny:1b".parse().unwrap();
        let layout = store_with_model(temp_dir.path(), &spec, &[CONFIG, LAYER]);

        let exporter = Exporter::new(layout, ExportOptions::default());
        let plan = exporter.plan(std::slice::from_ref(&spec)).unwrap();

        let paths: Vec<&str> = plan.entries.iter().map(|e| e.archive_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "manifests/registry.ollama.ai/library/tiny/1b",
                "blobs/sha256-1111111111111111111111111111111111111111111111111111111111111111",
                "blobs/sha256-2222222222222222222222222222222222222222222222222222222222222222",
            ]
        );
        assert_eq!(plan.entries[1].size, 64);
        assert_eq!(plan.models, 1);
        assert!(estimated_archive_size(&plan) > plan.total_bytes());
    }

    #[test]
    fn test_plan_dedup_within_run() {
        let temp_dir = TempDir::new().unwrap();
        let spec: ModelSpecifier = "tiny".parse().unwrap();
        let layout = store_with_model(temp_dir.path(), &spec, &[CONFIG, LAYER]);

        let options = ExportOptions {
            dedup_blobs: true,
            ..ExportOptions::default()
        };
        let exporter = Exporter::new(layout, options);
        let plan = exporter.plan(&[spec.clone(), spec]).unwrap();
        assert_eq!(plan.entries.len(), 4);
        assert_eq!(plan.duplicates_skipped, 2);
    }

    #[test]
    fn test_failed_export_leaves_no_files() {
        let temp_dir = TempDir::new().unwrap();
        let spec: ModelSpecifier = "tiny".parse().unwrap();
        // Layer blob intentionally missing
        let layout = store_with_model(temp_dir.path(), &spec, &[CONFIG]);
        let output = temp_dir.path().join("out.tar.gz");

        let err = Exporter::new(layout, ExportOptions::default())
            .export(&[spec], &output)
            .unwrap_err();
        assert!(matches!(err, OllamaSaveError::BlobNotFound { ref digest, .. } if digest == LAYER));
        assert!(!output.exists());
        assert!(!temp_dir.path().join("out.tar.gz.partial").exists());
    }

    #[test]
    fn test_verify_failure_removes_partial() {
        let temp_dir = TempDir::new().unwrap();
        let spec: ModelSpecifier = "tiny".parse().unwrap();
        // Blob contents are not their sha256, so verification must fail
        let layout = store_with_model(temp_dir.path(), &spec, &[CONFIG, LAYER]);
        let output = temp_dir.path().join("out.tar.gz");

        let options = ExportOptions {
            verify_digests: true,
            ..ExportOptions::default()
        };
        let err = Exporter::new(layout, options)
            .export(&[spec], &output)
            .unwrap_err();
        assert!(matches!(err, OllamaSaveError::DigestMismatch { .. }));
        assert!(!output.exists());
        assert!(!temp_dir.path().join("out.tar.gz.partial").exists());
    }

    #[test]
    fn test_failed_rename_removes_partial() {
        let temp_dir = TempDir::new().unwrap();
        let spec: ModelSpecifier = "tiny".parse().unwrap();
        let layout = store_with_model(temp_dir.path(), &spec, &[CONFIG, LAYER]);

        // A non-empty directory cannot be replaced by the finished archive
        let output = temp_dir.path().join("result.tar.gz");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("keep"), b"x").unwrap();

        let options = ExportOptions {
            check_disk_space: false,
            ..ExportOptions::default()
        };
        let err = Exporter::new(layout, options)
            .export(&[spec], &output)
            .unwrap_err();
        assert!(matches!(err, OllamaSaveError::File { ref path, .. } if *path == output));
        assert!(!temp_dir.path().join("result.tar.gz.partial").exists());
        assert!(output.join("keep").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_space_check() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("out.tar.gz");
        assert!(check_disk_space(&output, 1).is_ok());

        let err = check_disk_space(&output, u64::MAX).unwrap_err();
        assert!(matches!(err, OllamaSaveError::InsufficientSpace { .. }));
    }
}
