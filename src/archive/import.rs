use crate::archive::entry::{check_digest, HashingReader};
use crate::config::ArchiveConfig;
use crate::error::{OllamaSaveError, Result};
use crate::models::layout::{is_contained, BLOBS_DIR, MANIFESTS_DIR};
use crate::models::{Digest, StoreLayout};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tar::EntryType;

/// Knobs for an import run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Hash `blobs/sha256-<hex>` entries while writing and compare against the name
    pub verify_digests: bool,
}

impl From<&ArchiveConfig> for ImportOptions {
    fn from(config: &ArchiveConfig) -> Self {
        Self {
            verify_digests: config.verify_digests,
        }
    }
}

/// What an import wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Regular file entries written to the store
    pub entries: usize,
    pub manifests: usize,
    pub blobs: usize,
    pub bytes: u64,
}

/// Unpacks an archive produced by [`crate::archive::Exporter`] into a store
#[derive(Debug, Clone)]
pub struct Importer {
    layout: StoreLayout,
    options: ImportOptions,
}

impl Importer {
    #[must_use]
    pub const fn new(layout: StoreLayout, options: ImportOptions) -> Self {
        Self { layout, options }
    }

    /// Stream every entry of `archive` into the store, in archive order
    ///
    /// Each entry path is validated before anything is written for it. The first
    /// invalid entry aborts the import; entries already written stay in place.
    pub fn import(&self, archive: &Path) -> Result<ImportReport> {
        let file = File::open(archive).map_err(|e| OllamaSaveError::file(archive, e))?;
        let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        let entries = tar.entries().map_err(|e| {
            OllamaSaveError::Archive(format!("Failed to read {}: {e}", archive.display()))
        })?;

        tracing::info!(
            "Importing {} into {}",
            archive.display(),
            self.layout.root().display()
        );

        let mut report = ImportReport::default();
        for entry in entries {
            let mut entry = entry.map_err(|e| {
                OllamaSaveError::Archive(format!("Failed to read tar header: {e}"))
            })?;
            let raw = match String::from_utf8(entry.path_bytes().into_owned()) {
                Ok(raw) => raw,
                Err(e) => {
                    return Err(OllamaSaveError::UnsafeEntryPath(
                        String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    ))
                }
            };
            let name = normalize(&raw);
            let entry_type = entry.header().entry_type();

            if entry_type.is_pax_global_extensions()
                || entry_type.is_pax_local_extensions()
                || entry_type.is_gnu_longname()
                || entry_type.is_gnu_longlink()
            {
                continue;
            }

            if entry_type.is_dir() {
                self.validate_dir(name)?;
                let target = self.layout.resolve(name);
                fs::create_dir_all(&target).map_err(|e| OllamaSaveError::file(&target, e))?;
                continue;
            }

            if !entry_type.is_file() && entry_type != EntryType::Continuous {
                return Err(OllamaSaveError::UnsupportedEntry {
                    path: raw,
                    kind: format!("{entry_type:?}"),
                });
            }

            self.validate_file(name)?;
            let bytes = self.write_entry(name, &mut entry)?;

            report.entries += 1;
            report.bytes += bytes;
            if is_manifest_entry(name) {
                report.manifests += 1;
            } else if is_blob_entry(name) {
                report.blobs += 1;
            }
        }

        if report.entries == 0 {
            return Err(OllamaSaveError::EmptyArchive(archive.to_path_buf()));
        }

        tracing::info!(
            "Imported {} entries ({} manifests, {} blobs)",
            report.entries,
            report.manifests,
            report.blobs
        );
        Ok(report)
    }

    fn validate_file(&self, name: &str) -> Result<()> {
        if is_manifest_entry(name) {
            if !self.layout.is_valid_manifest_entry(name) {
                return Err(OllamaSaveError::InvalidManifestPath(name.to_string()));
            }
        } else if !is_contained(Path::new(name)) {
            return Err(OllamaSaveError::UnsafeEntryPath(name.to_string()));
        }
        Ok(())
    }

    /// Directories may lead up to the manifest base path or sit below it
    fn validate_dir(&self, name: &str) -> Result<()> {
        let dir = name.trim_end_matches('/');
        if is_manifest_entry(dir) {
            let leads_to_base = self.layout.manifest_base_path().starts_with(&format!("{dir}/"));
            if !leads_to_base && !self.layout.is_valid_manifest_entry(dir) {
                return Err(OllamaSaveError::InvalidManifestPath(name.to_string()));
            }
        }
        if !is_contained(Path::new(dir)) {
            return Err(OllamaSaveError::UnsafeEntryPath(name.to_string()));
        }
        Ok(())
    }

    fn write_entry<R: Read>(&self, name: &str, entry: &mut R) -> Result<u64> {
        let target = self.layout.resolve(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| OllamaSaveError::file(parent, e))?;
        }

        let expected = self.expected_digest(name);
        tracing::debug!("Extracting {name} -> {}", target.display());

        let file = File::create(&target).map_err(|e| OllamaSaveError::file(&target, e))?;
        let mut writer = BufWriter::new(file);
        let mut reader = HashingReader::new(entry, expected.is_some());

        let copied = io::copy(&mut reader, &mut writer).and_then(|n| {
            writer.flush()?;
            Ok(n)
        });
        drop(writer);
        let bytes = copied.map_err(|e| OllamaSaveError::file(&target, e))?;

        if let (Some(expected), Some(actual)) = (expected, reader.finish()) {
            if let Err(e) = check_digest(name, &expected, &actual) {
                if let Err(rm) = fs::remove_file(&target) {
                    tracing::warn!("Failed to remove {}: {rm}", target.display());
                }
                return Err(e);
            }
        }

        Ok(bytes)
    }

    fn expected_digest(&self, name: &str) -> Option<Digest> {
        if !self.options.verify_digests {
            return None;
        }
        let file_name = name.strip_prefix(BLOBS_DIR)?.strip_prefix('/')?;
        let digest = Digest::from_blob_file_name(file_name);
        if digest.is_none() {
            tracing::debug!("{name} is not named by digest, skipping verification");
        }
        digest
    }
}

/// Import with default options
pub fn import_models(layout: &StoreLayout, archive: &Path) -> Result<ImportReport> {
    Importer::new(layout.clone(), ImportOptions::default()).import(archive)
}

fn is_manifest_entry(name: &str) -> bool {
    name == MANIFESTS_DIR || name.starts_with(&format!("{MANIFESTS_DIR}/"))
}

fn is_blob_entry(name: &str) -> bool {
    name.strip_prefix(BLOBS_DIR)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Drop leading `./` segments that `tar -C dir .` style archives carry
fn normalize(name: &str) -> &str {
    let mut name = name;
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    name
}
