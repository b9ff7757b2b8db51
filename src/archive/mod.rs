//! Model archive packing and unpacking
//!
//! Archives are gzip-compressed tar streams whose entries mirror the store layout:
//! `manifests/<registry-host>/<namespace>/<name>/<tag>` for manifests and
//! `blobs/sha256-<hex>` for blobs. Both directions stream entry by entry.

pub mod entry;
pub mod export;
pub mod import;

pub use export::{export_models, ExportOptions, ExportReport, Exporter, DEFAULT_OUTPUT};
pub use import::{import_models, ImportOptions, ImportReport, Importer};

/// Format bytes as human-readable string
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_572_864), "1.50 MB");
        assert_eq!(format_bytes(4_661_211_424), "4.34 GB");
    }
}
