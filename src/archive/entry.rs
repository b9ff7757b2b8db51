use crate::error::{OllamaSaveError, Result};
use crate::models::Digest;
use sha2::{Digest as _, Sha256};
use std::fs::{File, Metadata};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;
use tar::{Builder, EntryType, Header};

/// Reader that counts bytes and optionally hashes them with SHA-256
pub struct HashingReader<R> {
    inner: R,
    hasher: Option<Sha256>,
    bytes: u64,
}

impl<R: Read> HashingReader<R> {
    /// Count bytes only
    pub fn counting(inner: R) -> Self {
        Self {
            inner,
            hasher: None,
            bytes: 0,
        }
    }

    /// Count and hash bytes
    pub fn hashing(inner: R) -> Self {
        Self {
            inner,
            hasher: Some(Sha256::new()),
            bytes: 0,
        }
    }

    /// Choose hashing at runtime
    pub fn new(inner: R, hash: bool) -> Self {
        if hash {
            Self::hashing(inner)
        } else {
            Self::counting(inner)
        }
    }

    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    /// Digest of everything read so far, if hashing was enabled
    #[must_use]
    pub fn finish(self) -> Option<Digest> {
        self.hasher
            .map(|hasher| Digest::from_hex(hex::encode(hasher.finalize())))
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&buf[..n]);
        }
        self.bytes += n as u64;
        Ok(n)
    }
}

/// Compare a computed digest against the expected one
pub fn check_digest(path: &str, expected: &Digest, actual: &Digest) -> Result<()> {
    if expected.hex().eq_ignore_ascii_case(actual.hex()) {
        Ok(())
    } else {
        Err(OllamaSaveError::DigestMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Append a file to the archive under `archive_path`, preserving size, mode and mtime
///
/// With `expected` set, the streamed bytes are hashed and must match it.
/// Returns the number of content bytes written.
pub fn append_file<W: Write>(
    builder: &mut Builder<W>,
    source: &Path,
    archive_path: &str,
    expected: Option<&Digest>,
) -> Result<u64> {
    let file = File::open(source).map_err(|e| OllamaSaveError::file(source, e))?;
    let metadata = file
        .metadata()
        .map_err(|e| OllamaSaveError::file(source, e))?;
    let size = metadata.len();

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(size);
    header.set_mode(file_mode(&metadata));
    header.set_mtime(modified_secs(&metadata));

    // Bound the read to the size recorded in the header
    let mut reader = HashingReader::new(file.take(size), expected.is_some());
    builder
        .append_data(&mut header, archive_path, &mut reader)
        .map_err(|e| OllamaSaveError::Archive(format!("Failed to add {archive_path}: {e}")))?;

    if reader.bytes_read() != size {
        return Err(OllamaSaveError::Archive(format!(
            "{} changed while archiving: expected {size} bytes, read {}",
            source.display(),
            reader.bytes_read()
        )));
    }

    if let (Some(expected), Some(actual)) = (expected, reader.finish()) {
        check_digest(archive_path, expected, &actual)?;
    }

    Ok(size)
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

fn modified_secs(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs())
}
