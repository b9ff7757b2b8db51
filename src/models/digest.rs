use crate::error::{OllamaSaveError, Result};
use std::fmt;
use std::str::FromStr;

const ALGORITHM: &str = "sha256";

/// A content digest of the form `sha256:<hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    hex: String,
}

impl Digest {
    /// Hex part of the digest
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Blob file name used in the store: `sha256-<hex>`
    #[must_use]
    pub fn blob_file_name(&self) -> String {
        format!("{ALGORITHM}-{}", self.hex)
    }

    /// Recover a digest from a blob file name (`sha256-<hex>`)
    #[must_use]
    pub fn from_blob_file_name(name: &str) -> Option<Self> {
        let hex = name.strip_prefix(ALGORITHM)?.strip_prefix('-')?;
        is_hex(hex).then(|| Self {
            hex: hex.to_string(),
        })
    }

    /// Build a digest from a hex string produced by hashing
    pub(crate) fn from_hex(hex: String) -> Self {
        Self { hex }
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

impl FromStr for Digest {
    type Err = OllamaSaveError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(ALGORITHM), Some(hex), None) if is_hex(hex) => Ok(Self {
                hex: hex.to_string(),
            }),
            _ => Err(OllamaSaveError::MalformedDigest(s.to_string())),
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ALGORITHM}:{}", self.hex)
    }
}
