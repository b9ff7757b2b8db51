use crate::error::{OllamaSaveError, Result};
use std::fmt;
use std::str::FromStr;

/// Tag used when a specifier omits one
pub const DEFAULT_TAG: &str = "latest";

/// A `name[:tag]` model reference as typed on the command line
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelSpecifier {
    pub name: String,
    pub tag: String,
}

impl ModelSpecifier {
    /// Build a specifier from an explicit name and tag
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Result<Self> {
        let spec = Self {
            name: name.into(),
            tag: tag.into(),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Parse every entry of a list, stopping at the first invalid one
    pub fn parse_all<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Self>> {
        inputs.iter().map(|s| s.as_ref().parse()).collect()
    }

    fn validate(&self) -> Result<()> {
        let invalid = || OllamaSaveError::InvalidSpecifier(self.to_string());

        if self.name.is_empty() || self.tag.is_empty() {
            return Err(invalid());
        }
        // Both parts become path segments under the store root
        if self.name.starts_with('/') || self.name.contains('\\') || self.tag.contains(['/', '\\'])
        {
            return Err(invalid());
        }
        if self
            .name
            .split('/')
            .chain(std::iter::once(self.tag.as_str()))
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid());
        }
        Ok(())
    }
}

impl FromStr for ModelSpecifier {
    type Err = OllamaSaveError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, tag) = match s.split_once(':') {
            Some((name, tag)) => (name, tag),
            None => (s, DEFAULT_TAG),
        };

        Self::new(name, tag).map_err(|_| OllamaSaveError::InvalidSpecifier(s.to_string()))
    }
}

impl fmt::Display for ModelSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}
