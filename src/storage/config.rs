//! Storage configuration

use super::{FileType, Version};
use crate::error::{Result, SampleError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a collection is written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Format version
    pub version: Version,
    /// Encoding of the data files
    pub file_type: FileType,
    /// Value separator of ASCII files
    pub delimiter: char,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            version: Version::V3,
            file_type: FileType::Binary,
            delimiter: ' ',
        }
    }
}

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set format version
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Set file type
    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    /// Set ASCII delimiter
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check for values the formats cannot represent
    pub fn validate(&self) -> Result<()> {
        if matches!(self.delimiter, '\n' | '\r' | '-' | '.' | '+') || self.delimiter.is_ascii_alphanumeric() {
            return Err(SampleError::Config(format!(
                "delimiter {:?} collides with line or number syntax",
                self.delimiter
            )));
        }
        Ok(())
    }
}
