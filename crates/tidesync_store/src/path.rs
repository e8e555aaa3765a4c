//! Storage locators.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where the records of one entity type live inside a store.
///
/// A path is one or more `/`-separated segments made of ASCII letters,
/// digits, `_`, `-` and `.`; `.` and `..` segments are rejected so that a
/// path can always be mapped under a store root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoragePath(String);

impl StoragePath {
    /// Validates and creates a storage path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPath`] if the path is empty or has an
    /// empty, relative or non-portable segment.
    pub fn new(path: impl Into<String>) -> StoreResult<Self> {
        let path = path.into();
        if path.is_empty() {
            return Err(StoreError::InvalidPath("empty path".into()));
        }
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StoreError::InvalidPath(format!(
                    "'{}' has an invalid segment",
                    path
                )));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            {
                return Err(StoreError::InvalidPath(format!(
                    "'{}' contains unsupported characters",
                    path
                )));
            }
        }
        Ok(Self(path))
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Maps the path to a relative file path with the given extension.
    #[must_use]
    pub fn to_relative_file(&self, extension: &str) -> PathBuf {
        let mut file: PathBuf = self.0.split('/').collect();
        file.set_extension(extension);
        file
    }
}

impl TryFrom<String> for StoragePath {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StoragePath> for String {
    fn from(path: StoragePath) -> Self {
        path.0
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
