//! Photo identifiers

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Opaque handle naming a single photo file.
///
/// Two refs are equal when their paths are equal; no content comparison is
/// ever made.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoRef(PathBuf);

impl PhotoRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// File name component, or the full path when there is none.
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.display().to_string())
    }
}

impl fmt::Display for PhotoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for PhotoRef {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for PhotoRef {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for PhotoRef {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

impl From<&str> for PhotoRef {
    fn from(path: &str) -> Self {
        Self(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(PhotoRef::from("/shoot/day1/IMG_0001.JPG").file_name(), "IMG_0001.JPG");
        assert_eq!(PhotoRef::from("/").file_name(), "/");
    }

    #[test]
    fn test_serializes_as_plain_path() {
        let photo = PhotoRef::from("a/b.jpg");
        assert_eq!(serde_json::to_string(&photo).unwrap(), "\"a/b.jpg\"");
    }
}
