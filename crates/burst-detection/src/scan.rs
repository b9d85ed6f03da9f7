//! Folder scanning for photos to triage

use std::path::Path;

use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::photo::PhotoRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Descend into subfolders
    pub recursive: bool,
    /// Accepted extensions, lowercase and without the dot
    pub extensions: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
        }
    }
}

impl ScanOptions {
    /// Case-insensitive extension check.
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

/// Collect the photos under `root`, sorted by path.
///
/// The sort fixes the input order the grouper uses to break timestamp ties.
/// Symlinked photos are followed. Hidden files and subfolders are skipped, as
/// are paths that are not valid UTF-8, since sessions store paths as text.
pub fn scan_folder(root: &Path, options: &ScanOptions) -> Result<Vec<PhotoRef>> {
    if !root.is_dir() {
        return Err(Error::BadDirectory(root.to_path_buf()));
    }

    let mut walker = WalkDir::new(root).follow_links(true);
    if !options.recursive {
        walker = walker.max_depth(1);
    }

    let mut photos: Vec<PhotoRef> = walker
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && options.accepts(entry.path()))
        .filter(|entry| {
            let valid = entry.path().to_str().is_some();
            if !valid {
                tracing::warn!(path = %entry.path().display(), "skipping photo with a non-UTF-8 path");
            }
            valid
        })
        .map(|entry| PhotoRef::new(entry.into_path()))
        .collect();

    photos.sort();
    tracing::info!(root = %root.display(), count = photos.len(), "scanned folder");
    Ok(photos)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().as_encoded_bytes().starts_with(b".")
}
