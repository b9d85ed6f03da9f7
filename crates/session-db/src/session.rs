//! Editable triage session: groups, picks and the export selection.
//!
//! A session starts from a [`TriageReport`] and is then reshaped by hand:
//! adjacent groups merged, selected frames split off into their own group,
//! frames toggled in and out of the selection, and finally the selection
//! copied to an export folder.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burst_detection::{select_max, TriageReport};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPhoto {
    pub path: String,
    /// Capture time in fractional epoch seconds
    pub timestamp: f64,
    /// Variance of Laplacian, `0.0` for frames that failed to decode
    pub sharpness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionGroup {
    pub id: String,
    pub photos: Vec<SessionPhoto>,
    /// Path of the suggested frame
    pub pick: Option<String>,
}

impl SessionGroup {
    fn contains(&self, path: &str) -> bool {
        self.photos.iter().any(|p| p.path == path)
    }

    /// Keep the pick if it is still a member, otherwise fall back to the
    /// sharpest remaining frame.
    fn refresh_pick(&mut self) {
        if let Some(pick) = &self.pick {
            if self.contains(pick) {
                return;
            }
        }
        let scores: Vec<f64> = self.photos.iter().map(|p| p.sharpness).collect();
        self.pick = select_max(&scores).map(|i| self.photos[i].path.clone());
    }
}

/// Files copied by [`Session::export_selected`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportSummary {
    pub destination: PathBuf,
    pub copied: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Folder the session was built from
    pub root: String,
    pub groups: Vec<SessionGroup>,
    /// Paths marked for export
    pub selected: BTreeSet<String>,
}

/// Paths are stored as text, so non-UTF-8 paths are an error.
fn path_string(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .with_context(|| format!("path is not valid UTF-8: {}", path.display()))
}

impl Session {
    /// One session group per triaged group, each pick pre-selected.
    ///
    /// Fails if any path is not valid UTF-8.
    pub fn from_report(root: &Path, report: &TriageReport) -> Result<Self> {
        let mut selected = BTreeSet::new();
        let groups = report
            .groups
            .iter()
            .map(|triaged| {
                let photos = triaged
                    .group
                    .frames
                    .iter()
                    .zip(&triaged.scores)
                    .map(|(frame, scored)| {
                        Ok(SessionPhoto {
                            path: path_string(frame.photo.path())?,
                            timestamp: frame.timestamp,
                            sharpness: scored.score,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let pick = path_string(triaged.pick.path())?;
                selected.insert(pick.clone());
                Ok(SessionGroup {
                    id: triaged.group.id.clone(),
                    photos,
                    pick: Some(pick),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            root: path_string(root)?,
            groups,
            selected,
        })
    }

    pub fn photo_count(&self) -> usize {
        self.groups.iter().map(|g| g.photos.len()).sum()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.groups.iter().any(|g| g.contains(path))
    }

    fn renumber(&mut self) {
        for (index, group) in self.groups.iter_mut().enumerate() {
            group.id = format!("group_{}", index);
        }
    }

    /// Fold group `index` into the group before it; returns the merged index.
    pub fn merge_with_previous(&mut self, index: usize) -> Result<usize> {
        if index == 0 {
            bail!("the first group has no previous group to merge into");
        }
        if index >= self.groups.len() {
            bail!("group {} does not exist ({} groups)", index, self.groups.len());
        }

        let merged = self.groups.remove(index);
        let target = &mut self.groups[index - 1];
        target.photos.extend(merged.photos);
        if target.pick.is_none() {
            target.pick = merged.pick;
        }
        self.renumber();

        tracing::debug!(into = index - 1, "merged groups");
        Ok(index - 1)
    }

    /// Move the selected frames of group `index` into a new group right after it.
    ///
    /// Returns the new group's index, or `None` when there is nothing to split
    /// (no member or every member selected).
    pub fn split_selected(&mut self, index: usize) -> Result<Option<usize>> {
        let count = self.groups.len();
        let selected = &self.selected;
        let Some(group) = self.groups.get_mut(index) else {
            bail!("group {} does not exist ({} groups)", index, count);
        };

        let (moved, kept): (Vec<SessionPhoto>, Vec<SessionPhoto>) = group
            .photos
            .iter()
            .cloned()
            .partition(|p| selected.contains(&p.path));
        if moved.is_empty() || kept.is_empty() {
            return Ok(None);
        }

        let mut split = SessionGroup {
            id: String::new(),
            photos: moved,
            pick: group.pick.clone(),
        };
        group.photos = kept;
        group.refresh_pick();
        split.refresh_pick();

        self.groups.insert(index + 1, split);
        self.renumber();

        tracing::debug!(from = index, into = index + 1, "split selected frames");
        Ok(Some(index + 1))
    }

    fn require(&self, path: &str) -> Result<()> {
        if !self.contains(path) {
            bail!("{} is not part of this session", path);
        }
        Ok(())
    }

    /// Flip the selection of `path`; returns whether it is now selected.
    pub fn toggle(&mut self, path: &str) -> Result<bool> {
        self.require(path)?;
        if self.selected.remove(path) {
            Ok(false)
        } else {
            self.selected.insert(path.to_string());
            Ok(true)
        }
    }

    pub fn select(&mut self, path: &str) -> Result<()> {
        self.require(path)?;
        self.selected.insert(path.to_string());
        Ok(())
    }

    pub fn deselect(&mut self, path: &str) -> Result<()> {
        self.require(path)?;
        self.selected.remove(path);
        Ok(())
    }

    /// Selected paths in group order.
    pub fn selected_paths(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|g| &g.photos)
            .filter(|p| self.selected.contains(&p.path))
            .map(|p| p.path.clone())
            .collect()
    }

    /// Copy every selected file into `dest` under its own file name.
    ///
    /// Existing files are overwritten and modification times carried over.
    pub fn export_selected(&self, dest: &Path) -> Result<ExportSummary> {
        if !dest.is_dir() {
            bail!("export destination is not a directory: {}", dest.display());
        }

        let mut copied = Vec::new();
        for path in self.selected_paths() {
            let source = Path::new(&path);
            let Some(name) = source.file_name() else {
                bail!("cannot export {}: no file name", path);
            };
            let target = dest.join(name);

            fs::copy(source, &target)
                .with_context(|| format!("Failed to copy {} to {}", source.display(), target.display()))?;
            let modified = fs::metadata(source)
                .and_then(|meta| meta.modified())
                .with_context(|| format!("Failed to read modification time of {}", source.display()))?;
            fs::File::options()
                .write(true)
                .open(&target)
                .and_then(|file| file.set_modified(modified))
                .with_context(|| format!("Failed to set modification time of {}", target.display()))?;

            copied.push(target);
        }

        tracing::info!(count = copied.len(), dest = %dest.display(), "exported selection");
        Ok(ExportSummary {
            destination: dest.to_path_buf(),
            copied,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burst_detection::{BurstGroup, PhotoRef, ScoredPhoto, TimedPhoto, TriagedGroup};
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn photo(path: &str, timestamp: f64, sharpness: f64) -> SessionPhoto {
        SessionPhoto {
            path: path.to_string(),
            timestamp,
            sharpness,
        }
    }

    /// Three groups: [a1 a2 a3] picking a2, [b1] picking b1, [c1 c2] picking c2.
    pub(crate) fn sample_session() -> Session {
        let groups = vec![
            SessionGroup {
                id: "group_0".to_string(),
                photos: vec![photo("/p/a1.jpg", 1.0, 10.0), photo("/p/a2.jpg", 1.2, 50.0), photo("/p/a3.jpg", 1.4, 20.0)],
                pick: Some("/p/a2.jpg".to_string()),
            },
            SessionGroup {
                id: "group_1".to_string(),
                photos: vec![photo("/p/b1.jpg", 5.0, 0.0)],
                pick: Some("/p/b1.jpg".to_string()),
            },
            SessionGroup {
                id: "group_2".to_string(),
                photos: vec![photo("/p/c1.jpg", 9.0, 3.0), photo("/p/c2.jpg", 9.3, 7.0)],
                pick: Some("/p/c2.jpg".to_string()),
            },
        ];
        let selected = ["/p/a2.jpg", "/p/b1.jpg", "/p/c2.jpg"].iter().map(|s| s.to_string()).collect();
        Session {
            root: "/p".to_string(),
            groups,
            selected,
        }
    }

    fn paths(group: &SessionGroup) -> Vec<&str> {
        group.photos.iter().map(|p| p.path.as_str()).collect()
    }

    #[test]
    fn test_merge_with_previous() {
        let mut session = sample_session();
        assert_eq!(session.merge_with_previous(2).unwrap(), 1);

        assert_eq!(session.groups.len(), 2);
        assert_eq!(paths(&session.groups[1]), ["/p/b1.jpg", "/p/c1.jpg", "/p/c2.jpg"]);
        assert_eq!(session.groups[1].pick.as_deref(), Some("/p/b1.jpg"));
        assert_eq!(session.groups[1].id, "group_1");
        assert_eq!(session.photo_count(), 6);
    }

    #[test]
    fn test_merge_rejects_first_and_missing_groups() {
        let mut session = sample_session();
        assert!(session.merge_with_previous(0).is_err());
        assert!(session.merge_with_previous(3).is_err());
        assert_eq!(session, sample_session());
    }

    #[test]
    fn test_split_selected() {
        let mut session = sample_session();
        session.select("/p/a3.jpg").unwrap();

        assert_eq!(session.split_selected(0).unwrap(), Some(1));
        assert_eq!(session.groups.len(), 4);
        assert_eq!(paths(&session.groups[0]), ["/p/a1.jpg"]);
        assert_eq!(paths(&session.groups[1]), ["/p/a2.jpg", "/p/a3.jpg"]);

        // The pick follows its frame; the remainder falls back to its sharpest member
        assert_eq!(session.groups[1].pick.as_deref(), Some("/p/a2.jpg"));
        assert_eq!(session.groups[0].pick.as_deref(), Some("/p/a1.jpg"));

        let ids: Vec<&str> = session.groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, ["group_0", "group_1", "group_2", "group_3"]);
    }

    #[test]
    fn test_split_is_noop_without_partial_selection() {
        let mut session = sample_session();
        // b1 is the only member and it is selected
        assert_eq!(session.split_selected(1).unwrap(), None);

        session.deselect("/p/c2.jpg").unwrap();
        assert_eq!(session.split_selected(2).unwrap(), None);
        assert_eq!(session.groups.len(), 3);

        assert!(session.split_selected(7).is_err());
    }

    #[test]
    fn test_toggle_and_selected_paths() {
        let mut session = sample_session();
        assert_eq!(session.selected_paths(), ["/p/a2.jpg", "/p/b1.jpg", "/p/c2.jpg"]);

        assert!(!session.toggle("/p/b1.jpg").unwrap());
        assert!(session.toggle("/p/a1.jpg").unwrap());
        assert_eq!(session.selected_paths(), ["/p/a1.jpg", "/p/a2.jpg", "/p/c2.jpg"]);

        assert!(session.toggle("/elsewhere/x.jpg").is_err());
        assert!(session.select("/elsewhere/x.jpg").is_err());
    }

    #[test]
    fn test_export_selected() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();

        let keep = source.path().join("keep.jpg");
        let skip = source.path().join("skip.jpg");
        fs::write(&keep, b"keep-bytes").unwrap();
        fs::write(&skip, b"skip-bytes").unwrap();
        let mtime = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        fs::File::options().write(true).open(&keep).unwrap().set_modified(mtime).unwrap();

        // A stale copy in the destination gets replaced
        fs::write(dest.path().join("keep.jpg"), b"old").unwrap();

        let keep_path = keep.to_string_lossy().into_owned();
        let skip_path = skip.to_string_lossy().into_owned();
        let session = Session {
            root: source.path().to_string_lossy().into_owned(),
            groups: vec![SessionGroup {
                id: "group_0".to_string(),
                photos: vec![photo(&keep_path, 0.0, 1.0), photo(&skip_path, 0.1, 0.5)],
                pick: Some(keep_path.clone()),
            }],
            selected: [keep_path].into_iter().collect(),
        };

        let summary = session.export_selected(dest.path()).unwrap();
        assert_eq!(summary.copied, [dest.path().join("keep.jpg")]);

        let exported = dest.path().join("keep.jpg");
        assert_eq!(fs::read(&exported).unwrap(), b"keep-bytes");
        assert_eq!(fs::metadata(&exported).unwrap().modified().unwrap(), mtime);
        assert!(!dest.path().join("skip.jpg").exists());
    }

    fn triaged(paths: &[PathBuf]) -> TriageReport {
        let frames: Vec<TimedPhoto> = paths
            .iter()
            .enumerate()
            .map(|(i, path)| TimedPhoto::new(path.clone(), i as f64 * 0.1))
            .collect();
        let scores = paths
            .iter()
            .enumerate()
            .map(|(i, path)| ScoredPhoto {
                photo: PhotoRef::from(path.clone()),
                score: i as f64,
                failure: None,
            })
            .collect();
        TriageReport {
            groups: vec![TriagedGroup {
                group: BurstGroup::new("group_0".to_string(), frames),
                scores,
                pick: PhotoRef::from(paths[paths.len() - 1].clone()),
            }],
            skipped: Vec::new(),
        }
    }

    #[test]
    fn test_from_report() {
        let report = triaged(&[PathBuf::from("/p/a1.jpg"), PathBuf::from("/p/a2.jpg")]);
        let session = Session::from_report(Path::new("/p"), &report).unwrap();

        assert_eq!(session.root, "/p");
        assert_eq!(paths(&session.groups[0]), ["/p/a1.jpg", "/p/a2.jpg"]);
        assert_eq!(session.groups[0].photos[1].sharpness, 1.0);
        assert_eq!(session.selected_paths(), ["/p/a2.jpg"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_from_report_rejects_non_utf8_paths() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let odd = Path::new("/p").join(OsStr::from_bytes(b"IMG_\xff01.png"));
        let report = triaged(&[PathBuf::from("/p/IMG_0000.png"), odd]);
        let err = Session::from_report(Path::new("/p"), &report).unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_export_requires_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not_a_dir");
        fs::write(&file, b"").unwrap();
        assert!(sample_session().export_selected(&file).is_err());
    }
}
