//! Burst detection and grouping for burstpick
//!
//! Photos are ordered by capture time and split into groups wherever two
//! consecutive timestamps are further apart than the configured threshold.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::exif::{CaptureTime, FileTimestampResolver, TimeSource, TimestampPolicy, TimestampResolver};
use crate::photo::PhotoRef;

/// Default maximum gap between consecutive frames of one burst, in seconds.
pub const DEFAULT_THRESHOLD_SECS: f64 = 0.5;

/// A photo paired with the timestamp it is grouped by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedPhoto {
    pub photo: PhotoRef,
    /// Fractional seconds since the Unix epoch
    pub timestamp: f64,
    /// `None` when the timestamp was supplied directly rather than resolved
    pub source: Option<TimeSource>,
}

impl TimedPhoto {
    pub fn new(photo: impl Into<PhotoRef>, timestamp: f64) -> Self {
        Self {
            photo: photo.into(),
            timestamp,
            source: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstConfig {
    /// Maximum gap in seconds between consecutive frames of one group
    pub threshold_secs: f64,
    pub policy: TimestampPolicy,
    /// Use `SubSecTimeOriginal` to refine EXIF timestamps
    pub subsec_precision: bool,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            threshold_secs: DEFAULT_THRESHOLD_SECS,
            policy: TimestampPolicy::MetadataFirst,
            subsec_precision: false,
        }
    }
}

impl BurstConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold_secs.is_finite() || self.threshold_secs < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "threshold must be a finite number of seconds >= 0, got {}",
                self.threshold_secs
            )));
        }
        Ok(())
    }

    pub fn resolver(&self) -> FileTimestampResolver {
        FileTimestampResolver::new(self.policy).with_subsec_precision(self.subsec_precision)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstGroup {
    /// Position-derived identifier, `group_<n>`
    pub id: String,
    /// Frames in ascending timestamp order
    pub frames: Vec<TimedPhoto>,
    /// Time between the first and last frame (seconds)
    pub duration_secs: f64,
    /// Average gap between consecutive frames (seconds)
    pub avg_gap_secs: f64,
    /// Estimated frames per second
    pub estimated_fps: f64,
}

impl BurstGroup {
    /// Build a group from frames that are already in timestamp order.
    pub fn new(id: String, frames: Vec<TimedPhoto>) -> Self {
        let frame_count = frames.len();
        let (duration_secs, avg_gap_secs, estimated_fps) = match (frames.first(), frames.last()) {
            (Some(first), Some(last)) if frame_count > 1 => {
                let duration = last.timestamp - first.timestamp;
                let gaps: Vec<f64> = frames
                    .windows(2)
                    .map(|pair| pair[1].timestamp - pair[0].timestamp)
                    .collect();
                let avg_gap = gaps.iter().sum::<f64>() / gaps.len() as f64;
                let fps = if duration > 0.0 {
                    frame_count as f64 / duration
                } else {
                    0.0
                };
                (duration, avg_gap, fps)
            }
            _ => (0.0, 0.0, 0.0),
        };

        Self {
            id,
            frames,
            duration_secs,
            avg_gap_secs,
            estimated_fps,
        }
    }

    /// Members in timestamp order.
    pub fn photos(&self) -> Vec<PhotoRef> {
        self.frames.iter().map(|f| f.photo.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.frames.first().map(|f| f.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.frames.last().map(|f| f.timestamp)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BurstResult {
    pub groups: Vec<BurstGroup>,
    /// Photos left out because no timestamp could be resolved
    pub skipped: Vec<PhotoRef>,
}

impl BurstResult {
    /// Number of photos placed in a group
    pub fn total_photos(&self) -> usize {
        self.groups.iter().map(BurstGroup::len).sum()
    }

    pub fn total_groups(&self) -> usize {
        self.groups.len()
    }
}

/// Partition timed photos into groups.
///
/// Frames are stably sorted by timestamp, so equal timestamps keep their input
/// order. A frame joins the current group when its gap to the previous frame
/// is `<= threshold_secs`; otherwise it starts a new one.
pub fn group_timed(mut frames: Vec<TimedPhoto>, threshold_secs: f64) -> Vec<BurstGroup> {
    frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut groups = Vec::new();
    let mut current: Vec<TimedPhoto> = Vec::new();

    for frame in frames {
        if let Some(previous) = current.last() {
            if frame.timestamp - previous.timestamp > threshold_secs {
                let id = format!("group_{}", groups.len());
                groups.push(BurstGroup::new(id, std::mem::take(&mut current)));
            }
        }
        current.push(frame);
    }

    if !current.is_empty() {
        let id = format!("group_{}", groups.len());
        groups.push(BurstGroup::new(id, current));
    }

    groups
}

/// Drop repeated refs, keeping the first occurrence.
fn unique_photos(photos: &[PhotoRef]) -> Vec<PhotoRef> {
    let mut seen = HashSet::with_capacity(photos.len());
    photos
        .iter()
        .filter(|photo| seen.insert(*photo))
        .cloned()
        .collect()
}

/// Resolve every photo in parallel, in input order. Items reached after
/// cancellation come back as `Err(Error::Cancelled)`.
fn resolve_all<R>(resolver: &R, photos: &[PhotoRef], cancel: &CancelToken) -> Vec<Result<CaptureTime>>
where
    R: TimestampResolver + ?Sized,
{
    photos
        .par_iter()
        .map(|photo| {
            cancel.check()?;
            resolver.resolve(photo)
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct BurstDetector {
    config: BurstConfig,
}

impl BurstDetector {
    pub fn new(config: BurstConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::default()
    }

    /// Group photos from disk using the configured timestamp policy.
    ///
    /// Photos without a resolvable timestamp are reported in `skipped`.
    pub fn detect(&self, photos: &[PhotoRef]) -> BurstResult {
        let resolver = self.config.resolver();
        let unique = unique_photos(photos);
        let resolved = resolve_all(&resolver, &unique, &CancelToken::new());
        self.assemble(unique, resolved)
    }

    /// Group photos with a caller-supplied resolver, honouring `cancel`.
    pub fn detect_with<R>(&self, resolver: &R, photos: &[PhotoRef], cancel: &CancelToken) -> Result<BurstResult>
    where
        R: TimestampResolver + ?Sized,
    {
        let unique = unique_photos(photos);
        let resolved = resolve_all(resolver, &unique, cancel);
        cancel.check()?;
        Ok(self.assemble(unique, resolved))
    }

    /// Groups only, in time order.
    pub fn group(&self, photos: &[PhotoRef]) -> Vec<BurstGroup> {
        self.detect(photos).groups
    }

    fn assemble(&self, photos: Vec<PhotoRef>, resolved: Vec<Result<CaptureTime>>) -> BurstResult {
        let mut frames = Vec::with_capacity(photos.len());
        let mut skipped = Vec::new();

        for (photo, capture) in photos.into_iter().zip(resolved) {
            match capture {
                Ok(time) => frames.push(TimedPhoto {
                    photo,
                    timestamp: time.seconds,
                    source: Some(time.source),
                }),
                Err(err) => {
                    tracing::debug!(photo = %photo, error = %err, "skipping photo without a timestamp");
                    skipped.push(photo);
                }
            }
        }

        let groups = group_timed(frames, self.config.threshold_secs);
        tracing::info!(
            groups = groups.len(),
            skipped = skipped.len(),
            threshold = self.config.threshold_secs,
            "grouped photos into bursts"
        );

        BurstResult { groups, skipped }
    }
}

/// Partition photos into time-contiguous groups, reading capture times with
/// the metadata-first policy.
pub fn group(photos: &[PhotoRef], threshold_secs: f64) -> Vec<BurstGroup> {
    BurstDetector::new(BurstConfig {
        threshold_secs,
        ..BurstConfig::default()
    })
    .group(photos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Resolver backed by a fixed table; unknown photos are unresolvable.
    struct TableResolver(HashMap<PhotoRef, f64>);

    impl TableResolver {
        fn new(entries: &[(&str, f64)]) -> Self {
            Self(entries.iter().map(|(p, t)| (PhotoRef::from(*p), *t)).collect())
        }
    }

    impl TimestampResolver for TableResolver {
        fn resolve(&self, photo: &PhotoRef) -> Result<CaptureTime> {
            self.0
                .get(photo)
                .map(|&seconds| CaptureTime {
                    seconds,
                    source: TimeSource::Modified,
                })
                .ok_or_else(|| Error::TimestampUnresolvable {
                    path: photo.path().to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
        }
    }

    fn create_test_frames(entries: &[(&str, f64)]) -> Vec<TimedPhoto> {
        entries.iter().map(|(p, t)| TimedPhoto::new(*p, *t)).collect()
    }

    fn names(group: &BurstGroup) -> Vec<String> {
        group.frames.iter().map(|f| f.photo.to_string()).collect()
    }

    fn refs(names: &[&str]) -> Vec<PhotoRef> {
        names.iter().map(|n| PhotoRef::from(*n)).collect()
    }

    fn detector(threshold_secs: f64) -> BurstDetector {
        BurstDetector::new(BurstConfig {
            threshold_secs,
            ..BurstConfig::default()
        })
    }

    #[test]
    fn test_empty_input() {
        assert!(group_timed(Vec::new(), 0.5).is_empty());
        assert!(group(&[], 3.0).is_empty());
    }

    #[test]
    fn test_single_photo_single_group() {
        let groups = group_timed(create_test_frames(&[("a.jpg", 10.0)]), 0.5);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[0].id, "group_0");
        assert_eq!(groups[0].duration_secs, 0.0);
        assert_eq!(groups[0].estimated_fps, 0.0);
    }

    #[test]
    fn test_gaps_within_threshold_form_one_group() {
        let frames = create_test_frames(&[("a.jpg", 0.0), ("b.jpg", 0.4), ("c.jpg", 0.9)]);
        let groups = group_timed(frames, 0.5);
        assert_eq!(groups.len(), 1);
        assert_eq!(names(&groups[0]), ["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn test_gap_over_threshold_splits() {
        let frames = create_test_frames(&[("a.jpg", 0.0), ("b.jpg", 0.4), ("c.jpg", 1.0)]);
        let groups = group_timed(frames, 0.5);
        assert_eq!(groups.len(), 2);
        assert_eq!(names(&groups[0]), ["a.jpg", "b.jpg"]);
        assert_eq!(names(&groups[1]), ["c.jpg"]);
        assert_eq!(groups[1].id, "group_1");
    }

    #[test]
    fn test_gap_equal_to_threshold_stays() {
        let frames = create_test_frames(&[("a.jpg", 0.0), ("b.jpg", 2.0)]);
        assert_eq!(group_timed(frames, 2.0).len(), 1);
    }

    #[test]
    fn test_zero_threshold_groups_equal_timestamps_only() {
        let frames = create_test_frames(&[("a.jpg", 5.0), ("b.jpg", 5.0), ("c.jpg", 5.001)]);
        let groups = group_timed(frames, 0.0);
        assert_eq!(groups.len(), 2);
        assert_eq!(names(&groups[0]), ["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_unsorted_input_and_stable_ties() {
        let frames = create_test_frames(&[
            ("late.jpg", 100.0),
            ("tie_first.jpg", 1.0),
            ("early.jpg", 0.5),
            ("tie_second.jpg", 1.0),
        ]);
        let groups = group_timed(frames, 0.5);
        assert_eq!(groups.len(), 2);
        assert_eq!(names(&groups[0]), ["early.jpg", "tie_first.jpg", "tie_second.jpg"]);
        assert_eq!(names(&groups[1]), ["late.jpg"]);
    }

    #[test]
    fn test_burst_stats_calculation() {
        let frames = create_test_frames(&[
            ("img001.jpg", 1000.0),
            ("img002.jpg", 1000.25),
            ("img003.jpg", 1000.5),
            ("img004.jpg", 1001.0),
        ]);
        let groups = group_timed(frames, 0.5);
        let burst = &groups[0];

        assert_eq!(burst.len(), 4);
        assert_eq!(burst.duration_secs, 1.0);
        assert_eq!(burst.avg_gap_secs, (0.25 + 0.25 + 0.5) / 3.0);
        assert_eq!(burst.estimated_fps, 4.0);
        assert_eq!(burst.first_timestamp(), Some(1000.0));
        assert_eq!(burst.last_timestamp(), Some(1001.0));
    }

    #[test]
    fn test_detect_with_skips_unresolvable() {
        let resolver = TableResolver::new(&[("a.jpg", 0.0), ("c.jpg", 0.3)]);
        let photos = refs(&["a.jpg", "b.jpg", "c.jpg"]);

        let result = detector(0.5)
            .detect_with(&resolver, &photos, &CancelToken::new())
            .unwrap();

        assert_eq!(result.total_groups(), 1);
        assert_eq!(result.total_photos(), 2);
        assert_eq!(result.skipped, refs(&["b.jpg"]));
        assert_eq!(result.groups[0].frames[0].source, Some(TimeSource::Modified));
    }

    #[test]
    fn test_all_unresolvable_yields_no_groups() {
        let resolver = TableResolver::new(&[]);
        let photos = refs(&["a.jpg", "b.jpg"]);

        let result = detector(0.5)
            .detect_with(&resolver, &photos, &CancelToken::new())
            .unwrap();

        assert!(result.groups.is_empty());
        assert_eq!(result.skipped.len(), 2);
    }

    #[test]
    fn test_duplicate_refs_collapse() {
        let resolver = TableResolver::new(&[("a.jpg", 0.0), ("b.jpg", 0.1)]);
        let photos = refs(&["a.jpg", "b.jpg", "a.jpg"]);

        let result = detector(0.5)
            .detect_with(&resolver, &photos, &CancelToken::new())
            .unwrap();

        assert_eq!(result.total_photos(), 2);
        assert_eq!(names(&result.groups[0]), ["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_cancelled_detection() {
        let resolver = TableResolver::new(&[("a.jpg", 0.0)]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = detector(0.5).detect_with(&resolver, &refs(&["a.jpg"]), &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_missing_files_are_dropped_by_group() {
        let photos = refs(&["/non/existent/a.jpg", "/non/existent/b.jpg"]);
        assert!(group(&photos, 0.5).is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(BurstConfig::default().validate().is_ok());
        assert_eq!(BurstConfig::default().threshold_secs, 0.5);
        for bad in [-0.1, f64::NAN, f64::INFINITY] {
            let config = BurstConfig {
                threshold_secs: bad,
                ..BurstConfig::default()
            };
            assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
        }
    }
}
