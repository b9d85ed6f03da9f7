//! Full triage pass: group a folder's photos, then pick the sharpest of each group

use serde::{Deserialize, Serialize};

use crate::burst::{BurstConfig, BurstDetector, BurstGroup};
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::exif::{FileTimestampResolver, TimestampResolver};
use crate::photo::PhotoRef;
use crate::quality::{select_max, FrameDecoder, ImageFileDecoder, ScoredPhoto, SharpnessSelector};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriagedGroup {
    pub group: BurstGroup,
    /// One score per frame, in frame order
    pub scores: Vec<ScoredPhoto>,
    pub pick: PhotoRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageReport {
    pub groups: Vec<TriagedGroup>,
    pub skipped: Vec<PhotoRef>,
}

impl TriageReport {
    /// Photos that made it into a group
    pub fn total_photos(&self) -> usize {
        self.groups.iter().map(|g| g.group.len()).sum()
    }

    pub fn picks(&self) -> Vec<&PhotoRef> {
        self.groups.iter().map(|g| &g.pick).collect()
    }
}

pub struct Triage<R = FileTimestampResolver, D = ImageFileDecoder> {
    detector: BurstDetector,
    resolver: R,
    selector: SharpnessSelector<D>,
}

impl Triage {
    /// Triage files on disk with the given grouping settings.
    pub fn new(config: BurstConfig) -> Self {
        let resolver = config.resolver();
        Self {
            detector: BurstDetector::new(config),
            resolver,
            selector: SharpnessSelector::new(),
        }
    }
}

impl<R: TimestampResolver, D: FrameDecoder> Triage<R, D> {
    pub fn with_parts(config: BurstConfig, resolver: R, decoder: D) -> Self {
        Self {
            detector: BurstDetector::new(config),
            resolver,
            selector: SharpnessSelector::with_decoder(decoder),
        }
    }

    /// Group `photos` and score every group.
    ///
    /// Per-photo failures never surface here: unresolvable photos land in
    /// `skipped` and undecodable frames score `0.0`. The only error is
    /// [`Error::Cancelled`](crate::Error::Cancelled).
    pub fn run(&self, photos: &[PhotoRef], cancel: &CancelToken) -> Result<TriageReport> {
        let bursts = self.detector.detect_with(&self.resolver, photos, cancel)?;

        let mut groups = Vec::with_capacity(bursts.groups.len());
        for group in bursts.groups {
            cancel.check()?;

            let scores = self.selector.rank_cancellable(&group.photos(), cancel)?;
            let values: Vec<f64> = scores.iter().map(|s| s.score).collect();
            let Some(best) = select_max(&values) else {
                continue;
            };
            let pick = scores[best].photo.clone();

            tracing::debug!(group = %group.id, frames = group.len(), pick = %pick, "picked sharpest frame");
            groups.push(TriagedGroup { group, scores, pick });
        }

        tracing::info!(
            groups = groups.len(),
            skipped = bursts.skipped.len(),
            "triage finished"
        );

        Ok(TriageReport {
            groups,
            skipped: bursts.skipped,
        })
    }
}
