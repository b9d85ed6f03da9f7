//! Burst grouping and sharpest-frame selection for burstpick
//!
//! Photos are grouped into bursts by capture time ([`group`]) and the least
//! blurry frame of each burst is picked by variance of Laplacian
//! ([`pick_sharpest`]). [`Triage`] runs both over a folder in one pass.

pub mod burst;
pub mod cancel;
pub mod error;
pub mod exif;
pub mod photo;
pub mod quality;
pub mod scan;
pub mod triage;

pub use burst::{group, group_timed, BurstConfig, BurstDetector, BurstGroup, BurstResult, TimedPhoto};
pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use exif::{CaptureTime, FileTimestampResolver, TimeSource, TimestampPolicy, TimestampResolver};
pub use photo::PhotoRef;
pub use quality::{
    laplacian_variance, pick_sharpest, select_max, FrameDecoder, ImageFileDecoder, ScoredPhoto, SharpnessSelector,
};
pub use scan::{scan_folder, ScanOptions};
pub use triage::{Triage, TriageReport, TriagedGroup};
