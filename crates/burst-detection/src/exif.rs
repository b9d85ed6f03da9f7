//! Capture-time resolution for burstpick
//!
//! Reads `DateTimeOriginal` out of the EXIF block with rexif and falls back to
//! the file's modification time, depending on the configured policy.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Local, NaiveDateTime, TimeZone, Timelike};
use rexif::{ExifTag, TagValue};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::photo::PhotoRef;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Bytes read from the head of a JPEG when looking for its EXIF block.
///
/// APP1 segments are capped at 64 KiB; the rest leaves room for APP0 and
/// other segments written ahead of it.
const JPEG_METADATA_PREFIX: u64 = 128 * 1024;

/// Raw IFD tag number of `SubSecTimeOriginal`.
const SUBSEC_TIME_ORIGINAL: u16 = 0x9291;

/// Where a photo's timestamp comes from.
///
/// The two policies group differently whenever a file was copied or edited
/// after capture, since that moves its modification time but not its EXIF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampPolicy {
    /// `DateTimeOriginal` first, modification time when that is unavailable.
    #[default]
    MetadataFirst,
    /// Modification time only.
    FilesystemOnly,
}

impl fmt::Display for TimestampPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampPolicy::MetadataFirst => write!(f, "metadata-first"),
            TimestampPolicy::FilesystemOnly => write!(f, "filesystem-only"),
        }
    }
}

impl FromStr for TimestampPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "metadata-first" | "metadata" | "exif" => Ok(TimestampPolicy::MetadataFirst),
            "filesystem-only" | "filesystem" | "mtime" => Ok(TimestampPolicy::FilesystemOnly),
            _ => Err(Error::InvalidArgument(format!(
                "unknown timestamp policy: {}. Valid options: metadata-first, filesystem-only",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeSource {
    Exif,
    Modified,
}

/// A resolved timestamp in fractional Unix-like seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureTime {
    pub seconds: f64,
    pub source: TimeSource,
}

/// Turns a photo into a timestamp.
///
/// Implementations are called from rayon workers, hence `Sync`.
pub trait TimestampResolver: Sync {
    fn resolve(&self, photo: &PhotoRef) -> Result<CaptureTime>;
}

/// Resolves timestamps from files on disk.
#[derive(Debug, Clone, Default)]
pub struct FileTimestampResolver {
    pub policy: TimestampPolicy,
    /// Refine `DateTimeOriginal` with `SubSecTimeOriginal` when present.
    pub subsec_precision: bool,
}

impl FileTimestampResolver {
    pub fn new(policy: TimestampPolicy) -> Self {
        Self {
            policy,
            subsec_precision: false,
        }
    }

    pub fn with_subsec_precision(mut self, enabled: bool) -> Self {
        self.subsec_precision = enabled;
        self
    }

    fn exif_seconds(&self, path: &Path) -> Result<f64> {
        let bytes = read_metadata_prefix(path).map_err(|e| Error::Exif {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let naive = capture_time_from_exif(path, &bytes, self.subsec_precision)?;
        Ok(naive_to_epoch_seconds(naive))
    }
}

impl TimestampResolver for FileTimestampResolver {
    fn resolve(&self, photo: &PhotoRef) -> Result<CaptureTime> {
        let path = photo.path();

        if self.policy == TimestampPolicy::MetadataFirst {
            match self.exif_seconds(path) {
                Ok(seconds) => {
                    return Ok(CaptureTime {
                        seconds,
                        source: TimeSource::Exif,
                    })
                }
                Err(err) => {
                    tracing::trace!(path = %path.display(), error = %err, "falling back to modification time");
                }
            }
        }

        Ok(CaptureTime {
            seconds: modified_seconds(path)?,
            source: TimeSource::Modified,
        })
    }
}

/// Read enough of `path` to find its EXIF block.
///
/// JPEGs carry EXIF near the start, so only a bounded prefix is read. TIFF
/// containers can place IFDs anywhere and are read whole.
fn read_metadata_prefix(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.by_ref().take(JPEG_METADATA_PREFIX).read_to_end(&mut bytes)?;
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        file.read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

/// Extract the original capture time from an in-memory JPEG or TIFF container.
///
/// `path` is only used for error reporting.
pub fn capture_time_from_exif(path: &Path, bytes: &[u8], with_subsec: bool) -> Result<NaiveDateTime> {
    let exif = rexif::parse_buffer(bytes).map_err(|e| Error::Exif {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut original = None;
    let mut subsec = None;
    for entry in &exif.entries {
        if entry.tag == ExifTag::DateTimeOriginal {
            if original.is_none() {
                original = ascii_value(&entry.value);
            }
        } else if entry.ifd.tag == SUBSEC_TIME_ORIGINAL && subsec.is_none() {
            subsec = ascii_value(&entry.value);
        }
    }

    let original = original.ok_or_else(|| Error::MissingCaptureTime {
        path: path.to_path_buf(),
    })?;
    let subsec = if with_subsec { subsec.as_deref() } else { None };

    parse_capture_time(&original, subsec).ok_or_else(|| Error::MalformedCaptureTime {
        path: path.to_path_buf(),
        value: original.clone(),
    })
}

fn ascii_value(value: &TagValue) -> Option<String> {
    match value {
        TagValue::Ascii(s) => {
            let trimmed = trim_exif_text(s);
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

fn trim_exif_text(s: &str) -> &str {
    s.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` string, optionally refined by a
/// `SubSecTime*` digit string (".5", ".50" and ".500" are all half a second).
pub fn parse_capture_time(date_time_original: &str, subsec: Option<&str>) -> Option<NaiveDateTime> {
    let naive =
        NaiveDateTime::parse_from_str(trim_exif_text(date_time_original), EXIF_DATETIME_FORMAT).ok()?;

    let digits = match subsec.map(trim_exif_text) {
        Some(d) if !d.is_empty() && d.len() <= 9 && d.bytes().all(|b| b.is_ascii_digit()) => d,
        _ => return Some(naive),
    };

    let value: u32 = digits.parse().ok()?;
    let nanos = value * 10u32.pow(9 - digits.len() as u32);
    Some(naive.with_nanosecond(nanos).unwrap_or(naive))
}

/// Convert a naive EXIF time to fractional epoch seconds.
///
/// The wall-clock value is read in the local time zone, the same frame the
/// filesystem fallback lives in. Wall times skipped by a DST jump are read as
/// UTC instead.
pub fn naive_to_epoch_seconds(naive: NaiveDateTime) -> f64 {
    let whole = match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.timestamp(),
        None => naive.and_utc().timestamp(),
    };
    whole as f64 + f64::from(naive.nanosecond()) / 1e9
}

/// Last-modified time of `path` in fractional Unix seconds.
pub fn modified_seconds(path: &Path) -> Result<f64> {
    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|source| Error::TimestampUnresolvable {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(system_time_to_seconds(modified))
}

fn system_time_to_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    }
}
