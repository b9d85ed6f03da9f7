//! Error types for burst detection and frame scoring

use std::path::PathBuf;
use thiserror::Error;

/// Library error type.
///
/// Most variants describe a failure for a single photo. The grouper and the
/// selector absorb those per item (dropping the photo or scoring it `0.0`), so
/// callers of the top-level operations only ever see `InvalidArgument`,
/// `Cancelled` and `BadDirectory`.
#[derive(Debug, Error)]
pub enum Error {
    /// The file could not be parsed as an EXIF container.
    #[error("failed to read EXIF from {path}: {message}")]
    Exif { path: PathBuf, message: String },

    /// The EXIF block carries no `DateTimeOriginal` tag.
    #[error("no DateTimeOriginal tag in {path}")]
    MissingCaptureTime { path: PathBuf },

    /// `DateTimeOriginal` did not match `YYYY:MM:DD HH:MM:SS`.
    #[error("malformed capture time {value:?} in {path}")]
    MalformedCaptureTime { path: PathBuf, value: String },

    /// Neither metadata nor the filesystem produced a timestamp.
    #[error("no timestamp could be resolved for {path}: {source}")]
    TimestampUnresolvable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image could not be opened or decoded.
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The image decoded to a frame with no pixels.
    #[error("{path} decoded to an empty {width}x{height} frame")]
    EmptyFrame {
        path: PathBuf,
        width: u32,
        height: u32,
    },

    /// A caller bug, such as asking for the sharpest frame of an empty group.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The configured folder is missing or not a directory.
    #[error("not a directory: {0}")]
    BadDirectory(PathBuf),

    /// A long-running pass was cancelled through its `CancelToken`.
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
