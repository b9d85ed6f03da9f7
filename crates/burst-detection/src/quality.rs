//! Frame sharpness scoring for burstpick
//!
//! Sharpness is the variance of the Laplacian of the grayscale frame: in-focus
//! frames carry more high-frequency edge content and so score higher.

use std::path::Path;

use image::{GrayImage, ImageError, ImageReader};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::photo::PhotoRef;

/// Turns a photo into a single-channel raster.
pub trait FrameDecoder: Sync {
    fn decode_luma(&self, photo: &PhotoRef) -> Result<GrayImage>;
}

/// Decodes files with the `image` crate, sniffing the format from content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileDecoder;

impl ImageFileDecoder {
    fn open(path: &Path) -> std::result::Result<GrayImage, ImageError> {
        let image = ImageReader::open(path)
            .map_err(ImageError::IoError)?
            .with_guessed_format()
            .map_err(ImageError::IoError)?
            .decode()?;
        Ok(image.to_luma8())
    }
}

impl FrameDecoder for ImageFileDecoder {
    fn decode_luma(&self, photo: &PhotoRef) -> Result<GrayImage> {
        Self::open(photo.path()).map_err(|source| Error::Decode {
            path: photo.path().to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPhoto {
    pub photo: PhotoRef,
    /// Variance of Laplacian, `0.0` when the frame could not be scored
    pub score: f64,
    /// Why scoring failed, if it did
    pub failure: Option<String>,
}

/// Reflect-101 border index: `-1 -> 1`, `n -> n - 2`.
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let reflected = if index < 0 {
        -index
    } else if index > last {
        2 * last - index
    } else {
        index
    };
    reflected as usize
}

/// Variance of the 4-neighbour Laplacian `[0 1 0; 1 -4 1; 0 1 0]`.
///
/// Every pixel is filtered, borders mirrored without repeating the edge
/// pixel, and the population variance of the responses is returned. Empty
/// images score `0.0`.
pub fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return 0.0;
    }

    let pixels = image.as_raw();
    let at = |x: usize, y: usize| i64::from(pixels[y * w + x]);

    // Responses are integers bounded by 1020, so integer sums stay exact.
    let mut sum: i64 = 0;
    let mut sum_sq: i64 = 0;
    for y in 0..h {
        let up = reflect_101(y as isize - 1, h);
        let down = reflect_101(y as isize + 1, h);
        for x in 0..w {
            let left = reflect_101(x as isize - 1, w);
            let right = reflect_101(x as isize + 1, w);
            let response = at(x, up) + at(x, down) + at(left, y) + at(right, y) - 4 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let n = (w * h) as f64;
    let mean = sum as f64 / n;
    (sum_sq as f64 / n - mean * mean).max(0.0)
}

/// Index of the highest score; the first one wins ties.
pub fn select_max(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

/// Picks the sharpest frame of a group.
#[derive(Debug, Clone, Default)]
pub struct SharpnessSelector<D = ImageFileDecoder> {
    decoder: D,
}

impl SharpnessSelector<ImageFileDecoder> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: FrameDecoder> SharpnessSelector<D> {
    pub fn with_decoder(decoder: D) -> Self {
        Self { decoder }
    }

    /// Decode and score a single frame.
    pub fn try_score(&self, photo: &PhotoRef) -> Result<f64> {
        let frame = self.decoder.decode_luma(photo)?;
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::EmptyFrame {
                path: photo.path().to_path_buf(),
                width,
                height,
            });
        }
        Ok(laplacian_variance(&frame))
    }

    /// Score a frame, treating any failure as `0.0`.
    pub fn score(&self, photo: &PhotoRef) -> f64 {
        self.scored(photo).score
    }

    fn scored(&self, photo: &PhotoRef) -> ScoredPhoto {
        match self.try_score(photo) {
            Ok(score) => ScoredPhoto {
                photo: photo.clone(),
                score,
                failure: None,
            },
            Err(err) => {
                tracing::debug!(photo = %photo, error = %err, "scoring failed, using 0.0");
                ScoredPhoto {
                    photo: photo.clone(),
                    score: 0.0,
                    failure: Some(err.to_string()),
                }
            }
        }
    }

    /// Score every frame in parallel; output follows input order.
    pub fn rank(&self, photos: &[PhotoRef]) -> Vec<ScoredPhoto> {
        photos.par_iter().map(|photo| self.scored(photo)).collect()
    }

    /// Like [`rank`](Self::rank), but stops starting new frames once `cancel` fires.
    pub fn rank_cancellable(&self, photos: &[PhotoRef], cancel: &CancelToken) -> Result<Vec<ScoredPhoto>> {
        photos
            .par_iter()
            .map(|photo| {
                cancel.check()?;
                Ok(self.scored(photo))
            })
            .collect()
    }

    /// Sharpest member of `photos`, first one on ties.
    ///
    /// Unreadable frames score `0.0`, so a non-empty group always yields a
    /// pick. An empty group is a caller error.
    pub fn pick_sharpest(&self, photos: &[PhotoRef]) -> Result<PhotoRef> {
        if photos.is_empty() {
            return Err(Error::InvalidArgument(
                "cannot pick the sharpest frame of an empty group".to_string(),
            ));
        }

        let ranked = self.rank(photos);
        let scores: Vec<f64> = ranked.iter().map(|s| s.score).collect();
        let index = select_max(&scores).unwrap_or(0);
        Ok(photos[index].clone())
    }
}

/// Sharpest member of a group using the default file decoder.
pub fn pick_sharpest(group: &[PhotoRef]) -> Result<PhotoRef> {
    SharpnessSelector::new().pick_sharpest(group)
}
