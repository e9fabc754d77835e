//! Frame matcher: from a raw video frame to labelled face locations.

use crate::encoder::{EncodeError, FaceEncoder};
use crate::gallery::Gallery;
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::types::{ChannelOrder, FaceMatch, Identity};
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("resize factor must be in (0, 1], got {0}")]
    InvalidResizeFactor(f64),
    #[error("match tolerance must be a finite non-negative number, got {0}")]
    InvalidTolerance(f32),
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Encoder(#[from] EncodeError),
}

/// Labels the faces in video frames against a gallery.
pub struct FrameMatcher<E> {
    encoder: E,
    matcher: EuclideanMatcher,
    resize_factor: f64,
}

impl<E: FaceEncoder> FrameMatcher<E> {
    pub fn new(encoder: E, tolerance: f32, resize_factor: f64) -> Result<Self, MatchError> {
        if !(resize_factor > 0.0 && resize_factor <= 1.0) {
            return Err(MatchError::InvalidResizeFactor(resize_factor));
        }
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(MatchError::InvalidTolerance(tolerance));
        }
        Ok(Self {
            encoder,
            matcher: EuclideanMatcher::new(tolerance),
            resize_factor,
        })
    }

    pub fn encoder_mut(&mut self) -> &mut E {
        &mut self.encoder
    }

    /// Detect, encode and label every face in a packed 3-channel frame.
    ///
    /// Locations are returned in original-frame coordinates. Several faces
    /// may resolve to the same name; no deduplication happens here.
    pub fn match_frame(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        order: ChannelOrder,
        gallery: &Gallery,
    ) -> Result<Vec<FaceMatch>, MatchError> {
        let image = to_rgb_image(pixels, width, height, order)?;
        let small = downscale(&image, self.resize_factor);

        let detections = self.encoder.detect(&small)?;
        tracing::debug!(faces = detections.len(), "faces detected");

        let mut matches = Vec::with_capacity(detections.len());
        for detection in &detections {
            let (identity, distance) = match self.encoder.encode(&small, detection)? {
                Some(embedding) => {
                    let outcome = self.matcher.compare(&embedding, gallery.entries());
                    let distance = outcome.best_index.map(|_| outcome.distance);
                    (outcome.identity(gallery.entries()), distance)
                }
                None => (Identity::Unknown, None),
            };

            matches.push(FaceMatch {
                location: detection.location.scale_back(self.resize_factor),
                identity,
                distance,
            });
        }

        Ok(matches)
    }
}

/// Copy a packed frame into an RGB image, swapping channels for BGR input.
fn to_rgb_image(
    pixels: &[u8],
    width: u32,
    height: u32,
    order: ChannelOrder,
) -> Result<RgbImage, MatchError> {
    let expected = width as usize * height as usize * 3;
    let invalid = || MatchError::InvalidFrame {
        width,
        height,
        expected,
        actual: pixels.len(),
    };
    if width == 0 || height == 0 || pixels.len() != expected {
        return Err(invalid());
    }

    let data = match order {
        ChannelOrder::Rgb => pixels.to_vec(),
        ChannelOrder::Bgr => pixels
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
    };
    RgbImage::from_raw(width, height, data).ok_or_else(invalid)
}

/// Bilinear downscale by `factor`; each side keeps at least one pixel.
fn downscale(image: &RgbImage, factor: f64) -> RgbImage {
    if factor >= 1.0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let new_w = ((w as f64 * factor).round() as u32).max(1);
    let new_h = ((h as f64 * factor).round() as u32).max(1);
    imageops::resize(image, new_w, new_h, FilterType::Triangle)
}
