//! Fake encoders for unit tests.

use crate::encoder::{EncodeError, FaceEncoder};
use crate::types::{Detection, Embedding, FaceLocation};
use image::RgbImage;

/// One face covering the whole image whenever its top-left pixel has a
/// non-zero red channel; the embedding is that pixel's color.
pub struct ColorEncoder;

impl FaceEncoder for ColorEncoder {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EncodeError> {
        if image.get_pixel(0, 0)[0] == 0 {
            return Ok(Vec::new());
        }
        let (w, h) = image.dimensions();
        Ok(vec![Detection {
            location: FaceLocation::new(0, w as i32, h as i32, 0),
            confidence: 1.0,
            landmarks: None,
        }])
    }

    fn encode(
        &mut self,
        image: &RgbImage,
        detection: &Detection,
    ) -> Result<Option<Embedding>, EncodeError> {
        let loc = detection.location;
        let px = image.get_pixel(loc.left as u32, loc.top as u32);
        Ok(Some(Embedding::new(px.0.iter().map(|&c| c as f32).collect())))
    }
}

/// Returns the same scripted detections for every image.
#[derive(Default)]
pub struct ScriptedEncoder {
    script: Vec<(Detection, Option<Embedding>)>,
    /// Dimensions of every image passed to `detect`.
    pub seen_sizes: Vec<(u32, u32)>,
}

impl ScriptedEncoder {
    pub fn new(script: Vec<(Detection, Option<Embedding>)>) -> Self {
        Self { script, seen_sizes: Vec::new() }
    }
}

impl FaceEncoder for ScriptedEncoder {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EncodeError> {
        self.seen_sizes.push(image.dimensions());
        Ok(self.script.iter().map(|(d, _)| d.clone()).collect())
    }

    fn encode(
        &mut self,
        _image: &RgbImage,
        detection: &Detection,
    ) -> Result<Option<Embedding>, EncodeError> {
        Ok(self
            .script
            .iter()
            .find(|(d, _)| d.location == detection.location)
            .and_then(|(_, e)| e.clone()))
    }
}
