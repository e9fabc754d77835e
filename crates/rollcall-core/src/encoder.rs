//! The face-encoding capability the pipeline depends on.
//!
//! Detection and embedding extraction sit behind [`FaceEncoder`] so the
//! gallery loader and frame matcher never depend on a particular model.
//! [`OnnxFaceEncoder`] is the production implementation (SCRFD + ArcFace).

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Detection, Embedding};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("encoder backend: {0}")]
    Backend(String),
}

/// Produces face locations and per-face embeddings for an RGB image.
pub trait FaceEncoder {
    /// Locate faces, most confident first.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EncodeError>;

    /// Compute the embedding for one detection on the same image.
    ///
    /// `Ok(None)` means the detection cannot be encoded (e.g. no landmarks).
    fn encode(
        &mut self,
        image: &RgbImage,
        detection: &Detection,
    ) -> Result<Option<Embedding>, EncodeError>;
}

impl<E: FaceEncoder + ?Sized> FaceEncoder for Box<E> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EncodeError> {
        (**self).detect(image)
    }

    fn encode(
        &mut self,
        image: &RgbImage,
        detection: &Detection,
    ) -> Result<Option<Embedding>, EncodeError> {
        (**self).encode(image, detection)
    }
}

/// SCRFD detector plus ArcFace recognizer, both on ONNX Runtime.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load `det_10g.onnx` and `w600k_r50.onnx` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, EncodeError> {
        let scrfd_path = model_dir.join(SCRFD_MODEL_FILE);
        let arcface_path = model_dir.join(ARCFACE_MODEL_FILE);

        let detector = FaceDetector::load(&scrfd_path)?;
        let recognizer = FaceRecognizer::load(&arcface_path)?;

        Ok(Self { detector, recognizer })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EncodeError> {
        Ok(self.detector.detect(image)?)
    }

    fn encode(
        &mut self,
        image: &RgbImage,
        detection: &Detection,
    ) -> Result<Option<Embedding>, EncodeError> {
        match self.recognizer.extract(image, detection) {
            Ok(embedding) => Ok(Some(embedding)),
            Err(RecognizerError::NoLandmarks) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
