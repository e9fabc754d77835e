//! rollcall-core — Gallery loading and face matching.
//!
//! Turns video frames into labelled face locations against a gallery of
//! enrolled people. Detection and embedding run behind the [`FaceEncoder`]
//! trait; the bundled implementation uses SCRFD and ArcFace on ONNX Runtime.

pub mod alignment;
pub mod config;
pub mod detector;
pub mod encoder;
pub mod gallery;
pub mod matcher;
pub mod pipeline;
pub mod recognizer;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{Config, ConfigError};
pub use encoder::{EncodeError, FaceEncoder, OnnxFaceEncoder};
pub use gallery::{Gallery, GalleryEntry};
pub use matcher::{EuclideanMatcher, MatchOutcome, Matcher};
pub use pipeline::{FrameMatcher, MatchError};
pub use types::{ChannelOrder, Detection, Embedding, FaceLocation, FaceMatch, Identity, UNKNOWN_LABEL};
