//! rollcall-hw — V4L2 color camera capture.
//!
//! Frames come out packed 3 bytes per pixel in RGB or BGR order, ready for
//! the frame matcher.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameSource, PixelFormat};
pub use frame::{Frame, FrameError};
