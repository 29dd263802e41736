mod framing;
mod webcam;
mod worker;

pub use framing::fit_to;
pub use webcam::{list_devices, open_first_available, open_webcam};

use crate::frame::Frame;
use std::time::Duration;
use thiserror::Error;

/// Startup-time failure to obtain a camera. Fatal.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error(
        "could not open camera {index}: {reason}. Check that the camera is connected \
         and that this application has been granted camera permission"
    )]
    Open { index: u32, reason: String },
    #[error("no working camera found (tried indices {tried:?}). Connect a camera or grant camera permission")]
    NoWorkingCamera { tried: Vec<u32> },
    #[error("could not enumerate cameras: {0}")]
    Query(String),
    #[error("capture worker exited while opening the camera")]
    WorkerExited,
    #[error("failed to start capture worker: {0}")]
    Worker(#[source] std::io::Error),
}

/// Per-tick capture failure. The tick is skipped.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera did not deliver a frame within {0:?}")]
    Timeout(Duration),
    #[error("camera error: {0}")]
    Device(String),
    #[error("capture source is closed")]
    Closed,
}

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single mirrored frame, failing instead of blocking past the
    /// source's timeout
    fn acquire(&mut self) -> Result<Frame, CaptureError>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);

    /// Release the device. Idempotent.
    fn close(&mut self);
}
