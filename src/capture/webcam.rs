use super::worker::{FrameGrabber, ThreadedCapture};
use super::{CaptureError, CaptureSource, DeviceError};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::time::Duration;

/// Device indices probed when none is given on the command line.
const PROBE_INDICES: [u32; 3] = [0, 1, 2];

/// Webcam opened through nokhwa. Lives on the capture worker thread.
pub struct NokhwaGrabber {
    camera: Camera,
}

impl NokhwaGrabber {
    pub fn open(device_index: u32) -> Result<Self, DeviceError> {
        tracing::info!("Initializing webcam {}", device_index);

        let open_error = |e: nokhwa::NokhwaError| DeviceError::Open {
            index: device_index,
            reason: e.to_string(),
        };

        let index = CameraIndex::Index(device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera = Camera::new(index, requested).map_err(open_error)?;
        camera.open_stream().map_err(open_error)?;

        tracing::info!(
            "Opened camera {} ({})",
            camera.info().human_name(),
            camera.camera_format()
        );

        Ok(Self { camera })
    }
}

impl FrameGrabber for NokhwaGrabber {
    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        let frame = self
            .camera
            .frame()
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        frame
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::Device(e.to_string()))
    }

    fn resolution(&self) -> (u32, u32) {
        let resolution = self.camera.resolution();
        (resolution.width(), resolution.height())
    }
}

impl Drop for NokhwaGrabber {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

/// Open a specific camera on its own capture thread.
pub fn open_webcam(device_index: u32, timeout: Duration) -> Result<ThreadedCapture, DeviceError> {
    ThreadedCapture::spawn(
        &format!("camera-{device_index}"),
        move || NokhwaGrabber::open(device_index),
        timeout,
    )
}

/// Probe the first few device indices and return the first camera that opens
/// and delivers a frame.
pub fn open_first_available(timeout: Duration) -> Result<ThreadedCapture, DeviceError> {
    // the first frame of a fresh stream can take far longer than a frame period
    let probe_timeout = timeout.max(Duration::from_secs(2));

    for index in PROBE_INDICES {
        let mut capture = match open_webcam(index, probe_timeout) {
            Ok(capture) => capture,
            Err(e) => {
                tracing::debug!("Camera {} unavailable: {}", index, e);
                continue;
            }
        };

        match capture.acquire() {
            Ok(_) => {
                tracing::info!("Success: camera found at index {}", index);
                capture.set_timeout(timeout);
                return Ok(capture);
            }
            Err(e) => {
                tracing::debug!("Camera {} opened but did not deliver a frame: {}", index, e);
                capture.close();
            }
        }
    }

    Err(DeviceError::NoWorkingCamera {
        tried: PROBE_INDICES.to_vec(),
    })
}

/// Cameras the platform backend reports, as (index, name).
pub fn list_devices() -> Result<Vec<(u32, String)>, DeviceError> {
    let cameras =
        nokhwa::query(ApiBackend::Auto).map_err(|e| DeviceError::Query(e.to_string()))?;

    Ok(cameras
        .into_iter()
        .filter_map(|info| match info.index() {
            CameraIndex::Index(index) => Some((*index, info.human_name())),
            CameraIndex::String(_) => None,
        })
        .collect())
}
