//! Video sources feeding the renderer.

use std::path::Path;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use super::zoom::{ConstraintError, ZoomCapabilities};

/// One RGBA8 frame, rows top-down.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_image(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self::new(width, height, img.into_raw())
    }

    /// True if `data` holds exactly `width * height` RGBA pixels.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * 4
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    Environment,
    User,
}

/// Camera request. Sizes are "ideal" values: the closest supported mode wins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    /// Native camera index; facing mode is advisory for native devices.
    pub device_index: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            ideal_width: 9999,
            ideal_height: 9999,
            device_index: 0,
        }
    }
}

impl CameraConstraints {
    /// The request in media-constraints form, as logged at camera start.
    pub fn to_media_constraints(&self) -> serde_json::Value {
        json!({
            "video": {
                "facingMode": { "ideal": self.facing_mode },
                "width": { "ideal": self.ideal_width },
                "height": { "ideal": self.ideal_height },
            },
            "audio": false,
        })
    }
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera is busy: {0}")]
    Busy(String),
    #[error("no camera found: {0}")]
    NotFound(String),
    #[error("camera support is not available: {0}")]
    Unsupported(String),
    #[error("camera stream failed: {0}")]
    Stream(String),
    #[error("failed to load image: {0}")]
    Image(#[from] image::ImageError),
}

impl CameraError {
    /// Sorts a backend error message into the permission/busy/not-found buckets.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
            CameraError::PermissionDenied(message)
        } else if lower.contains("busy") || lower.contains("in use") {
            CameraError::Busy(message)
        } else if lower.contains("not found") || lower.contains("no device") {
            CameraError::NotFound(message)
        } else {
            CameraError::Stream(message)
        }
    }
}

/// A stream of frames with optional hardware zoom.
///
/// Zoom is asynchronous: [`submit_zoom`](Self::submit_zoom) starts an apply and
/// [`poll_zoom_result`](Self::poll_zoom_result) reports its outcome later.
pub trait VideoSource: Send {
    /// Newest frame since the last call, if any.
    fn poll_frame(&mut self) -> Option<VideoFrame>;

    /// Zoom range and current value, or `None` if the device has no zoom.
    fn zoom_capabilities(&self) -> Option<(ZoomCapabilities, f32)> {
        None
    }

    fn submit_zoom(&mut self, _value: f32) {}

    fn poll_zoom_result(&mut self) -> Option<(f32, Result<(), ConstraintError>)> {
        None
    }

    /// True once the stream has ended and will produce no more frames.
    fn has_ended(&self) -> bool {
        false
    }

    fn stop(&mut self) {}
}

/// A still image presented as a one-frame stream.
pub struct StillImageSource {
    frame: Option<VideoFrame>,
}

impl StillImageSource {
    pub fn new(img: RgbaImage) -> Self {
        Self {
            frame: Some(VideoFrame::from_image(img)),
        }
    }

    pub fn open(path: &Path) -> Result<Self, CameraError> {
        let img = image::open(path)?.to_rgba8();
        log::info!(
            "Using still image {} ({}x{})",
            path.display(),
            img.width(),
            img.height()
        );
        Ok(Self::new(img))
    }
}

impl VideoSource for StillImageSource {
    fn poll_frame(&mut self) -> Option<VideoFrame> {
        self.frame.take()
    }
}

/// Opens the configured camera.
#[cfg(feature = "webcam")]
pub fn open_camera(constraints: &CameraConstraints) -> Result<Box<dyn VideoSource>, CameraError> {
    log::info!("Requesting camera: {}", constraints.to_media_constraints());
    let source = super::webcam::WebcamSource::open(constraints)?;
    Ok(Box::new(source))
}

/// Opens the configured camera.
#[cfg(not(feature = "webcam"))]
pub fn open_camera(constraints: &CameraConstraints) -> Result<Box<dyn VideoSource>, CameraError> {
    log::info!("Requesting camera: {}", constraints.to_media_constraints());
    Err(CameraError::Unsupported(
        "built without the `webcam` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_still_image_yields_one_frame() {
        let img = RgbaImage::from_pixel(4, 3, Rgba([1, 2, 3, 255]));
        let mut source = StillImageSource::new(img);

        let frame = source.poll_frame().unwrap();
        assert_eq!((frame.width, frame.height), (4, 3));
        assert!(frame.is_well_formed());
        assert!(source.poll_frame().is_none());
        assert!(source.zoom_capabilities().is_none());
    }

    #[test]
    fn test_media_constraints_shape() {
        let c = CameraConstraints::default();
        let v = c.to_media_constraints();
        assert_eq!(v["video"]["facingMode"]["ideal"], "environment");
        assert_eq!(v["video"]["width"]["ideal"], 9999);
        assert_eq!(v["audio"], false);
    }

    #[test]
    fn test_classify_errors() {
        assert!(matches!(
            CameraError::classify("Permission denied by user"),
            CameraError::PermissionDenied(_)
        ));
        assert!(matches!(
            CameraError::classify("Device or resource busy"),
            CameraError::Busy(_)
        ));
        assert!(matches!(
            CameraError::classify("Camera not found"),
            CameraError::NotFound(_)
        ));
        assert!(matches!(
            CameraError::classify("format negotiation failed"),
            CameraError::Stream(_)
        ));
    }

    #[test]
    fn test_still_image_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = StillImageSource::open(&dir.path().join("missing.png"));
        assert!(matches!(result, Err(CameraError::Image(_))));
    }
}
