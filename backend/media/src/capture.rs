//! Still-frame capture from an open camera session.

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use nutrilens_core::{AcquiredImage, ImagePayload, ImageSource, ScanError};
use tracing::debug;

use crate::camera::CameraSession;
use crate::preview::data_url;

/// JPEG quality used when none is configured.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

const CAPTURE_FILE_NAME: &str = "capture.jpg";

/// Turns the current frame of a live session into a JPEG payload.
#[derive(Debug, Clone, Copy)]
pub struct FrameCapturer {
    quality: u8,
}

impl Default for FrameCapturer {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameCapturer {
    /// Quality is clamped to `1..=100`.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode the session's latest frame at its native resolution.
    ///
    /// The session is left open; closing it is the caller's decision.
    pub fn capture(&self, session: &CameraSession) -> Result<AcquiredImage, ScanError> {
        let stream = session
            .stream()
            .ok_or_else(|| ScanError::CaptureUnavailable("camera session is closed".into()))?;

        let Some((width, height)) = stream.dimensions().filter(|(w, h)| *w > 0 && *h > 0) else {
            if stream.has_ended() {
                return Err(ScanError::DeviceUnavailable(
                    "video stream ended before producing a frame".into(),
                ));
            }
            return Err(ScanError::CaptureUnavailable(
                "video stream has not produced a frame yet".into(),
            ));
        };

        let frame = stream.latest_frame().ok_or_else(|| {
            ScanError::CaptureUnavailable("video stream has not produced a frame yet".into())
        })?;

        let bytes = encode_jpeg(&frame, self.quality)
            .map_err(|e| ScanError::CaptureUnavailable(format!("failed to encode frame: {e}")))?;
        debug!(
            session_id = %session.id(),
            width,
            height,
            bytes = bytes.len(),
            quality = self.quality,
            "Captured still frame"
        );

        let payload = ImagePayload::new(bytes, "image/jpeg", CAPTURE_FILE_NAME);
        let preview = data_url(&payload);
        Ok(AcquiredImage::new(ImageSource::Camera, payload, preview))
    }
}

/// Encode an RGB frame as JPEG.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(frame)?;
    Ok(buf)
}
