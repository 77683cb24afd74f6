//! Image acquisition for the NutriLens scanner: camera sessions, still-frame
//! capture, and loading images from disk.

pub mod camera;
pub mod capture;
pub mod ffmpeg;
pub mod file_source;
pub mod mime_detect;
pub mod preview;

pub use camera::{
    CameraSession, CameraSessionManager, DeviceError, FacingMode, StreamConstraints, VideoDevice,
    VideoStream,
};
pub use capture::{DEFAULT_JPEG_QUALITY, FrameCapturer, encode_jpeg};
pub use ffmpeg::FfmpegDevice;
pub use file_source::load_image_file;
pub use mime_detect::{detect_mime_type, image_mime_for, is_image, sniff_image_mime};
pub use preview::data_url;
