//! Config defaults: applies default values to a parsed config.

use crate::schema::{
    CameraConfig, CaptureConfig, EndpointConfig, LoggingConfig, ScannerConfig, TransferConfig,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_PATH: &str = "/scan/medication";
pub const DEFAULT_CAPTURE_PARAM: &str = "capture";

pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
pub const DEFAULT_INPUT_FORMAT: &str = "v4l2";
pub const DEFAULT_ENVIRONMENT_DEVICE: &str = "/dev/video0";
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Default JPEG quality for captured frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Default upload chunk size; one progress event per chunk.
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 16 * 1024;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: ScannerConfig) -> ScannerConfig {
    let config = apply_endpoint_defaults(config);
    let config = apply_camera_defaults(config);
    let config = apply_capture_defaults(config);
    let config = apply_transfer_defaults(config);
    apply_logging_defaults(config)
}

fn apply_endpoint_defaults(mut config: ScannerConfig) -> ScannerConfig {
    let endpoint = config.endpoint.get_or_insert_with(EndpointConfig::default);
    endpoint
        .base_url
        .get_or_insert_with(|| DEFAULT_BASE_URL.to_string());
    endpoint.path.get_or_insert_with(|| DEFAULT_PATH.to_string());
    endpoint
        .capture_param
        .get_or_insert_with(|| DEFAULT_CAPTURE_PARAM.to_string());
    config
}

/// The front-facing device stays unset; there is no sensible default path.
fn apply_camera_defaults(mut config: ScannerConfig) -> ScannerConfig {
    let camera = config.camera.get_or_insert_with(CameraConfig::default);
    camera
        .ffmpeg_path
        .get_or_insert_with(|| DEFAULT_FFMPEG_PATH.to_string());
    camera
        .input_format
        .get_or_insert_with(|| DEFAULT_INPUT_FORMAT.to_string());
    camera
        .environment_device
        .get_or_insert_with(|| DEFAULT_ENVIRONMENT_DEVICE.to_string());
    camera.width.get_or_insert(DEFAULT_WIDTH);
    camera.height.get_or_insert(DEFAULT_HEIGHT);
    config
}

fn apply_capture_defaults(mut config: ScannerConfig) -> ScannerConfig {
    let capture = config.capture.get_or_insert_with(CaptureConfig::default);
    capture.jpeg_quality.get_or_insert(DEFAULT_JPEG_QUALITY);
    config
}

fn apply_transfer_defaults(mut config: ScannerConfig) -> ScannerConfig {
    let transfer = config.transfer.get_or_insert_with(TransferConfig::default);
    transfer.chunk_size_bytes.get_or_insert(DEFAULT_CHUNK_SIZE_BYTES);
    transfer.timeout_secs.get_or_insert(DEFAULT_TIMEOUT_SECS);
    config
}

fn apply_logging_defaults(mut config: ScannerConfig) -> ScannerConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging
        .level
        .get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    logging.json.get_or_insert(false);
    config
}
