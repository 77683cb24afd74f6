//! NutriLens scanner configuration schema.
//!
//! Every section and field is optional so a partial `config.yaml` parses;
//! the accessor methods on [`ScannerConfig`] resolve unset values to the
//! defaults in [`crate::defaults`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::defaults::*;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the scanner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerConfig {
    /// Remote analysis endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointConfig>,

    /// Local camera device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraConfig>,

    /// Still-frame encoding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureConfig>,

    /// Upload behaviour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferConfig>,

    /// Logging configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Query parameter that asks the service to capture the image itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_param: Option<String>,
    /// Sent as a bearer token. Usually `${NUTRILENS_API_KEY}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<String>,
    /// ffmpeg input format, e.g. `v4l2`, `avfoundation`, `dshow`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_format: Option<String>,
    /// Rear-facing device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_device: Option<String>,
    /// Front-facing device; unset when the machine has none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size_bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Directory for the daily-rolling NDJSON log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
}

// ---------------------------------------------------------------------------
// Resolved accessors
// ---------------------------------------------------------------------------

impl ScannerConfig {
    /// `<baseUrl><path>`, with exactly one slash at the join.
    pub fn endpoint_url(&self) -> String {
        let ep = self.endpoint.as_ref();
        let base = ep
            .and_then(|e| e.base_url.as_deref())
            .unwrap_or(DEFAULT_BASE_URL);
        let path = ep.and_then(|e| e.path.as_deref()).unwrap_or(DEFAULT_PATH);
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn capture_param(&self) -> &str {
        self.endpoint
            .as_ref()
            .and_then(|e| e.capture_param.as_deref())
            .unwrap_or(DEFAULT_CAPTURE_PARAM)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.endpoint
            .as_ref()
            .and_then(|e| e.api_key.as_deref())
            .filter(|k| !k.is_empty())
    }

    pub fn ffmpeg_path(&self) -> &str {
        self.camera
            .as_ref()
            .and_then(|c| c.ffmpeg_path.as_deref())
            .unwrap_or(DEFAULT_FFMPEG_PATH)
    }

    pub fn input_format(&self) -> &str {
        self.camera
            .as_ref()
            .and_then(|c| c.input_format.as_deref())
            .unwrap_or(DEFAULT_INPUT_FORMAT)
    }

    pub fn environment_device(&self) -> &str {
        self.camera
            .as_ref()
            .and_then(|c| c.environment_device.as_deref())
            .unwrap_or(DEFAULT_ENVIRONMENT_DEVICE)
    }

    pub fn user_device(&self) -> Option<&str> {
        self.camera.as_ref().and_then(|c| c.user_device.as_deref())
    }

    pub fn resolution(&self) -> (u32, u32) {
        let cam = self.camera.as_ref();
        (
            cam.and_then(|c| c.width).unwrap_or(DEFAULT_WIDTH),
            cam.and_then(|c| c.height).unwrap_or(DEFAULT_HEIGHT),
        )
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.capture
            .as_ref()
            .and_then(|c| c.jpeg_quality)
            .unwrap_or(DEFAULT_JPEG_QUALITY)
    }

    pub fn chunk_size(&self) -> usize {
        self.transfer
            .as_ref()
            .and_then(|t| t.chunk_size_bytes)
            .unwrap_or(DEFAULT_CHUNK_SIZE_BYTES)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.transfer
                .as_ref()
                .and_then(|t| t.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_dir(&self) -> Option<&std::path::Path> {
        self.logging.as_ref().and_then(|l| l.dir.as_deref())
    }

    pub fn log_json(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_resolves_to_defaults() {
        let cfg = ScannerConfig::default();
        assert_eq!(cfg.endpoint_url(), "http://localhost:8000/scan/medication");
        assert_eq!(cfg.capture_param(), "capture");
        assert_eq!(cfg.api_key(), None);
        assert_eq!(cfg.resolution(), (1280, 720));
        assert_eq!(cfg.jpeg_quality(), 90);
        assert_eq!(cfg.chunk_size(), 16 * 1024);
        assert_eq!(cfg.timeout(), Duration::from_secs(60));
        assert!(!cfg.log_json());
    }

    #[test]
    fn endpoint_join_handles_slashes() {
        let cfg = ScannerConfig {
            endpoint: Some(EndpointConfig {
                base_url: Some("https://scan.example.com/".into()),
                path: Some("/v2/scan".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(cfg.endpoint_url(), "https://scan.example.com/v2/scan");
    }

    #[test]
    fn parses_camel_case_yaml() {
        let yaml = r#"
endpoint:
  baseUrl: http://10.0.0.5:8000
  captureParam: snap
camera:
  userDevice: /dev/video2
  width: 640
transfer:
  chunkSizeBytes: 4096
"#;
        let cfg: ScannerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.endpoint_url(), "http://10.0.0.5:8000/scan/medication");
        assert_eq!(cfg.capture_param(), "snap");
        assert_eq!(cfg.user_device(), Some("/dev/video2"));
        assert_eq!(cfg.resolution(), (640, 720));
        assert_eq!(cfg.chunk_size(), 4096);
    }

    #[test]
    fn empty_api_key_counts_as_unset() {
        let cfg = ScannerConfig {
            endpoint: Some(EndpointConfig {
                api_key: Some(String::new()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(cfg.api_key(), None);
    }
}
