//! Config validation: schema checks with user-friendly error messages.

use crate::schema::ScannerConfig;
use thiserror::Error;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &ScannerConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_endpoint(config, &mut report);
    validate_camera(config, &mut report);
    validate_capture(config, &mut report);
    validate_transfer(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_endpoint(config: &ScannerConfig, report: &mut ValidationReport) {
    let Some(endpoint) = &config.endpoint else { return };
    if let Some(base) = &endpoint.base_url {
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            report.error(
                "endpoint.baseUrl",
                format!("'{base}' must start with http:// or https://"),
            );
        } else if base.starts_with("http://")
            && endpoint.api_key.as_deref().is_some_and(|k| !k.is_empty())
            && !is_loopback(base)
        {
            report.warn(
                "endpoint.apiKey",
                "API key will be sent over plain HTTP to a non-local host",
            );
        }
    }
    if let Some(param) = &endpoint.capture_param {
        if param.trim().is_empty() {
            report.error("endpoint.captureParam", "captureParam cannot be empty");
        }
    }
}

fn is_loopback(url: &str) -> bool {
    let authority = url
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or_default();
    authority == "localhost"
        || authority.starts_with("localhost:")
        || authority.starts_with("127.")
        || authority.starts_with("[::1]")
}

fn validate_camera(config: &ScannerConfig, report: &mut ValidationReport) {
    let Some(camera) = &config.camera else { return };
    if camera.width == Some(0) {
        report.error("camera.width", "width must be > 0");
    }
    if camera.height == Some(0) {
        report.error("camera.height", "height must be > 0");
    }
    if let Some(device) = &camera.environment_device {
        if device.trim().is_empty() {
            report.error("camera.environmentDevice", "environmentDevice cannot be empty");
        }
    }
}

fn validate_capture(config: &ScannerConfig, report: &mut ValidationReport) {
    let Some(capture) = &config.capture else { return };
    if let Some(q) = capture.jpeg_quality {
        if !(1..=100).contains(&q) {
            report.error("capture.jpegQuality", format!("jpegQuality {q} must be between 1 and 100"));
        }
    }
}

fn validate_transfer(config: &ScannerConfig, report: &mut ValidationReport) {
    let Some(transfer) = &config.transfer else { return };
    if transfer.chunk_size_bytes == Some(0) {
        report.error("transfer.chunkSizeBytes", "chunkSizeBytes must be >= 1");
    }
    if transfer.timeout_secs == Some(0) {
        report.error("transfer.timeoutSecs", "timeoutSecs must be >= 1");
    }
}

fn validate_logging(config: &ScannerConfig, report: &mut ValidationReport) {
    let Some(logging) = &config.logging else { return };
    if let Some(level) = &logging.level {
        if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            report.warn(
                "logging.level",
                format!("Unknown log level '{level}'. Use one of: {}", LOG_LEVELS.join(", ")),
            );
        }
    }
}
