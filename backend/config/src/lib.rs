//! `nutrilens-config`: scanner configuration management.
//!
//! Provides:
//! - Typed config schema (endpoint, camera, capture, transfer, logging)
//! - YAML read/write with atomic replacement
//! - `${ENV_VAR}` substitution
//! - Config redaction for safe display
//! - Default value application
//! - Schema validation

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_config, read_config_value, write_config};
pub use redact::redact;
pub use schema::{
    CameraConfig, CaptureConfig, EndpointConfig, LoggingConfig, ScannerConfig, TransferConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{Context, Result};
use std::path::Path;

/// Load, apply env substitution, apply defaults and validate a config file.
///
/// This is the main entry point for loading a config at runtime. Validation
/// findings are logged; the caller decides whether errors are fatal by
/// running [`validate`] again.
pub async fn load_and_prepare(path: &Path) -> Result<ScannerConfig> {
    let Some(raw) = read_config_value(path).await? else {
        return Ok(apply_all_defaults(ScannerConfig::default()));
    };

    // Substitute before deserializing so numeric fields may come from env.
    let value = resolve_env_vars(&raw).context("Failed to resolve env vars in config")?;

    let config: ScannerConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;

    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }

    Ok(config)
}
