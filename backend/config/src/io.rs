//! Config file read/write.

use crate::schema::ScannerConfig;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolve the NutriLens config directory.
/// Priority: `NUTRILENS_CONFIG_DIR` env > `~/.nutrilens/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("NUTRILENS_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".nutrilens"),
        None => PathBuf::from(".nutrilens"),
    }
}

/// Resolve the full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Read the config as an untyped value, before env substitution.
///
/// Returns `Ok(None)` if the file doesn't exist (first run). An empty file
/// reads as an empty mapping.
pub async fn read_config_value(path: &Path) -> Result<Option<Value>> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    if raw.trim().is_empty() {
        return Ok(Some(Value::Object(Default::default())));
    }

    let value: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    Ok(Some(match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    }))
}

/// Load and parse the config from disk without env substitution.
///
/// Returns `Ok(Default::default())` if the file doesn't exist.
pub async fn load_config(path: &Path) -> Result<ScannerConfig> {
    match read_config_value(path).await? {
        Some(value) => serde_json::from_value(value)
            .with_context(|| format!("Invalid config at: {}", path.display())),
        None => Ok(ScannerConfig::default()),
    }
}

/// Write config to disk atomically (write to temp file, rename).
pub async fn write_config(config: &ScannerConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    let tmp_path = path.with_extension("yaml.tmp");
    fs::write(&tmp_path, yaml.as_bytes())
        .await
        .with_context(|| format!("Failed to write temp config: {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to rename temp config to: {}", path.display()))?;

    info!(path = %path.display(), "Wrote config");
    Ok(())
}
