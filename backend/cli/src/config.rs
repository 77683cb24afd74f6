//! Effective CLI configuration: config file plus environment overrides.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use nutrilens_config::{config_dir, config_file_path, load_and_prepare, validate, ScannerConfig};

/// Overrides `endpoint.baseUrl`.
pub const ENDPOINT_ENV: &str = "NUTRILENS_ENDPOINT";

/// `--config` if given, else `config.yaml` in the config directory.
pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
    match cli_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path(&config_dir()),
    }
}

/// Load the config file and apply environment overrides.
pub async fn load(path: &Path) -> Result<ScannerConfig> {
    let config = load_and_prepare(path).await?;
    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

/// Fail on validation errors in the effective config. Warnings pass.
pub fn ensure_valid(config: &ScannerConfig) -> Result<()> {
    let report = validate(config);
    if report.is_valid() {
        return Ok(());
    }
    let problems: Vec<String> = report
        .errors
        .iter()
        .map(|e| format!("{}: {}", e.path, e.message))
        .collect();
    bail!("Invalid configuration: {}", problems.join("; "))
}

/// `RUST_LOG` is not handled here; the log filter reads it directly.
pub fn apply_env_overrides(
    mut config: ScannerConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ScannerConfig {
    if let Some(url) = lookup(ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
        config.endpoint.get_or_insert_with(Default::default).base_url = Some(url);
    }
    config
}
