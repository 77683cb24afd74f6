//! `nutrilens config`: inspect or create the config file.

use std::path::Path;

use anyhow::{bail, Context, Result};
use nutrilens_config::{apply_all_defaults, redact, write_config, ScannerConfig};

use crate::terminal_output;

/// Print the effective config with secrets masked.
pub fn show(config: &ScannerConfig, path: &Path) -> Result<()> {
    println!("# {}", path.display());
    print!("{}", render_redacted(config)?);
    Ok(())
}

/// Write a config file holding every default.
pub async fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    write_config(&apply_all_defaults(ScannerConfig::default()), path).await?;
    terminal_output::note_success(&format!("Wrote {}", path.display()));
    Ok(())
}

fn render_redacted(config: &ScannerConfig) -> Result<String> {
    let value = serde_json::to_value(config).context("Failed to serialize config")?;
    serde_yaml::to_string(&redact(&value)).context("Failed to render config as YAML")
}
