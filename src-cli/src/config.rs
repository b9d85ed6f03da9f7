//! TOML configuration for the burstpick CLI

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use burst_detection::{BurstConfig, ScanOptions};
use serde::{Deserialize, Serialize};

/// Settings read from `--config`; command-line flags override them.
///
/// ```toml
/// [burst]
/// threshold_secs = 0.5
/// policy = "metadata-first"
/// subsec_precision = false
///
/// [scan]
/// recursive = true
/// extensions = ["jpg", "jpeg", "png"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub burst: BurstConfig,
    pub scan: ScanOptions,
}

impl AppConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.burst.validate()?;
        if self.scan.extensions.is_empty() {
            anyhow::bail!("scan.extensions must list at least one extension");
        }
        Ok(())
    }
}
