pub mod blocks;
pub mod config;
pub mod info;
pub mod register;

use std::path::Path;

use anyhow::{Context, Result};
use steady_core::pipeline::RegistrationConfig;

/// Read and validate a TOML registration config.
pub fn load_config(path: &Path) -> Result<RegistrationConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: RegistrationConfig =
        toml::from_str(&contents).with_context(|| format!("Invalid config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Rejected config {}", path.display()))?;
    Ok(config)
}
