// src/config/loader.rs

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::model::JobCntrlCfg;
use crate::config::validate::validate_config;

/// Load a runtime configuration from a TOML file, without validation.
pub fn load_from_path(path: &Path) -> Result<JobCntrlCfg> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg: JobCntrlCfg = toml::from_str(&raw)
        .with_context(|| format!("failed to parse TOML config {}", path.display()))?;
    Ok(cfg)
}

/// Load and semantically validate a runtime configuration.
pub fn load_and_validate(path: &Path) -> Result<JobCntrlCfg> {
    let cfg = load_from_path(path)?;
    validate_config(&cfg)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(cfg)
}
