// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{BuildRelayError, Result};
use crate::watch::patterns::build_globset;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BuildRelayError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_watch(cfg)?;
    validate_timing(cfg)?;
    validate_bridge(cfg)?;
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.include.is_empty() {
        return Err(BuildRelayError::ConfigError(
            "[watch].include must contain at least one pattern".to_string(),
        ));
    }

    for (key, patterns) in [("include", &cfg.watch.include), ("exclude", &cfg.watch.exclude)] {
        build_globset(patterns)
            .map_err(|e| BuildRelayError::ConfigError(format!("[watch].{key}: {e:#}")))?;
    }

    Ok(())
}

fn validate_timing(cfg: &RawConfigFile) -> Result<()> {
    if cfg.timing.settle_ms == 0 {
        return Err(BuildRelayError::ConfigError(
            "[timing].settle_ms must be > 0 (got 0)".to_string(),
        ));
    }

    if cfg.timing.scan_timeout_ms == 0 {
        return Err(BuildRelayError::ConfigError(
            "[timing].scan_timeout_ms must be > 0 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_bridge(cfg: &RawConfigFile) -> Result<()> {
    if cfg.bridge.pending_limit == 0 {
        return Err(BuildRelayError::ConfigError(
            "[bridge].pending_limit must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.bridge.enabled && cfg.bridge.host.trim().is_empty() {
        return Err(BuildRelayError::ConfigError(
            "[bridge].host must not be empty".to_string(),
        ));
    }

    Ok(())
}
