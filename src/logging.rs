// src/logging.rs

//! `tracing` subscriber for the binary.
//!
//! The filter comes from, in order:
//! 1. `--log-level` (applies to buildrelay's own targets)
//! 2. `BUILDRELAY_LOG`, a full `EnvFilter` directive string such as
//!    `"buildrelay=debug,buildrelay::client=trace"`
//! 3. `info`
//!
//! Logs go to stderr. Client-side log lines forwarded over the bridge use
//! the `buildrelay::client` target, so they can be filtered separately.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "BUILDRELAY_LOG";

/// Dependencies that are noisy at debug level unless asked for explicitly.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "axum=warn", "tungstenite=warn", "notify=warn"];

pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("installing tracing subscriber")
}

/// Compose the filter from the CLI flag and the environment value.
pub fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> Result<EnvFilter> {
    let base = match (cli_level, env.map(str::trim).filter(|s| !s.is_empty())) {
        (Some(level), _) => format!("info,buildrelay={}", level.as_str()),
        (None, Some(directives)) => directives.to_string(),
        (None, None) => "info".to_string(),
    };

    let mut directives = base;
    for quiet in QUIET_TARGETS {
        let target = quiet.split('=').next().unwrap_or_default();
        if !directives.contains(target) {
            directives.push(',');
            directives.push_str(quiet);
        }
    }

    EnvFilter::try_new(&directives).with_context(|| format!("invalid log filter {directives:?}"))
}
