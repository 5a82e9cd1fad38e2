// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `buildrelay`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "buildrelay",
    version,
    about = "Incremental build coordinator with live-reload notifications.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Buildrelay.toml` in the current working directory. When the
    /// default file does not exist, built-in defaults are used.
    #[arg(long, value_name = "PATH", default_value = "Buildrelay.toml")]
    pub config: String,

    /// Ignore the cache snapshot persisted by the previous run.
    #[arg(long)]
    pub reset: bool,

    /// Build every watched file once, persist the cache and exit.
    ///
    /// No file watcher and no client bridge are started in this mode.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BUILDRELAY_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the config, print it, but don't build anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
