// src/config/mod.rs

//! Configuration loading and validation for buildrelay.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate patterns, timings and bridge settings (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    BridgeSection, BuildSection, ConfigFile, ProjectSection, RawConfigFile, TimingSection,
    WatchSection,
};
