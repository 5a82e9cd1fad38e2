// src/exec/mod.rs

//! Build execution layer.
//!
//! Compiling a file is an external step; this module runs it and reports
//! back to the coordinator via `RuntimeEvent::BuildFinished`.
//!
//! - [`executor_loop`] owns the builder loop, one running build per file.
//! - [`build_runner`] runs a single build command.
//! - [`backend`] provides the `BuildBackend` trait and the production
//!   `CommandBackend`, which tests can replace with a fake implementation.

pub mod backend;
pub mod build_runner;
pub mod executor_loop;

pub use backend::{BuildBackend, CommandBackend};
pub use executor_loop::spawn_builder;
