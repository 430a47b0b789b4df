// src/config/mod.rs

//! Configuration loading and validation for greenpool.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a manifest from disk (`loader.rs`).
//! - Validate test ids, durations and patterns (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, CoverageSection, RawConfigFile, RawTestEntry, TestEntry};
pub use validate::parse_duration;
