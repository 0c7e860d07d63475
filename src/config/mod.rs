// src/config/mod.rs

//! Configuration loading and validation for crontabd.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate settings and seed jobs (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path};
pub use model::{AgentSection, AgentSettings, ConfigFile, RawConfigFile, SeedCrontabJob, SeedDaemonJob};
