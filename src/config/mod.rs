// src/config/mod.rs

//! Configuration loading and validation for serverwrap.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Turn the raw file into a launchable command line, compiled readiness
//!   markers and supervisor options (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_for_launch, load_from_path};
pub use model::{
    CommandsSection, ConfigFile, RawConfigFile, ReadinessSection, ServerSection, ShutdownSection,
};
pub use validate::parse_duration;
