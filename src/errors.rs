// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::SupervisorState;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The server program could not be executed at all.
    #[error("Could not launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Readiness was never reached; the caller of `start()` gets this.
    #[error("Server startup failed: {0}")]
    StartupFailed(String),

    #[error("Reading {stream} failed: {source}")]
    StreamError {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Writing to server stdin failed: {0}")]
    WriteError(String),

    #[error("Server exited unexpectedly: {0}")]
    UnexpectedExit(String),

    #[error("Server is not running (state: {0:?})")]
    NotRunning(SupervisorState),

    #[error("Server is already running (state: {0:?})")]
    AlreadyRunning(SupervisorState),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SupervisorError {
    /// Whether this error should abort the hosting program.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SupervisorError::Launch { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SupervisorError>;
