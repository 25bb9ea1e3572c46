// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a config file.
///
/// No validation happens here: a file without a command or readiness
/// pattern still loads. Use [`load_and_validate`] or [`load_for_launch`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading config file");
    let contents = fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Load a config file and resolve it into launch settings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    load_for_launch(path, &[])
}

/// Like [`load_and_validate`], but a non-empty `command_override`
/// (`program args...`) replaces the `[server]` command before validation.
/// `working_dir` and `env` from the file still apply.
pub fn load_for_launch(path: impl AsRef<Path>, command_override: &[String]) -> Result<ConfigFile> {
    let mut raw = load_from_path(path)?;
    raw.server.override_command(command_override);
    ConfigFile::try_from(raw)
}

/// `ServerWrap.toml` in the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("ServerWrap.toml")
}
