// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::command::CommandLine;
use crate::supervisor::{Markers, SupervisorOptions};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [server]
/// cmd = "java -Xmx1024M -jar minecraft_server.jar nogui"
///
/// [readiness]
/// ready_pattern = "Done \\("
/// failure_pattern = "FAILED TO BIND"
///
/// [shutdown]
/// stop_command = "stop"
/// stop_timeout = "30s"
/// ```
///
/// Only `[server]` (or a command given on the CLI) and
/// `readiness.ready_pattern` are required.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub readiness: ReadinessSection,

    #[serde(default)]
    pub shutdown: ShutdownSection,

    #[serde(default)]
    pub commands: CommandsSection,
}

/// `[server]` section: how to launch the server.
///
/// Either `cmd` (run through the shell) or `program` + `args`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerSection {
    #[serde(default)]
    pub cmd: Option<String>,

    #[serde(default)]
    pub program: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ServerSection {
    /// Replace the configured command with `program args...`, keeping
    /// `working_dir` and `env`.
    pub fn override_command(&mut self, argv: &[String]) {
        if let Some((program, args)) = argv.split_first() {
            self.cmd = None;
            self.program = Some(program.clone());
            self.args = args.to_vec();
        }
    }
}

/// `[readiness]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReadinessSection {
    /// Marks the server as loaded when a stdout/stderr line matches.
    #[serde(default)]
    pub ready_pattern: Option<String>,

    /// Marks startup as failed when a line matches.
    #[serde(default)]
    pub failure_pattern: Option<String>,

    /// Treat both patterns as plain substrings instead of regexes.
    #[serde(default)]
    pub literal: bool,

    /// Give up on startup after this long (e.g. `"120s"`).
    #[serde(default)]
    pub startup_timeout: Option<String>,
}

/// `[shutdown]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSection {
    #[serde(default = "default_stop_command")]
    pub stop_command: String,

    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: String,

    #[serde(default = "default_handle_signals")]
    pub handle_signals: bool,
}

fn default_stop_command() -> String {
    "stop".to_string()
}

fn default_stop_timeout() -> String {
    "30s".to_string()
}

fn default_handle_signals() -> bool {
    true
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            stop_command: default_stop_command(),
            stop_timeout: default_stop_timeout(),
            handle_signals: default_handle_signals(),
        }
    }
}

/// `[commands]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandsSection {
    /// How often queued console commands are drained into the server.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
}

fn default_poll_interval() -> String {
    "50ms".to_string()
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
        }
    }
}

/// Validated configuration, ready to drive a
/// [`ProcessSupervisor`](crate::supervisor::ProcessSupervisor).
///
/// Built from a [`RawConfigFile`] via `TryFrom` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub command: CommandLine,
    pub markers: Markers,
    pub options: SupervisorOptions,
    pub startup_timeout: Option<Duration>,
}
