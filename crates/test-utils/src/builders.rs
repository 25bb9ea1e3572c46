#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serverwrap::command::{CommandLine, CommandRequest, CommandSource, NoCommands};
use serverwrap::config::{ConfigFile, RawConfigFile};
use serverwrap::sink::MessageSink;
use serverwrap::supervisor::{Markers, ProcessSupervisor, SupervisorOptions};

/// Builder for `RawConfigFile` / `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.config.server.cmd = Some(cmd.to_string());
        self
    }

    pub fn program(mut self, program: &str, args: &[&str]) -> Self {
        self.config.server.program = Some(program.to_string());
        self.config.server.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config
            .server
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn ready_pattern(mut self, pattern: &str) -> Self {
        self.config.readiness.ready_pattern = Some(pattern.to_string());
        self
    }

    pub fn failure_pattern(mut self, pattern: &str) -> Self {
        self.config.readiness.failure_pattern = Some(pattern.to_string());
        self
    }

    pub fn literal(mut self, val: bool) -> Self {
        self.config.readiness.literal = val;
        self
    }

    pub fn stop_command(mut self, cmd: &str) -> Self {
        self.config.shutdown.stop_command = cmd.to_string();
        self
    }

    pub fn stop_timeout(mut self, duration: &str) -> Self {
        self.config.shutdown.stop_timeout = duration.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Options suited to tests: no signal handling, quick polling and a short
/// stop timeout.
pub fn test_options() -> SupervisorOptions {
    SupervisorOptions {
        stop_command: CommandRequest::new("stop", ""),
        stop_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        handle_signals: false,
    }
}

/// A `sh -c` script run as the server.
pub fn script(body: &str) -> CommandLine {
    CommandLine::shell(body)
}

/// A server that prints `ready`, then copies everything it receives on stdin
/// into `capture` until stdin is closed.
pub fn stdin_capture_server(capture: &Path) -> CommandLine {
    CommandLine::new("sh")
        .arg("-c")
        .arg("echo ready; exec cat > \"$1\"")
        .arg("sh")
        .arg(capture.to_string_lossy().into_owned())
}

/// Builder for a `ProcessSupervisor` wired to test defaults.
pub struct SupervisorBuilder {
    markers: Markers,
    sink: Arc<dyn MessageSink>,
    source: Arc<dyn CommandSource>,
    options: SupervisorOptions,
}

impl SupervisorBuilder {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            markers: Markers::literal("ready", None).expect("literal markers compile"),
            sink,
            source: Arc::new(NoCommands),
            options: test_options(),
        }
    }

    pub fn markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }

    pub fn source(mut self, source: Arc<dyn CommandSource>) -> Self {
        self.source = source;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.options.stop_timeout = timeout;
        self
    }

    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.options.handle_signals = enabled;
        self
    }

    pub fn build(self) -> ProcessSupervisor {
        ProcessSupervisor::new(self.markers, self.sink, self.source, self.options)
    }
}
