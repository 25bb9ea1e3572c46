// src/command.rs

//! Command lines (how the server is launched) and command requests (what gets
//! typed into its stdin).

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::Command;

/// A fully assembled command line for the server process.
///
/// The supervisor does not interpret the program or its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    /// Run `cmd` through the platform shell.
    pub fn shell(cmd: impl Into<String>) -> Self {
        if cfg!(windows) {
            Self::new("cmd").arg("/C").arg(cmd)
        } else {
            Self::new("sh").arg("-c").arg(cmd)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Build the tokio command with all three stdio streams piped.
    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        // Own process group: a Ctrl-C on the terminal reaches us, not the
        // server, so shutdown goes through the stop command.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// A command destined for the server's stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub name: String,
    pub arguments: String,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Split an operator-typed line at the first whitespace into name and
    /// arguments. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match line.split_once(char::is_whitespace) {
            Some((name, rest)) => Some(Self::new(name, rest.trim_start())),
            None => Some(Self::new(line, "")),
        }
    }

    /// The exact line written to stdin, newline included.
    ///
    /// Line breaks inside the request become spaces so that one request is
    /// always one line.
    pub fn to_line(&self) -> String {
        let mut line = if self.arguments.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.arguments)
        };
        line = line.replace(['\r', '\n'], " ");
        line.push('\n');
        line
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_line().trim_end_matches('\n'))
    }
}

/// External, non-blocking source of queued commands (console, network...).
///
/// `try_next` must never block; `None` just means nothing is pending.
pub trait CommandSource: Send + Sync {
    fn try_next(&self) -> Option<CommandRequest>;
}

/// A source that never yields anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommands;

impl CommandSource for NoCommands {
    fn try_next(&self) -> Option<CommandRequest> {
        None
    }
}

/// Simple FIFO command source shared between producers and the injector.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Mutex<VecDeque<CommandRequest>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: CommandRequest) {
        self.lock().push_back(request);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<CommandRequest>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CommandSource for CommandQueue {
    fn try_next(&self) -> Option<CommandRequest> {
        self.lock().pop_front()
    }
}
