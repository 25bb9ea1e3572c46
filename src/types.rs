use std::fmt;
use std::time::SystemTime;

/// Where a [`Message`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSource {
    Stdout,
    Stderr,
    /// Notices produced by the supervisor itself (exit codes, worker errors).
    Internal,
}

impl MessageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSource::Stdout => "stdout",
            MessageSource::Stderr => "stderr",
            MessageSource::Internal => "internal",
        }
    }
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of server output, or an internal notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub source: MessageSource,
    pub text: String,
    pub timestamp: SystemTime,
}

impl Message {
    pub fn new(source: MessageSource, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn internal(text: impl Into<String>) -> Self {
        Self::new(MessageSource::Internal, text)
    }

    pub fn is_internal(&self) -> bool {
        self.source == MessageSource::Internal
    }
}

/// Outcome of watching the server's output for its readiness marker.
///
/// Transitions at most once, from `NotStarted` to one of the terminal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    NotStarted,
    Loaded,
    Failed,
}

impl ReadinessState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReadinessState::NotStarted)
    }
}

/// Lifecycle of a [`crate::supervisor::ProcessSupervisor`].
///
/// `Crashed` is only reached when the child exits without having been asked
/// to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Crashed,
}

impl SupervisorState {
    /// States in which a child process is (or may still be) alive and
    /// accepting commands.
    pub fn is_active(&self) -> bool {
        matches!(self, SupervisorState::Starting | SupervisorState::Running)
    }

    /// States from which a new `start()` is allowed.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            SupervisorState::Idle | SupervisorState::Stopped | SupervisorState::Crashed
        )
    }
}
