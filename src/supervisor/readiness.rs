// src/supervisor/readiness.rs

//! Readiness detection: a one-shot gate resolved by scanning server output.

use regex::Regex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::{Result, SupervisorError};
use crate::sink::MessageSink;
use crate::types::{Message, ReadinessState};

/// Patterns matched against every relayed output line.
#[derive(Debug, Clone)]
pub struct Markers {
    pub ready: Regex,
    pub failure: Option<Regex>,
}

impl Markers {
    /// Compile regex markers.
    pub fn new(ready: &str, failure: Option<&str>) -> Result<Self> {
        let ready = compile("ready_pattern", ready)?;
        let failure = failure.map(|f| compile("failure_pattern", f)).transpose()?;
        Ok(Self { ready, failure })
    }

    /// Markers matched as plain substrings.
    pub fn literal(ready: &str, failure: Option<&str>) -> Result<Self> {
        let failure = failure.map(regex::escape);
        Self::new(&regex::escape(ready), failure.as_deref())
    }
}

fn compile(field: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        SupervisorError::ConfigError(format!("invalid {field} regex '{pattern}': {e}"))
    })
}

/// One-shot readiness gate.
///
/// Starts `NotStarted` and resolves exactly once, to `Loaded` (ready marker
/// seen) or `Failed` (failure marker seen, or forced by [`fail`]). Any number
/// of tasks may [`wait`] on it concurrently.
///
/// [`fail`]: ReadinessGate::fail
/// [`wait`]: ReadinessGate::wait
#[derive(Debug)]
pub struct ReadinessGate {
    markers: Markers,
    state: watch::Sender<ReadinessState>,
}

impl ReadinessGate {
    pub fn new(markers: Markers) -> Self {
        let (state, _) = watch::channel(ReadinessState::NotStarted);
        Self { markers, state }
    }

    pub fn state(&self) -> ReadinessState {
        *self.state.borrow()
    }

    /// Inspect one message. Only server output is considered; the failure
    /// marker takes precedence when a line matches both.
    pub fn observe(&self, message: &Message) {
        if message.is_internal() || self.state().is_terminal() {
            return;
        }

        if let Some(failure) = &self.markers.failure {
            if failure.is_match(&message.text) {
                if self.resolve(ReadinessState::Failed) {
                    warn!(line = %message.text, "failure marker seen; startup failed");
                }
                return;
            }
        }

        if self.markers.ready.is_match(&message.text) && self.resolve(ReadinessState::Loaded) {
            info!(line = %message.text, "readiness marker seen; server loaded");
        }
    }

    /// Force the gate to `Failed` unless it already resolved.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn fail(&self) -> bool {
        let changed = self.resolve(ReadinessState::Failed);
        if changed {
            debug!("readiness gate forced to Failed");
        }
        changed
    }

    /// Wait until the gate resolves and return the terminal state.
    pub async fn wait(&self) -> ReadinessState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(ReadinessState::is_terminal).await {
            Ok(state) => *state,
            // The sender lives in `self`, so the channel cannot close while
            // we are borrowed.
            Err(_) => self.state(),
        }
    }

    fn resolve(&self, to: ReadinessState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ReadinessState::NotStarted {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

impl MessageSink for ReadinessGate {
    fn receive(&self, message: &Message) {
        self.observe(message);
    }
}
