// src/supervisor/exit_monitor.rs

//! Exit monitor: the worker that owns the child process and waits for it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::process::Child;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sink::MessageSink;
use crate::supervisor::worker::{join_task, Worker};
use crate::types::Message;

/// How the server process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// `None` when the process was killed by a signal or could not be waited on.
    pub code: Option<i32>,
    pub success: bool,
}

/// Cloneable control over a running [`ExitMonitor`].
#[derive(Debug, Clone)]
pub struct ExitHandle {
    kill: Arc<Notify>,
    exited: watch::Receiver<Option<ExitReport>>,
}

impl ExitHandle {
    /// Forcefully kill the server (its whole process group on Unix).
    pub fn kill(&self) {
        self.kill.notify_one();
    }

    /// The exit report, if the process has already exited.
    pub fn report(&self) -> Option<ExitReport> {
        *self.exited.borrow()
    }

    /// Wait until the process has exited.
    pub async fn wait(&self) -> Option<ExitReport> {
        let mut rx = self.exited.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(report) => *report,
            // Monitor task is gone without reporting (it panicked).
            Err(_) => None,
        }
    }
}

/// Worker that waits for the child process to terminate.
///
/// On exit it emits an internal message with the exit status and then calls
/// the `on_exit` callback exactly once. It cannot be stopped early: `stop()`
/// is a no-op and `join()` returns once the child is gone.
pub struct ExitMonitor {
    handle: Option<JoinHandle<()>>,
    control: ExitHandle,
}

impl ExitMonitor {
    pub fn spawn<F>(mut child: Child, sink: Arc<dyn MessageSink>, on_exit: F) -> Self
    where
        F: FnOnce(ExitReport) + Send + 'static,
    {
        let kill = Arc::new(Notify::new());
        let (exited_tx, exited_rx) = watch::channel(None);
        let kill_requested = Arc::clone(&kill);

        let handle = tokio::spawn(async move {
            let waited = tokio::select! {
                res = child.wait() => Some(res),
                _ = kill_requested.notified() => None,
            };
            let status = match waited {
                Some(res) => res,
                None => {
                    warn!(pid = ?child.id(), "server did not exit in time; killing it");
                    kill_process_group(&mut child);
                    child.wait().await
                }
            };

            let (report, text) = match status {
                Ok(status) => (
                    ExitReport {
                        code: status.code(),
                        success: status.success(),
                    },
                    format!("server process exited ({status})"),
                ),
                Err(e) => (
                    ExitReport {
                        code: None,
                        success: false,
                    },
                    format!("waiting for server process failed: {e}"),
                ),
            };

            info!(exit_code = ?report.code, success = report.success, "server process exited");
            sink.receive(&Message::internal(text));
            exited_tx.send_replace(Some(report));
            on_exit(report);
        });

        Self {
            handle: Some(handle),
            control: ExitHandle {
                kill,
                exited: exited_rx,
            },
        }
    }

    pub fn handle(&self) -> ExitHandle {
        self.control.clone()
    }
}

impl Worker for ExitMonitor {
    fn name(&self) -> &str {
        "exit-monitor"
    }

    fn stop(&self) {}

    fn join(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Some(handle) = self.handle.take() {
                join_task("exit-monitor", handle).await;
            }
        })
    }

    fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }
}

fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // The child leads its own process group (see `CommandLine::to_command`).
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => return,
            Err(e) => debug!(pid, error = %e, "killpg failed; killing the process only"),
        }
    }

    if let Err(e) = child.start_kill() {
        warn!(error = %e, "failed to kill server process");
    }
}
