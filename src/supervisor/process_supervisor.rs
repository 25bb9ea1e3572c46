// src/supervisor/process_supervisor.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::command::{CommandLine, CommandRequest, CommandSource};
use crate::errors::{Result, SupervisorError};
use crate::sink::{FanoutSink, MessageSink};
use crate::supervisor::exit_monitor::{ExitHandle, ExitMonitor, ExitReport};
use crate::supervisor::injector::{spawn_injector, InjectorHandle, StopDivert};
use crate::supervisor::readiness::{Markers, ReadinessGate};
use crate::supervisor::relay::spawn_relay;
use crate::supervisor::shutdown::{spawn_signal_listener, ShutdownCoordinator};
use crate::supervisor::worker::{stop_signal, StopTrigger};
use crate::types::{Message, MessageSource, ReadinessState, SupervisorState};

/// Tunables for a [`ProcessSupervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Written to the server's stdin to ask it to shut down.
    pub stop_command: CommandRequest,
    /// How long `stop()` waits for the server to exit before killing it.
    pub stop_timeout: Duration,
    /// How often the external command source is polled.
    pub poll_interval: Duration,
    /// Stop the server when the wrapper receives Ctrl-C / SIGTERM.
    pub handle_signals: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            stop_command: CommandRequest::new("stop", ""),
            stop_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
            handle_signals: true,
        }
    }
}

/// Supervises one server process at a time: launch, output relay, command
/// injection, readiness detection and shutdown.
///
/// Cheap to clone; all clones drive the same supervisor.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    markers: Markers,
    sink: Arc<dyn MessageSink>,
    source: Arc<dyn CommandSource>,
    options: SupervisorOptions,
    state: watch::Sender<SupervisorState>,
    session: Mutex<Option<Arc<Session>>>,
}

/// Everything belonging to one launched child process.
struct Session {
    gate: Arc<ReadinessGate>,
    injector: InjectorHandle,
    exit: ExitHandle,
    coordinator: Arc<ShutdownCoordinator>,
    /// Set once the stop command was handed to the injector.
    stop_issued: AtomicBool,
    /// Fires after the session is fully torn down.
    ended: StopTrigger,
}

impl Session {
    async fn wait_ended(&self) {
        self.ended.subscribe().stopped().await;
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("state", &self.state())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    pub fn new(
        markers: Markers,
        sink: Arc<dyn MessageSink>,
        source: Arc<dyn CommandSource>,
        options: SupervisorOptions,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        Self {
            inner: Arc::new(Inner {
                markers,
                sink,
                source,
                options,
                state,
                session: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.inner.state.borrow()
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.inner.options
    }

    /// Launch the server and wait until it reports readiness.
    ///
    /// Returns `Launch` if the program cannot be executed at all, and
    /// `StartupFailed` if the server exits, prints the failure marker, or is
    /// stopped before it is ready. A server that printed the failure marker
    /// is stopped before this returns. There is no automatic restart.
    pub async fn start(&self, command: &CommandLine) -> Result<()> {
        // A previous session must be fully torn down before a new child
        // may exist. A crash cleanup still in progress is waited out.
        if let Some(previous) = self.session() {
            let state = self.state();
            if !state.can_start() {
                return Err(SupervisorError::AlreadyRunning(state));
            }
            previous.wait_ended().await;
        }

        let session = self.launch(command)?;

        let readiness = session.gate.wait().await;
        debug!(?readiness, "readiness gate resolved");

        if readiness == ReadinessState::Loaded
            && self.transition(SupervisorState::Starting, SupervisorState::Running)
        {
            info!(command = %command, "server is running");
            return Ok(());
        }

        let reason = match self.state() {
            SupervisorState::Starting => {
                // Failure marker while the server is still alive.
                warn!("server reported a startup failure; stopping it");
                self.stop().await?;
                "failure marker seen in server output".to_string()
            }
            SupervisorState::Crashed => "server exited before it finished loading".to_string(),
            SupervisorState::Stopping | SupervisorState::Stopped => {
                "server was stopped during startup".to_string()
            }
            other => format!("server left startup in state {other:?}"),
        };
        Err(SupervisorError::StartupFailed(reason))
    }

    /// Queue `command` for the server's stdin.
    ///
    /// Only valid while the server is starting or running; otherwise
    /// `NotRunning` is returned and nothing is written. The configured stop
    /// command is not written directly: it runs [`stop`](Self::stop) and
    /// returns once the server is down.
    pub async fn execute(&self, command: &str, arguments: &str) -> Result<()> {
        let state = self.state();
        let session = match self.session() {
            Some(session) if state.is_active() => session,
            _ => return Err(SupervisorError::NotRunning(state)),
        };

        if command == self.inner.options.stop_command.name {
            info!("stop command requested through execute");
            return self.stop().await;
        }

        let request = CommandRequest::new(command, arguments);
        debug!(command = %request, "queueing command");
        session.injector.submit(request).await
    }

    /// Stop the server and wait until every worker has been joined.
    ///
    /// Idempotent and safe to call concurrently: the stop command is written
    /// at most once, and every caller returns only after the teardown
    /// finished. After a crash nothing is written; the call just waits for
    /// the crash cleanup.
    pub async fn stop(&self) -> Result<()> {
        let (session, claimed) = {
            let slot = self.inner.lock_session();
            let Some(session) = slot.clone() else {
                return Ok(());
            };
            let claimed = self.inner.state.send_if_modified(|state| {
                if state.is_active() {
                    *state = SupervisorState::Stopping;
                    true
                } else {
                    false
                }
            });
            (session, claimed)
        };

        if claimed {
            // Run the teardown detached so it completes even if this caller
            // is dropped midway.
            let this = self.clone();
            let owned = Arc::clone(&session);
            let teardown = tokio::spawn(async move { this.tear_down(&owned).await });
            if let Err(e) = teardown.await {
                error!(error = %e, "server teardown task failed");
                return Err(SupervisorError::Other(anyhow::anyhow!(
                    "server teardown task failed: {e}"
                )));
            }
        }

        session.wait_ended().await;
        Ok(())
    }

    /// Wait until the current session is over and return the final state
    /// (`Stopped` or `Crashed`). Returns immediately if nothing was started.
    pub async fn wait_finished(&self) -> SupervisorState {
        if let Some(session) = self.session() {
            session.wait_ended().await;
        }
        self.state()
    }

    /// Whether every worker of the current session has been joined.
    pub fn workers_joined(&self) -> bool {
        self.session()
            .is_none_or(|session| session.coordinator.is_finished())
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.inner.lock_session().clone()
    }

    fn transition(&self, from: SupervisorState, to: SupervisorState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Spawn the child and all of its workers, and install the new session.
    ///
    /// Entirely synchronous, so a caller that gives up on `start()` can
    /// never leave a half-built session behind.
    fn launch(&self, command: &CommandLine) -> Result<Arc<Session>> {
        let mut slot = self.inner.lock_session();

        let previous = self.state();
        if !previous.can_start() || slot.as_ref().is_some_and(|s| !s.ended.is_triggered()) {
            return Err(SupervisorError::AlreadyRunning(previous));
        }

        info!(command = %command, "launching server process");
        let mut child = command.to_command().spawn().map_err(|source| {
            error!(program = %command.program, error = %source, "could not launch server");
            SupervisorError::Launch {
                program: command.program.clone(),
                source,
            }
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(SupervisorError::Launch {
                program: command.program.clone(),
                source: std::io::Error::other("server stdio was not captured"),
            });
        };

        self.inner.state.send_replace(SupervisorState::Starting);

        let gate = Arc::new(ReadinessGate::new(self.inner.markers.clone()));
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let (ended, ended_signal) = stop_signal();

        let relay_sink: Arc<dyn MessageSink> = Arc::new(
            FanoutSink::new()
                .with(Arc::clone(&self.inner.sink))
                .with(gate.clone()),
        );
        coordinator.register(Box::new(spawn_relay(
            MessageSource::Stdout,
            stdout,
            Arc::clone(&relay_sink),
        )));
        coordinator.register(Box::new(spawn_relay(
            MessageSource::Stderr,
            stderr,
            relay_sink,
        )));

        let divert = StopDivert::new(self.inner.options.stop_command.name.clone(), {
            let inner = Arc::downgrade(&self.inner);
            move || {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                let this = ProcessSupervisor { inner };
                tokio::spawn(async move {
                    if let Err(e) = this.stop().await {
                        warn!(error = %e, "queued stop command failed");
                    }
                });
            }
        });
        let (injector_worker, injector) = spawn_injector(
            stdin,
            Arc::clone(&self.inner.source),
            Arc::clone(&self.inner.sink),
            self.inner.options.poll_interval,
            Some(divert),
        );
        coordinator.register(Box::new(injector_worker));

        let monitor = ExitMonitor::spawn(child, Arc::clone(&self.inner.sink), {
            let inner = Arc::downgrade(&self.inner);
            let gate = Arc::clone(&gate);
            let coordinator = Arc::clone(&coordinator);
            let ended = ended.clone();
            move |report| on_child_exit(inner, report, gate, coordinator, ended)
        });
        let exit = monitor.handle();
        coordinator.register(Box::new(monitor));
        coordinator.seal();

        if self.inner.options.handle_signals {
            let this = self.clone();
            spawn_signal_listener(ended_signal, move || async move {
                if let Err(e) = this.stop().await {
                    warn!(error = %e, "signal-triggered stop failed");
                }
            });
        }

        let session = Arc::new(Session {
            gate,
            injector,
            exit,
            coordinator,
            stop_issued: AtomicBool::new(false),
            ended,
        });
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// The full stop sequence for one session. Runs once per session.
    ///
    /// `stop_timeout` bounds both handing over the stop command and waiting
    /// for the exit, so a server that no longer reads its stdin is still
    /// killed on time.
    async fn tear_down(&self, session: &Session) {
        info!("stopping server");
        let grace = self.inner.options.stop_timeout;
        let deadline = Instant::now() + grace;
        self.issue_stop_command(session, deadline).await;

        // Close stdin after the stop command and release anyone still
        // waiting in `start()`.
        session.injector.close();
        session.gate.fail();

        if timeout_at(deadline, session.exit.wait()).await.is_err() {
            warn!(timeout = ?grace, "server did not stop in time; killing it");
            session.exit.kill();
            session.exit.wait().await;
        }

        session.coordinator.shutdown().await;
        self.inner.state.send_replace(SupervisorState::Stopped);
        session.ended.trigger();
        info!("server stopped");
    }

    async fn issue_stop_command(&self, session: &Session, deadline: Instant) {
        if session.stop_issued.swap(true, Ordering::SeqCst) {
            return;
        }
        let request = self.inner.options.stop_command.clone();
        info!(command = %request, "sending stop command to server");
        match timeout_at(deadline, session.injector.submit(request)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "stop command could not be delivered"),
            Err(_) => warn!("server stdin is backed up; stop command not delivered"),
        }
    }
}

impl Inner {
    fn lock_session(&self) -> MutexGuard<'_, Option<Arc<Session>>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exit callback of the [`ExitMonitor`]. An exit while the server is starting
/// or running is a crash; any other exit confirms a requested stop.
fn on_child_exit(
    inner: Weak<Inner>,
    report: ExitReport,
    gate: Arc<ReadinessGate>,
    coordinator: Arc<ShutdownCoordinator>,
    ended: StopTrigger,
) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let crashed = inner.state.send_if_modified(|state| {
        if state.is_active() {
            *state = SupervisorState::Crashed;
            true
        } else {
            false
        }
    });
    if !crashed {
        debug!(exit_code = ?report.code, "server exit confirms requested stop");
        return;
    }

    let err = SupervisorError::UnexpectedExit(match report.code {
        Some(code) => format!("exit code {code}"),
        None => "terminated without an exit code".to_string(),
    });
    warn!(error = %err, "server crashed");
    inner.sink.receive(&Message::internal(err.to_string()));
    gate.fail();

    // This runs on the exit monitor's own task, which the cleanup joins, so
    // the cleanup has to run elsewhere.
    tokio::spawn(async move {
        coordinator.shutdown().await;
        ended.trigger();
        debug!("crash cleanup finished");
    });
}
