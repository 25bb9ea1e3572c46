// src/supervisor/shutdown.rs

//! Shutdown coordination: stopping and joining every worker exactly once,
//! and reacting to termination signals sent to the wrapper itself.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::supervisor::worker::{StopSignal, Worker};

/// Ask every worker to stop, then join them one by one.
///
/// All stop requests go out before the first join so that workers wind down
/// in parallel.
pub async fn shutdown_all(workers: &mut [Box<dyn Worker>]) {
    for worker in workers.iter() {
        debug!(worker = worker.name(), "requesting worker stop");
        worker.stop();
    }
    for worker in workers.iter_mut() {
        worker.join().await;
    }
}

/// Owns the workers of one server session and tears them down once.
///
/// Workers are registered while the session is assembled, after which the
/// coordinator is sealed. [`shutdown`] may be called any number of times from
/// any task; the first call starts the teardown on a detached task, so it
/// runs to completion even if that caller stops waiting, and every caller
/// waits for the same completion.
///
/// [`shutdown`]: ShutdownCoordinator::shutdown
pub struct ShutdownCoordinator {
    workers: Mutex<Vec<Box<dyn Worker>>>,
    sealed: watch::Sender<bool>,
    started: AtomicBool,
    done: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (sealed, _) = watch::channel(false);
        let (done, _) = watch::channel(false);
        Self {
            workers: Mutex::new(Vec::new()),
            sealed,
            started: AtomicBool::new(false),
            done,
        }
    }

    /// Add a worker. Must happen before [`seal`](Self::seal).
    pub fn register(&self, worker: Box<dyn Worker>) {
        if *self.sealed.borrow() {
            warn!(worker = worker.name(), "worker registered after seal; stopping it");
            worker.stop();
        }
        self.lock().push(worker);
    }

    /// Mark the worker set as complete. A shutdown requested earlier waits
    /// for this before taking the workers.
    pub fn seal(&self) {
        self.sealed.send_replace(true);
    }

    pub fn registered(&self) -> usize {
        self.lock().len()
    }

    /// Whether a shutdown has completed, i.e. every worker was joined.
    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Stop and join every registered worker. Idempotent.
    pub async fn shutdown(self: &Arc<Self>) {
        if !self.started.swap(true, Ordering::SeqCst) {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let mut sealed = this.sealed.subscribe();
                let _ = sealed.wait_for(|s| *s).await;

                let mut workers = std::mem::take(&mut *this.lock());
                info!(workers = workers.len(), "shutting down server workers");
                shutdown_all(&mut workers).await;
                info!("all server workers joined");

                this.done.send_replace(true);
            });
        }
        self.finished().await;
    }

    /// Wait until a shutdown has completed.
    pub async fn finished(&self) {
        let mut done = self.done.subscribe();
        let _ = done.wait_for(|d| *d).await;
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Box<dyn Worker>>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("registered", &self.registered())
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Listen for Ctrl-C (and SIGTERM on Unix) until `ended` fires.
///
/// On the first signal, `on_signal` is awaited. The listener exits as soon
/// as `ended` fires, so a session torn down by other means releases it.
pub fn spawn_signal_listener<F, Fut>(mut ended: StopSignal, on_signal: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            res = termination_signal() => match res {
                Ok(()) => {
                    info!("termination signal received; shutting down server");
                    on_signal().await;
                }
                Err(e) => warn!(error = %e, "failed to listen for termination signals"),
            },
            _ = ended.stopped() => debug!("session ended; signal listener released"),
        }
    });
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
