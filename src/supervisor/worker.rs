// src/supervisor/worker.rs

//! The `Worker` contract shared by every concurrently running part of the
//! supervisor, plus the stop signal used to implement it.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// A concurrently running unit with a cooperative stop/join lifecycle.
///
/// `stop` only *requests* termination and returns immediately; `join` waits
/// until the unit has actually finished. Joining twice is allowed and the
/// second join returns at once.
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    fn stop(&self);

    fn join(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    fn is_finished(&self) -> bool;
}

/// Sending half of a stop signal. Triggering is idempotent.
#[derive(Debug, Clone)]
pub struct StopTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half of a stop signal.
///
/// If every [`StopTrigger`] is dropped the signal counts as triggered, so a
/// worker never outlives its owner.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

pub fn stop_signal() -> (StopTrigger, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopTrigger { tx }, StopSignal { rx })
}

impl StopTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl StopSignal {
    /// Resolve once stop has been requested.
    ///
    /// Cancel safe; meant to be used as a `tokio::select!` branch.
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}

/// A worker backed by a spawned Tokio task and a [`StopSignal`].
pub struct TaskWorker {
    name: String,
    trigger: StopTrigger,
    handle: Option<JoinHandle<()>>,
}

impl TaskWorker {
    /// Spawn `body` with a fresh stop signal.
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (trigger, signal) = stop_signal();
        Self::spawn_with(name, trigger, signal, body)
    }

    /// Spawn `body` with a caller-provided stop signal, so that the caller can
    /// keep a [`StopTrigger`] of its own.
    pub fn spawn_with<F, Fut>(
        name: impl Into<String>,
        trigger: StopTrigger,
        signal: StopSignal,
        body: F,
    ) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(body(signal));
        debug!(worker = %name, "worker started");
        Self {
            name,
            trigger,
            handle: Some(handle),
        }
    }
}

impl std::fmt::Debug for TaskWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskWorker")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Worker for TaskWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&self) {
        self.trigger.trigger();
    }

    fn join(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Some(handle) = self.handle.take() {
                join_task(&self.name, handle).await;
            }
        })
    }

    fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }
}

/// Await a worker task. A panicked task counts as joined; the panic is logged.
pub(crate) async fn join_task(name: &str, handle: JoinHandle<()>) {
    match handle.await {
        Ok(()) => debug!(worker = %name, "worker joined"),
        Err(e) => error!(worker = %name, error = %e, "worker task ended abnormally"),
    }
}
