// src/supervisor/injector.rs

//! The command injector: the only writer of the server's stdin.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::command::{CommandRequest, CommandSource};
use crate::errors::{Result, SupervisorError};
use crate::sink::MessageSink;
use crate::supervisor::worker::{stop_signal, StopSignal, StopTrigger, TaskWorker};
use crate::types::Message;

/// Capacity of the direct (API) request channel.
const DIRECT_QUEUE_LEN: usize = 64;

/// Cloneable handle for submitting requests to a running injector.
#[derive(Debug, Clone)]
pub struct InjectorHandle {
    tx: mpsc::Sender<CommandRequest>,
    trigger: StopTrigger,
}

impl InjectorHandle {
    /// Queue a request for writing. Fails once the injector stopped
    /// accepting requests (stopped, or stdin is gone).
    pub async fn submit(&self, request: CommandRequest) -> Result<()> {
        self.tx.send(request).await.map_err(|e| {
            SupervisorError::WriteError(format!(
                "command injector is closed; dropped '{}'",
                e.0
            ))
        })
    }

    /// Stop accepting requests. Requests already accepted are still written,
    /// then stdin is closed.
    pub fn close(&self) {
        self.trigger.trigger();
    }
}

/// Diverts the stop command when it shows up in a polled [`CommandSource`].
///
/// The request is not written; `on_request` is called instead, so the stop
/// command only ever reaches stdin through the supervisor's stop sequence.
pub struct StopDivert {
    name: String,
    on_request: Box<dyn Fn() + Send + Sync>,
}

impl StopDivert {
    pub fn new(name: impl Into<String>, on_request: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            on_request: Box::new(on_request),
        }
    }

    fn diverts(&self, request: &CommandRequest) -> bool {
        if request.name != self.name {
            return false;
        }
        debug!(command = %request, "stop command from command source; diverting");
        (self.on_request)();
        true
    }
}

impl std::fmt::Debug for StopDivert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopDivert").field("name", &self.name).finish()
    }
}

/// Spawn the injector worker owning `stdin`.
///
/// It serves two sources: requests submitted through the returned
/// [`InjectorHandle`], and `source`, which is polled without blocking every
/// `poll_interval`. Every request is written and flushed as one whole line
/// by this single task, so lines never interleave. Polled requests matching
/// `divert` are handed to it instead of being written.
pub fn spawn_injector<W>(
    stdin: W,
    source: Arc<dyn CommandSource>,
    sink: Arc<dyn MessageSink>,
    poll_interval: Duration,
    divert: Option<StopDivert>,
) -> (TaskWorker, InjectorHandle)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(DIRECT_QUEUE_LEN);
    let (trigger, signal) = stop_signal();
    let handle = InjectorHandle {
        tx,
        trigger: trigger.clone(),
    };

    let worker = TaskWorker::spawn_with("command-injector", trigger, signal, move |stop| {
        inject_commands(stdin, rx, source, sink, poll_interval, divert, stop)
    });

    (worker, handle)
}

async fn inject_commands<W>(
    mut stdin: W,
    mut rx: mpsc::Receiver<CommandRequest>,
    source: Arc<dyn CommandSource>,
    sink: Arc<dyn MessageSink>,
    poll_interval: Duration,
    divert: Option<StopDivert>,
    mut stop: StopSignal,
) where
    W: AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.stopped() => break,
            request = rx.recv() => match request {
                Some(request) => {
                    if write_request(&mut stdin, &request, sink.as_ref()).await.is_err() {
                        return;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                while let Some(request) = source.try_next() {
                    if divert.as_ref().is_some_and(|d| d.diverts(&request)) {
                        continue;
                    }
                    if write_request(&mut stdin, &request, sink.as_ref()).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    rx.close();
    while let Some(request) = rx.recv().await {
        if write_request(&mut stdin, &request, sink.as_ref()).await.is_err() {
            return;
        }
    }

    if let Err(e) = stdin.shutdown().await {
        debug!(error = %e, "closing server stdin failed");
    }
    debug!("command injector finished; stdin closed");
}

async fn write_request<W>(stdin: &mut W, request: &CommandRequest, sink: &dyn MessageSink) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = request.to_line();
    debug!(command = %request, "writing command to server stdin");

    let res = match stdin.write_all(line.as_bytes()).await {
        Ok(()) => stdin.flush().await,
        Err(e) => Err(e),
    };

    res.map_err(|e| {
        let err = SupervisorError::WriteError(format!("'{request}': {e}"));
        warn!(error = %err, "command injector stopped; server stdin is gone");
        sink.receive(&Message::internal(err.to_string()));
        err
    })
}
