// src/sink.rs

//! Message sinks: where relayed server output and internal notices go.

use std::io::{ErrorKind, Write};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::types::{Message, MessageSource};

/// Consumer of every relayed or internal [`Message`].
///
/// Called from the relay tasks, so implementations must not block for long:
/// a slow sink stalls the relay of that stream.
pub trait MessageSink: Send + Sync {
    fn receive(&self, message: &Message);
}

impl<S: MessageSink + ?Sized> MessageSink for Arc<S> {
    fn receive(&self, message: &Message) {
        (**self).receive(message)
    }
}

/// Forwards messages over an unbounded channel.
///
/// Messages sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSink for ChannelSink {
    fn receive(&self, message: &Message) {
        let _ = self.tx.send(message.clone());
    }
}

/// Delivers each message to several sinks, in registration order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MessageSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl MessageSink for FanoutSink {
    fn receive(&self, message: &Message) {
        for sink in &self.sinks {
            sink.receive(message);
        }
    }
}

/// Sink used by the `serverwrap` binary.
///
/// Server stdout goes to our stdout, server stderr to our stderr, and
/// internal notices to the log. A closed console (e.g. `serverwrap | head`)
/// is ignored: the server keeps running and its output is dropped.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
    err: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::with_writers(std::io::stdout(), std::io::stderr())
    }

    /// Write server stdout and stderr lines to the given writers instead.
    pub fn with_writers(
        out: impl Write + Send + 'static,
        err: impl Write + Send + 'static,
    ) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            err: Mutex::new(Box::new(err)),
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

impl MessageSink for ConsoleSink {
    fn receive(&self, message: &Message) {
        match message.source {
            MessageSource::Stdout => write_line(&self.out, message),
            MessageSource::Stderr => write_line(&self.err, message),
            MessageSource::Internal => info!(target: "server", "{}", message.text),
        }
    }
}

fn write_line(writer: &Mutex<Box<dyn Write + Send>>, message: &Message) {
    let mut writer = writer
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    match writeln!(writer, "{}", message.text).and_then(|()| writer.flush()) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
        Err(e) => debug!(stream = %message.source, error = %e, "console write failed"),
    }
}
