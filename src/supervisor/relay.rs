// src/supervisor/relay.rs

//! Stream relays: one worker per server output stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::SupervisorError;
use crate::sink::MessageSink;
use crate::supervisor::worker::{StopSignal, TaskWorker};
use crate::types::{Message, MessageSource};

/// After a stop request, how long a relay keeps reading output that is
/// already on its way before closing the stream.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Spawn a relay that reads `stream` line by line and forwards each line to
/// `sink` as a [`Message`] tagged with `source`.
///
/// The relay ends when the stream reaches EOF, when reading fails (reported
/// as an internal message), or shortly after `stop()`: once stopped, it
/// keeps reading only while output arrives within a short grace period, then
/// drops (and thereby closes) the stream.
pub fn spawn_relay<R>(source: MessageSource, stream: R, sink: Arc<dyn MessageSink>) -> TaskWorker
where
    R: AsyncRead + Unpin + Send + 'static,
{
    TaskWorker::spawn(format!("{source}-relay"), move |stop| {
        relay_lines(source, stream, sink, stop)
    })
}

async fn relay_lines<R>(
    source: MessageSource,
    stream: R,
    sink: Arc<dyn MessageSink>,
    mut stop: StopSignal,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut draining = false;

    loop {
        let read = if draining {
            match timeout(DRAIN_GRACE, reader.read_until(b'\n', &mut buf)).await {
                Ok(res) => res,
                Err(_) => {
                    debug!(stream = %source, "no further output after stop; closing stream");
                    break;
                }
            }
        } else {
            tokio::select! {
                res = reader.read_until(b'\n', &mut buf) => res,
                _ = stop.stopped() => {
                    // Partially read bytes stay in `buf`; the next read
                    // continues the same line.
                    draining = true;
                    continue;
                }
            }
        };

        match read {
            Ok(0) => {
                debug!(stream = %source, "end of stream");
                break;
            }
            Ok(_) => {
                let text = decode_line(&buf);
                buf.clear();
                debug!(stream = %source, "{}", text);
                sink.receive(&Message::new(source, text));
            }
            Err(e) => {
                let err = SupervisorError::StreamError {
                    stream: source.as_str(),
                    source: e,
                };
                warn!(stream = %source, error = %err, "relay stopped after read error");
                sink.receive(&Message::internal(err.to_string()));
                break;
            }
        }
    }

    if !buf.is_empty() {
        sink.receive(&Message::new(source, decode_line(&buf)));
    }
    debug!(stream = %source, "relay finished");
}

/// Strip the line terminator and decode. Server output is untrusted, so
/// invalid UTF-8 is replaced rather than rejected.
fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && raw[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
