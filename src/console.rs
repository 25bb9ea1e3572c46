// src/console.rs

//! Operator console: lines typed into the wrapper's own stdin become server
//! commands.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{CommandQueue, CommandRequest};
use crate::supervisor::ProcessSupervisor;

/// Read operator commands from the process's stdin.
///
/// See [`forward_console`] for how lines are handled.
pub fn spawn_console_reader(queue: Arc<CommandQueue>, supervisor: ProcessSupervisor) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        forward_console(stdin, &queue, &supervisor).await;
    })
}

/// Forward operator lines from `input` to the server.
///
/// Each non-blank line is queued as a command. The configured stop command
/// is not queued; it triggers [`ProcessSupervisor::stop`] instead so the
/// usual shutdown sequence (and its write-once guarantee) applies. Reading
/// ends at EOF, after a stop, or on a read error; none of these stop the
/// server by themselves.
pub async fn forward_console<R>(input: R, queue: &CommandQueue, supervisor: &ProcessSupervisor)
where
    R: AsyncBufRead + Unpin,
{
    let stop_name = supervisor.options().stop_command.name.clone();
    let mut lines = input.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("console input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "reading console input failed");
                break;
            }
        };

        let Some(request) = CommandRequest::parse(&line) else {
            continue;
        };

        if request.name == stop_name {
            info!("stop requested from console");
            if let Err(e) = supervisor.stop().await {
                warn!(error = %e, "console stop failed");
            }
            break;
        }

        debug!(command = %request, "queueing console command");
        queue.push(request);
    }
}
