// src/supervisor/mod.rs

//! Supervision of the server process.
//!
//! [`ProcessSupervisor`] owns the child and runs four workers around it:
//! - two [`relay`]s, one per output stream, feeding the message sink and the
//!   [`readiness`] gate;
//! - the [`injector`], sole writer of the server's stdin;
//! - the [`exit_monitor`], which waits for the process and detects crashes.
//!
//! Every worker implements [`Worker`]; [`shutdown`] stops and joins them all
//! exactly once per session, and also hooks Ctrl-C / SIGTERM.

pub mod exit_monitor;
pub mod injector;
pub mod process_supervisor;
pub mod readiness;
pub mod relay;
pub mod shutdown;
pub mod worker;

pub use exit_monitor::{ExitHandle, ExitMonitor, ExitReport};
pub use injector::{spawn_injector, InjectorHandle, StopDivert};
pub use process_supervisor::{ProcessSupervisor, SupervisorOptions};
pub use readiness::{Markers, ReadinessGate};
pub use relay::spawn_relay;
pub use shutdown::{shutdown_all, ShutdownCoordinator};
pub use worker::{stop_signal, StopSignal, StopTrigger, TaskWorker, Worker};
