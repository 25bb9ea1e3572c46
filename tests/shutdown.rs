mod common;
use crate::common::{init_tracing, with_timeout};

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serverwrap::supervisor::{shutdown_all, stop_signal, ShutdownCoordinator, TaskWorker, Worker};

/// Records the order of stop and join calls across several workers.
#[derive(Default)]
struct CallLog {
    calls: Mutex<Vec<String>>,
    joins: AtomicUsize,
}

impl CallLog {
    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

struct FakeWorker {
    name: String,
    log: Arc<CallLog>,
    joined: bool,
}

impl FakeWorker {
    fn boxed(name: &str, log: &Arc<CallLog>) -> Box<dyn Worker> {
        Box::new(Self {
            name: name.to_string(),
            log: Arc::clone(log),
            joined: false,
        })
    }
}

impl Worker for FakeWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&self) {
        self.log.push(format!("stop {}", self.name));
    }

    fn join(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.log.push(format!("join {}", self.name));
            self.log.joins.fetch_add(1, Ordering::SeqCst);
            self.joined = true;
        })
    }

    fn is_finished(&self) -> bool {
        self.joined
    }
}

#[tokio::test]
async fn test_shutdown_all_stops_everyone_before_joining() {
    let log = Arc::new(CallLog::default());
    let mut workers = vec![
        FakeWorker::boxed("a", &log),
        FakeWorker::boxed("b", &log),
        FakeWorker::boxed("c", &log),
    ];

    with_timeout(shutdown_all(&mut workers)).await;

    assert_eq!(
        log.calls(),
        vec!["stop a", "stop b", "stop c", "join a", "join b", "join c"]
    );
    assert!(workers.iter().all(|w| w.is_finished()));
}

#[tokio::test]
async fn test_concurrent_shutdowns_join_each_worker_once() {
    init_tracing();
    let log = Arc::new(CallLog::default());
    let coordinator = Arc::new(ShutdownCoordinator::new());
    for name in ["stdout-relay", "stderr-relay", "command-injector", "exit-monitor"] {
        coordinator.register(FakeWorker::boxed(name, &log));
    }
    coordinator.seal();
    assert_eq!(coordinator.registered(), 4);

    let callers: Vec<_> = (0..10)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.shutdown().await })
        })
        .collect();
    for caller in callers {
        with_timeout(caller).await.unwrap();
    }

    assert!(coordinator.is_finished());
    assert_eq!(log.joins.load(Ordering::SeqCst), 4);

    // Later calls return at once.
    with_timeout(coordinator.shutdown()).await;
    assert_eq!(log.joins.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_shutdown_waits_for_seal() {
    let log = Arc::new(CallLog::default());
    let coordinator = Arc::new(ShutdownCoordinator::new());
    coordinator.register(FakeWorker::boxed("early", &log));

    let pending = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!coordinator.is_finished());

    coordinator.register(FakeWorker::boxed("late", &log));
    coordinator.seal();
    with_timeout(pending).await.unwrap();

    assert_eq!(log.joins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dropped_caller_does_not_abort_shutdown() {
    let log = Arc::new(CallLog::default());
    let coordinator = Arc::new(ShutdownCoordinator::new());
    coordinator.register(FakeWorker::boxed("only", &log));
    coordinator.seal();

    // Give up on the first call right away.
    let _ = tokio::time::timeout(Duration::from_millis(1), coordinator.shutdown()).await;

    with_timeout(coordinator.finished()).await;
    assert_eq!(log.calls(), vec!["stop only", "join only"]);
}

#[tokio::test]
async fn test_task_worker_stops_on_request() {
    let mut worker = TaskWorker::spawn("sleeper", |mut stop| async move {
        stop.stopped().await;
    });
    assert_eq!(worker.name(), "sleeper");
    assert!(!worker.is_finished());

    worker.stop();
    with_timeout(worker.join()).await;
    assert!(worker.is_finished());
}

#[tokio::test]
async fn test_stop_signal_fires_when_trigger_dropped() {
    let (trigger, mut signal) = stop_signal();
    let other = trigger.subscribe();
    assert!(!signal.is_stopped());

    drop(trigger);
    with_timeout(signal.stopped()).await;
    assert!(other.is_stopped());
}
