use std::sync::{Arc, Mutex, MutexGuard};

use serverwrap::sink::MessageSink;
use serverwrap::types::{Message, MessageSource};
use tokio::sync::watch;

/// A sink that records every message and lets tests wait for specific ones.
pub struct RecordingSink {
    messages: Mutex<Vec<Message>>,
    received: watch::Sender<usize>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        let (received, _) = watch::channel(0);
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
            received,
        })
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().clone()
    }

    /// Texts of all messages from `source`, in arrival order.
    pub fn texts(&self, source: MessageSource) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|m| m.source == source)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Whether any message from `source` contains `needle`.
    pub fn contains(&self, source: MessageSource, needle: &str) -> bool {
        self.lock()
            .iter()
            .any(|m| m.source == source && m.text.contains(needle))
    }

    /// Wait until a message matching `pred` has been recorded and return it.
    pub async fn wait_for<F>(&self, pred: F) -> Message
    where
        F: Fn(&Message) -> bool,
    {
        let mut rx = self.received.subscribe();
        loop {
            if let Some(found) = self.lock().iter().find(|m| pred(m)).cloned() {
                return found;
            }
            rx.changed()
                .await
                .expect("recording sink outlives its own subscriptions");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap()
    }
}

impl MessageSink for RecordingSink {
    fn receive(&self, message: &Message) {
        self.lock().push(message.clone());
        self.received.send_modify(|n| *n += 1);
    }
}
