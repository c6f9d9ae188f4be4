//! SSE mailbox registries (spec §3.7, §4.5.5): a global registry plus one
//! per namespace, each holding bounded per-connection mailboxes. Publish is
//! a non-blocking send; a full mailbox drops the message and logs a warning
//! rather than ever blocking the publisher.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;

/// Per-connection mailbox capacity (spec §5).
const MAILBOX_CAPACITY: usize = 100;
/// Idle heartbeat interval (spec §4.5.5).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

pub type Mailbox = mpsc::Sender<String>;

struct Subscription {
    id: u64,
    sender: Mailbox,
}

#[derive(Default)]
struct RegistryInner {
    global: Vec<Subscription>,
    by_namespace: HashMap<String, Vec<Subscription>>,
    next_id: u64,
}

/// Holds every live SSE subscriber. One instance is shared across the
/// process via `AppState`.
#[derive(Clone, Default)]
pub struct SseRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

/// Handle returned to a subscriber; dropping it (or calling `unsubscribe`)
/// removes the mailbox from the registry.
pub struct SseHandle {
    registry: SseRegistry,
    id: u64,
    namespace: Option<String>,
    pub receiver: mpsc::Receiver<String>,
}

impl SseRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a new connection to the global stream, or to `namespace`'s
    /// stream when given.
    pub fn subscribe(&self, namespace: Option<&str>) -> SseHandle {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let mut inner = self.inner.write().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        let subscription = Subscription { id, sender: tx };
        match namespace {
            Some(ns) => {
                inner.by_namespace.entry(ns.to_owned()).or_default().push(subscription);
            }
            None => inner.global.push(subscription),
        }
        SseHandle {
            registry: self.clone(),
            id,
            namespace: namespace.map(str::to_owned),
            receiver: rx,
        }
    }

    fn unsubscribe(&self, id: u64, namespace: Option<&str>) {
        let mut inner = self.inner.write().unwrap();
        match namespace {
            Some(ns) => {
                if let Some(subs) = inner.by_namespace.get_mut(ns) {
                    subs.retain(|s| s.id != id);
                    if subs.is_empty() {
                        inner.by_namespace.remove(ns);
                    }
                }
            }
            None => inner.global.retain(|s| s.id != id),
        }
    }

    /// Publishes `message` to every subscriber of `namespace`, and also to
    /// global subscribers (namespace traffic fans out to the global
    /// stream, spec §4.5.5). Publishing with `namespace = None` reaches
    /// only global subscribers.
    pub fn publish(&self, namespace: Option<&str>, message: &str) {
        let inner = self.inner.read().unwrap();
        if let Some(ns) = namespace {
            if let Some(subs) = inner.by_namespace.get(ns) {
                for sub in subs {
                    send_best_effort(&sub.sender, message);
                }
            }
        }
        for sub in &inner.global {
            send_best_effort(&sub.sender, message);
        }
    }
}

impl Drop for SseHandle {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.id, self.namespace.as_deref());
    }
}

fn send_best_effort(sender: &Mailbox, message: &str) {
    if sender.try_send(message.to_owned()).is_err() {
        tracing::warn!("sse mailbox full or closed, dropping message");
    }
}

/// Formats a single SSE `data:` event.
#[must_use]
pub fn data_event(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

/// The initial comment sent on stream open (spec §4.5.5).
pub const CONNECTED_COMMENT: &str = ": connected\n\n";
/// The idle heartbeat comment.
pub const HEARTBEAT_COMMENT: &str = ": heartbeat\n\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_namespace_subscriber() {
        let registry = SseRegistry::new();
        let mut handle = registry.subscribe(Some("weather"));
        registry.publish(Some("weather"), "hello");
        let received = handle.receiver.recv().await.unwrap();
        assert_eq!(received, "hello");
    }

    #[tokio::test]
    async fn namespace_publish_fans_out_to_global() {
        let registry = SseRegistry::new();
        let mut global = registry.subscribe(None);
        registry.publish(Some("weather"), "hello");
        let received = global.receiver.recv().await.unwrap();
        assert_eq!(received, "hello");
    }

    #[tokio::test]
    async fn unsubscribe_on_drop_stops_delivery() {
        let registry = SseRegistry::new();
        {
            let _handle = registry.subscribe(Some("weather"));
        }
        registry.publish(Some("weather"), "hello");
    }
}
