//! Topic-scoped subscription broker.
//!
//! Each topic owns its own subscriber set behind its own mutex, so connects, disconnects and
//! broadcasts on different topics never contend on a shared set. The outer map is locked only
//! to look up, create or drop a topic entry. Fan-out pushes into unbounded per-connection
//! queues while the topic mutex is held: each subscriber sees broadcasts in invocation order,
//! and once `disconnect` returns no later broadcast reaches that connection.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Sending half of one connection's outbound queue.
#[derive(Clone, Debug)]
pub struct Subscriber {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
}

impl Subscriber {
    /// New subscriber with a fresh id, plus the receiver the connection drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Subscriber {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

/// `None` once the last subscriber left; a retired topic is replaced, never reused.
struct Topic {
    subscribers: Mutex<Option<HashMap<ConnectionId, Subscriber>>>,
}

impl Topic {
    fn new() -> Arc<Self> {
        Arc::new(Topic {
            subscribers: Mutex::new(Some(HashMap::new())),
        })
    }
}

#[derive(Default)]
pub struct Broker {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
}

impl Broker {
    pub fn new() -> Self {
        Broker::default()
    }

    fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.read().get(name).cloned()
    }

    fn topic_or_insert(&self, name: &str) -> Arc<Topic> {
        if let Some(t) = self.topic(name) {
            return t;
        }
        self.topics
            .write()
            .entry(name.to_string())
            .or_insert_with(Topic::new)
            .clone()
    }

    /// Swap out a retired topic entry, unless someone already did.
    fn replace_retired(&self, name: &str, retired: &Arc<Topic>) {
        let mut topics = self.topics.write();
        if topics.get(name).map(|t| Arc::ptr_eq(t, retired)).unwrap_or(false) {
            topics.insert(name.to_string(), Topic::new());
        }
    }

    /// Register `subscriber` under `topic`, creating the topic on first use.
    pub fn connect(&self, topic: &str, subscriber: Subscriber) {
        loop {
            let slot = self.topic_or_insert(topic);
            let mut guard = slot.subscribers.lock();
            match guard.as_mut() {
                Some(set) => {
                    tracing::debug!(topic = %topic, connection = %subscriber.id, "connect");
                    set.insert(subscriber.id, subscriber);
                    return;
                }
                None => {
                    drop(guard);
                    self.replace_retired(topic, &slot);
                }
            }
        }
    }

    /// Remove the connection; drops the topic when it was the last one. Returns whether it was registered.
    pub fn disconnect(&self, topic: &str, id: ConnectionId) -> bool {
        let Some(slot) = self.topic(topic) else {
            return false;
        };
        let mut guard = slot.subscribers.lock();
        let Some(set) = guard.as_mut() else {
            return false;
        };
        let removed = set.remove(&id).is_some();
        if set.is_empty() {
            *guard = None;
            drop(guard);
            let mut topics = self.topics.write();
            if topics.get(topic).map(|t| Arc::ptr_eq(t, &slot)).unwrap_or(false) {
                topics.remove(topic);
            }
            tracing::debug!(topic = %topic, "topic dropped");
        }
        removed
    }

    /// Deliver to every subscriber of `topic`. Returns the number of queues that accepted it.
    pub fn broadcast(&self, topic: &str, message: &str) -> usize {
        self.fan_out(topic, None, message)
    }

    /// Deliver to every subscriber of `topic` except `sender`.
    pub fn broadcast_from(&self, topic: &str, sender: ConnectionId, message: &str) -> usize {
        self.fan_out(topic, Some(sender), message)
    }

    fn fan_out(&self, topic: &str, except: Option<ConnectionId>, message: &str) -> usize {
        let Some(slot) = self.topic(topic) else {
            return 0;
        };
        let guard = slot.subscribers.lock();
        let Some(set) = guard.as_ref() else {
            return 0;
        };
        let mut delivered = 0;
        for (id, sub) in set {
            if except == Some(*id) {
                continue;
            }
            // Receiver gone means the connection is tearing down; its disconnect is on the way.
            match sub.tx.send(message.to_string()) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::debug!(topic = %topic, connection = %id, "dropped message for closed connection"),
            }
        }
        delivered
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topic(topic)
            .map(|t| t.subscribers.lock().as_ref().map(HashMap::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

/// Published on the entity's route topic after a successful write.
#[derive(Clone, Debug, Serialize)]
pub struct ChangeEvent<'a> {
    pub event: ChangeAction,
    pub entity: &'a str,
    pub id: &'a Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_only_its_topic() {
        let broker = Broker::new();
        let (a, mut rx_a) = Subscriber::channel();
        let (b, mut rx_b) = Subscriber::channel();
        broker.connect("A", a);
        broker.connect("B", b);
        assert_eq!(broker.broadcast("A", "hi"), 1);
        assert_eq!(rx_a.try_recv().unwrap(), "hi");
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn broadcast_from_skips_sender() {
        let broker = Broker::new();
        let (a, mut rx_a) = Subscriber::channel();
        let (b, mut rx_b) = Subscriber::channel();
        let a_id = a.id();
        broker.connect("room1", a);
        broker.connect("room1", b);
        assert_eq!(broker.broadcast_from("room1", a_id, "room1: hello"), 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), "room1: hello");
    }

    #[test]
    fn last_disconnect_drops_topic() {
        let broker = Broker::new();
        let (a, _rx_a) = Subscriber::channel();
        let (b, _rx_b) = Subscriber::channel();
        let (a_id, b_id) = (a.id(), b.id());
        broker.connect("t", a);
        broker.connect("t", b);
        assert_eq!(broker.subscriber_count("t"), 2);
        assert!(broker.disconnect("t", a_id));
        assert_eq!(broker.topic_count(), 1);
        assert!(broker.disconnect("t", b_id));
        assert_eq!(broker.topic_count(), 0);
        assert!(!broker.disconnect("t", b_id));
        assert_eq!(broker.broadcast("t", "late"), 0);
    }

    #[test]
    fn reconnect_after_topic_dropped() {
        let broker = Broker::new();
        let (a, _rx) = Subscriber::channel();
        let a_id = a.id();
        broker.connect("t", a);
        broker.disconnect("t", a_id);
        let (b, mut rx_b) = Subscriber::channel();
        broker.connect("t", b);
        assert_eq!(broker.broadcast("t", "again"), 1);
        assert_eq!(rx_b.try_recv().unwrap(), "again");
    }

    #[test]
    fn closed_receiver_does_not_block_others() {
        let broker = Broker::new();
        let (a, rx_a) = Subscriber::channel();
        let (b, mut rx_b) = Subscriber::channel();
        broker.connect("t", a);
        broker.connect("t", b);
        drop(rx_a);
        assert_eq!(broker.broadcast("t", "x"), 1);
        assert_eq!(rx_b.try_recv().unwrap(), "x");
    }

    #[test]
    fn per_subscriber_order_follows_broadcast_order() {
        let broker = Broker::new();
        let (a, mut rx) = Subscriber::channel();
        broker.connect("t", a);
        for i in 0..50 {
            broker.broadcast("t", &i.to_string());
        }
        let got: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let want: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(got, want);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_churn_leaves_no_topics() {
        let broker = Arc::new(Broker::new());
        let mut tasks = Vec::new();
        for t in 0..8 {
            let broker = broker.clone();
            tasks.push(tokio::spawn(async move {
                let topic = format!("topic-{}", t % 3);
                for _ in 0..200 {
                    let (s, _rx) = Subscriber::channel();
                    let id = s.id();
                    broker.connect(&topic, s);
                    broker.broadcast(&topic, "ping");
                    assert!(broker.disconnect(&topic, id));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(broker.topic_count(), 0);
    }
}
