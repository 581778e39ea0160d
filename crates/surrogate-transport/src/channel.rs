//! Broadcast channel seam

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use surrogate_core::SurrogateResult;

/// Inbound message stream for one event
pub type MessageReceiver = mpsc::UnboundedReceiver<Value>;

/// Best-effort broadcast primitive.
///
/// Delivery is not guaranteed, not acknowledged and not ordered across
/// senders. A sender receives its own messages, so handlers must filter on
/// the recipient/target fields themselves.
pub trait BroadcastChannel: Send + Sync {
    /// Fire-and-forget; never waits on the network
    fn emit(&self, event: &str, message: Value) -> SurrogateResult<()>;

    /// Receive every message emitted on `event` from now on
    fn subscribe(&self, event: &str) -> MessageReceiver;
}

/// Per-event subscriber lists
#[derive(Default)]
pub struct Subscribers {
    by_event: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Subscribers::default()
    }

    pub fn add(&self, event: &str) -> MessageReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.by_event
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Live senders for `event`; closed ones are pruned
    pub fn senders(&self, event: &str) -> Vec<mpsc::UnboundedSender<Value>> {
        let mut by_event = self.by_event.lock();
        match by_event.get_mut(event) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.clone()
            }
            None => Vec::new(),
        }
    }

    /// Deliver one copy to every live subscriber; returns the number reached
    pub fn deliver(&self, event: &str, message: &Value) -> usize {
        self.senders(event)
            .into_iter()
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count()
    }

    pub fn count(&self, event: &str) -> usize {
        self.senders(event).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deliver_to_event_subscribers_only() {
        let subscribers = Subscribers::new();
        let mut a = subscribers.add("e1");
        let mut b = subscribers.add("e2");

        assert_eq!(subscribers.deliver("e1", &json!({"n": 1})), 1);
        assert_eq!(a.try_recv().unwrap(), json!({"n": 1}));
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let subscribers = Subscribers::new();
        let rx = subscribers.add("e1");
        let _keep = subscribers.add("e1");
        assert_eq!(subscribers.count("e1"), 2);

        drop(rx);
        assert_eq!(subscribers.count("e1"), 1);
        assert_eq!(subscribers.deliver("e1", &json!(null)), 1);
    }
}
