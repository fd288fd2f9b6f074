// src/services/notifier.rs
//
// Best-effort, at-most-once notification fan-out over websocket connections.
// No queuing, no retry: a message to a disconnected user is silently dropped.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Payload delivered to connected clients.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub data: Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Notification {
    pub fn new(kind: &str, message: &str, data: Value) -> Self {
        Self {
            kind: kind.to_owned(),
            message: message.to_owned(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Live registry of connected recipients keyed by user id, plus each user's
/// most-recently-set subscription topic (last subscribe wins, at most one
/// topic per user). Both maps are guarded by std Mutexes that are never held
/// across an await.
#[derive(Default)]
pub struct Notifier {
    clients: Mutex<HashMap<i64, UnboundedSender<String>>>,
    subscriptions: Mutex<HashMap<i64, String>>,
}

impl Notifier {
    /// Registers a connection and hands back the receiving half the socket
    /// task forwards from. A reconnect replaces the previous sender.
    pub fn register(&self, user_id: i64) -> UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.lock().unwrap().insert(user_id, tx);
        rx
    }

    /// Disconnection removes both the registry entry and the subscription.
    pub fn unregister(&self, user_id: i64) {
        self.clients.lock().unwrap().remove(&user_id);
        self.subscriptions.lock().unwrap().remove(&user_id);
    }

    pub fn subscribe(&self, user_id: i64, topic: &str) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(user_id, topic.to_owned());
    }

    pub fn connected_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// Delivers only if the user currently has an open connection.
    /// Fire-and-forget: send errors are ignored.
    pub fn notify_user(&self, user_id: i64, notification: &Notification) {
        let Ok(payload) = serde_json::to_string(notification) else {
            return;
        };
        if let Some(tx) = self.clients.lock().unwrap().get(&user_id) {
            let _ = tx.send(payload);
        }
    }

    /// Delivers to every connected user whose current subscription topic
    /// equals `topic`.
    pub fn notify_subscribers(&self, topic: &str, notification: &Notification) {
        let Ok(payload) = serde_json::to_string(notification) else {
            return;
        };
        let subscriptions = self.subscriptions.lock().unwrap();
        let clients = self.clients.lock().unwrap();
        for (user_id, user_topic) in subscriptions.iter() {
            if user_topic == topic {
                if let Some(tx) = clients.get(user_id) {
                    let _ = tx.send(payload.clone());
                }
            }
        }
    }

    pub fn notify_all(&self, notification: &Notification) {
        let Ok(payload) = serde_json::to_string(notification) else {
            return;
        };
        for tx in self.clients.lock().unwrap().values() {
            let _ = tx.send(payload.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn notify_user_delivers_to_connected_user() {
        let notifier = Notifier::default();
        let mut rx = notifier.register(7);

        notifier.notify_user(7, &Notification::new("test", "hello", json!({})));

        let payload = rx.recv().await.unwrap();
        assert!(payload.contains("\"hello\""));
    }

    #[test]
    fn notify_user_to_disconnected_user_is_silently_dropped() {
        let notifier = Notifier::default();
        // No registration at all: must not panic, error or record anything.
        notifier.notify_user(42, &Notification::new("test", "dropped", json!({})));
        assert_eq!(notifier.connected_count(), 0);
    }

    #[tokio::test]
    async fn last_subscribe_wins() {
        let notifier = Notifier::default();
        let mut rx = notifier.register(1);

        notifier.subscribe(1, "questions/math/algebra");
        notifier.subscribe(1, "questions/math/calculus");

        notifier.notify_subscribers(
            "questions/math/algebra",
            &Notification::new("new_question", "old topic", json!({})),
        );
        notifier.notify_subscribers(
            "questions/math/calculus",
            &Notification::new("new_question", "current topic", json!({})),
        );

        let payload = rx.recv().await.unwrap();
        assert!(payload.contains("current topic"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_removes_subscription() {
        let notifier = Notifier::default();
        let mut rx = notifier.register(1);
        notifier.subscribe(1, "grades");
        notifier.unregister(1);

        notifier.notify_subscribers("grades", &Notification::new("n", "m", json!({})));
        assert!(rx.recv().await.is_none());
    }
}
