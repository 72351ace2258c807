//! Transient user-visible notifications.
//!
//! Managers report outcomes here instead of returning display text. Any
//! number of listeners (the WebSocket feed, tests) can subscribe; sending with
//! nobody listening is fine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub severity: Severity,
    pub at: DateTime<Utc>,
}

/// Cloneable handle that fans notifications out to subscribers.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn success(&self, title: impl Into<String>, description: Option<String>) {
        self.publish(title.into(), description, Severity::Success);
    }

    pub fn failure(&self, title: impl Into<String>, error: &impl std::fmt::Display) {
        self.publish(title.into(), Some(error.to_string()), Severity::Destructive);
    }

    fn publish(&self, title: String, description: Option<String>, severity: Severity) {
        debug!(title = %title, severity = ?severity, "Notification");
        let _ = self.tx.send(Notification {
            title,
            description,
            severity,
            at: Utc::now(),
        });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
