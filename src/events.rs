// Event types and payload structures for real-time mailbox updates
// These are broadcast via WebSocket to connected clients

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// Event name constants
pub const EVENT_MAILBOX_FILLED: &str = "mailbox:filled";
pub const EVENT_MAILBOX_RESET: &str = "mailbox:reset";
pub const EVENT_MAILBOX_TAKEN: &str = "mailbox:taken";

/// Payload for mailbox filled events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxFilledPayload {
    pub job_id: Option<String>,
    /// True when an unread uncorrelated entry was replaced by this one
    pub overwrote_unread: bool,
    pub received_at: String,
}

/// Payload for mailbox reset events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxResetPayload {
    pub cleared_entries: usize,
}

/// Payload for mailbox taken (consumed) events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxTakenPayload {
    pub job_id: String,
}

/// An event that can be broadcast to WebSocket clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    /// Event type (e.g., "mailbox:filled")
    pub event: String,
    /// Event payload as JSON value
    pub payload: serde_json::Value,
}

/// Broadcasts events to all subscribers
pub struct EventBroadcaster {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBroadcaster {
    /// Create a new event broadcaster with a channel capacity of 256 events
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast(&self, event_type: &str, payload: impl Serialize) {
        let event = ServerEvent {
            event: event_type.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        };

        // Ignore send errors (no receivers)
        let _ = self.tx.send(event);
    }

    /// Subscribe to events (returns a receiver)
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscriber() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.broadcast(
            EVENT_MAILBOX_RESET,
            MailboxResetPayload { cleared_entries: 2 },
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "mailbox:reset");
        assert_eq!(event.payload["clearedEntries"], 2);
    }

    #[test]
    fn test_broadcast_without_subscribers_is_ignored() {
        let broadcaster = EventBroadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);
        broadcaster.broadcast(EVENT_MAILBOX_FILLED, serde_json::json!({"jobId": null}));
    }

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent {
            event: EVENT_MAILBOX_FILLED.to_string(),
            payload: serde_json::json!({
                "jobId": "job-123",
                "overwroteUnread": false
            }),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("mailbox:filled"));
        assert!(json.contains("job-123"));
    }
}
