//! Broadcast channel boundary.
//!
//! The engine only needs `send` and a subscription delivering every other
//! participant's messages in send order. [`Room`] provides that in-process on
//! top of `tokio::sync::broadcast`; a network transport implements
//! [`BroadcastChannel`] and moves [`CollabMessage`]s as JSON.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reportdesk_types::{CursorPosition, Operation, PeerId};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::error::Result;

/// One message on a report's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollabMessage {
    pub sender: PeerId,
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Sender heartbeat timestamp
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Payload {
    /// A text edit plus the sender's resulting field value
    Edit { operation: Operation, value: String },
    Cursor {
        position: CursorPosition,
        #[serde(default)]
        field: Option<String>,
    },
    /// Heartbeat, optionally announcing the focused field
    Presence {
        #[serde(default)]
        selected_field: Option<String>,
    },
    Leave,
}

impl CollabMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

pub trait BroadcastChannel: Send + Sync {
    /// Fire-and-forget delivery to every subscriber.
    fn send(&self, message: CollabMessage) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<CollabMessage>;
}

/// Rooms keyed by report id.
#[derive(Default)]
pub struct Hub {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl Hub {
    pub async fn room(&self, report: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.read().await.get(report).cloned() {
            return room;
        }

        let mut guard = self.rooms.write().await;
        guard
            .entry(report.to_string())
            .or_insert_with(|| Arc::new(Room::new()))
            .clone()
    }
}

/// In-process channel for one report. Nothing is persisted: subscribers only
/// see messages sent after they subscribed, and a lagging subscriber skips
/// what it missed.
pub struct Room {
    tx: broadcast::Sender<CollabMessage>,
}

impl Room {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastChannel for Room {
    fn send(&self, message: CollabMessage) -> Result<()> {
        // no subscribers is not an error for a fire-and-forget channel
        let _ = self.tx.send(message);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CollabMessage> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(sender: &str, text: &str) -> CollabMessage {
        CollabMessage {
            sender: PeerId::new(sender),
            sender_name: None,
            sent_at: Some(DateTime::<Utc>::UNIX_EPOCH),
            payload: Payload::Edit {
                operation: Operation::insert("title", 0, text),
                value: text.to_string(),
            },
        }
    }

    #[test]
    fn test_wire_shape() {
        let msg = CollabMessage {
            sender: PeerId::new("alice"),
            sender_name: Some("Alice".into()),
            sent_at: None,
            payload: Payload::Presence {
                selected_field: Some("title".into()),
            },
        };
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(json["kind"], "presence");
        assert_eq!(json["selectedField"], "title");
        assert_eq!(json["senderName"], "Alice");
    }

    #[test]
    fn test_decode_edit() {
        let raw = r#"{
            "sender": "bob",
            "sentAt": "2026-01-01T00:00:00Z",
            "kind": "edit",
            "operation": {"field": "title", "position": 2, "deletedLength": 0,
                          "insertedText": "xyz", "origin": "local"},
            "value": "abxyz"
        }"#;
        let msg = CollabMessage::from_json(raw).unwrap();

        assert_eq!(msg.sender, PeerId::new("bob"));
        match msg.payload {
            Payload::Edit { operation, value } => {
                assert_eq!(operation.position, 2);
                assert_eq!(value, "abxyz");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(CollabMessage::from_json("{\"kind\":\"edit\"}").is_err());
    }

    #[tokio::test]
    async fn test_room_delivers_in_send_order() {
        let hub = Hub::default();
        let room = hub.room("report-1").await;
        let mut rx = room.subscribe();

        room.send(edit("alice", "a")).unwrap();
        room.send(edit("alice", "b")).unwrap();

        assert_eq!(rx.recv().await.unwrap(), edit("alice", "a"));
        assert_eq!(rx.recv().await.unwrap(), edit("alice", "b"));
    }

    #[tokio::test]
    async fn test_hub_reuses_rooms() {
        let hub = Hub::default();
        let a = hub.room("report-1").await;
        let _rx = a.subscribe();
        let b = hub.room("report-1").await;

        assert_eq!(b.subscriber_count(), 1);
        assert_eq!(hub.room("report-2").await.subscriber_count(), 0);
    }

    #[test]
    fn test_send_without_subscribers_is_ok() {
        let room = Room::new();
        assert!(room.send(edit("alice", "a")).is_ok());
    }
}
