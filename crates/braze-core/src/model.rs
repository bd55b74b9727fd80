//! Built-in payload and metadata model.
//!
//! These are the typed bodies the default ingestion pipeline produces,
//! distilled to the fields the runtime actually reads. The wire schemas of
//! the remote service stay in the source collaborator; the core only sees
//! the already-parsed records below.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::envelope::{EventKind, EventName, Payload, TypedPayload};

/// Where a message was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverKind {
    /// A one-on-one conversation.
    Private,
    /// A group conversation.
    Group,
}

impl ReceiverKind {
    /// Maps the remote service's numeric receiver type.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ReceiverKind::Private),
            2 => Some(ReceiverKind::Group),
            _ => None,
        }
    }
}

/// An incoming chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender_uid: i64,
    pub receiver_id: i64,
    pub receiver_type: i64,
    pub msg_key: i64,
    pub msg_seqno: u64,
    /// 1 = text, 2 = image.
    pub msg_type: i64,
    pub timestamp: i64,
    #[serde(default)]
    pub at_uids: Vec<i64>,
    pub content: serde_json::Value,
}

impl Message {
    /// Builds a plain private text message, mostly useful in tests.
    pub fn text(sender_uid: i64, receiver_id: i64, text: &str) -> Self {
        Self {
            sender_uid,
            receiver_id,
            receiver_type: 1,
            msg_key: 0,
            msg_seqno: 0,
            msg_type: 1,
            timestamp: 0,
            at_uids: Vec::new(),
            content: serde_json::json!({ "content": text }),
        }
    }

    /// The textual content of a text message, `None` for other kinds.
    pub fn plain_text(&self) -> Option<&str> {
        if self.msg_type == 1 {
            self.content.get("content").and_then(|v| v.as_str())
        } else {
            None
        }
    }

    /// The receiver kind, when the numeric code is recognized.
    pub fn receiver_kind(&self) -> Option<ReceiverKind> {
        ReceiverKind::from_code(self.receiver_type)
    }
}

impl Payload for Message {
    fn event_name(&self) -> EventName {
        EventKind::Message.into()
    }

    fn sender_id(&self) -> Option<i64> {
        Some(self.sender_uid)
    }

    fn receiver(&self) -> Option<(ReceiverKind, i64)> {
        self.receiver_kind().map(|kind| (kind, self.receiver_id))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TypedPayload for Message {
    const NAME: &'static str = "Message";
}

/// A recall notice for a previously delivered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecall {
    pub sender_uid: i64,
    pub receiver_id: i64,
    pub receiver_type: i64,
    pub msg_key: i64,
    pub msg_seqno: u64,
    pub timestamp: i64,
}

impl Payload for MessageRecall {
    fn event_name(&self) -> EventName {
        EventKind::MessageRecall.into()
    }

    fn sender_id(&self) -> Option<i64> {
        Some(self.sender_uid)
    }

    fn receiver(&self) -> Option<(ReceiverKind, i64)> {
        ReceiverKind::from_code(self.receiver_type).map(|kind| (kind, self.receiver_id))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TypedPayload for MessageRecall {
    const NAME: &'static str = "MessageRecall";
}

/// An acknowledgment record for a message sent by the bot itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotMessage {
    pub msg_key: i64,
    #[serde(default)]
    pub msg_content: Option<String>,
}

impl Payload for BotMessage {
    fn event_name(&self) -> EventName {
        EventKind::BotMessage.into()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TypedPayload for BotMessage {
    const NAME: &'static str = "BotMessage";
}

/// Cached metadata for a user, resolved by the source collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: i64,
    pub uname: String,
    #[serde(default)]
    pub face: String,
}

/// Cached metadata for a group, resolved by the source collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupProfile {
    pub group_id: i64,
    pub group_name: String,
    #[serde(default)]
    pub owner_uid: i64,
}

/// A read-mostly cache of resolved metadata keyed by numeric id.
///
/// Populated by the ingestion loop before an event is published, read by
/// extractors during handler execution.
pub struct ProfileCache<T> {
    entries: RwLock<HashMap<i64, Arc<T>>>,
}

impl<T> ProfileCache<T> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Looks up a cached profile.
    pub fn get(&self, id: i64) -> Option<Arc<T>> {
        self.entries.read().get(&id).cloned()
    }

    /// Returns whether an entry exists for `id`.
    pub fn contains(&self, id: i64) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Inserts or replaces the profile for `id`.
    pub fn insert(&self, id: i64, profile: T) {
        self.entries.write().insert(id, Arc::new(profile));
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T> Default for ProfileCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_parses_from_wire_shape() {
        let raw = serde_json::json!({
            "sender_uid": 42,
            "receiver_id": 7,
            "receiver_type": 2,
            "msg_key": 9000,
            "msg_seqno": 12,
            "msg_type": 1,
            "timestamp": 1700000000,
            "at_uids": [],
            "content": { "content": "hello" }
        });
        let msg: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.plain_text(), Some("hello"));
        assert_eq!(msg.receiver(), Some((ReceiverKind::Group, 7)));
    }

    #[test]
    fn image_message_has_no_plain_text() {
        let mut msg = Message::text(1, 2, "x");
        msg.msg_type = 2;
        assert_eq!(msg.plain_text(), None);
    }

    #[test]
    fn profile_cache_round_trip() {
        let cache = ProfileCache::new();
        assert!(!cache.contains(1));
        cache.insert(
            1,
            UserProfile {
                uid: 1,
                uname: "ada".into(),
                face: String::new(),
            },
        );
        assert_eq!(cache.get(1).unwrap().uname, "ada");
        assert_eq!(cache.len(), 1);
    }
}
