use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ChatGroup, ChatMessage, UserProfile};

/// Value of the `source` field on every event emitted by the chat core.
pub const EVENT_SOURCE: &str = "chat-service";

/// Current envelope version.
pub const EVENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatEventType {
    #[serde(rename = "chat.group_created")]
    GroupCreated,
    #[serde(rename = "chat.group_updated")]
    GroupUpdated,
    #[serde(rename = "chat.group_deleted")]
    GroupDeleted,
    #[serde(rename = "chat.member_added")]
    MemberAdded,
    #[serde(rename = "chat.member_removed")]
    MemberRemoved,
    #[serde(rename = "chat.message_created")]
    MessageCreated,
    #[serde(rename = "chat.message_updated")]
    MessageUpdated,
    #[serde(rename = "chat.message_deleted")]
    MessageDeleted,
    #[serde(rename = "chat.reaction_added")]
    ReactionAdded,
    #[serde(rename = "chat.reaction_removed")]
    ReactionRemoved,
    #[serde(rename = "chat.last_read_updated")]
    LastReadUpdated,
}

impl ChatEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GroupCreated => "chat.group_created",
            Self::GroupUpdated => "chat.group_updated",
            Self::GroupDeleted => "chat.group_deleted",
            Self::MemberAdded => "chat.member_added",
            Self::MemberRemoved => "chat.member_removed",
            Self::MessageCreated => "chat.message_created",
            Self::MessageUpdated => "chat.message_updated",
            Self::MessageDeleted => "chat.message_deleted",
            Self::ReactionAdded => "chat.reaction_added",
            Self::ReactionRemoved => "chat.reaction_removed",
            Self::LastReadUpdated => "chat.last_read_updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPayload {
    pub group_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message: ChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub message_id: String,
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionPayload {
    pub message_id: String,
    pub reaction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastReadPayload {
    pub group_id: String,
    pub message_id: String,
}

/// Typed payloads. Serialises to the bare payload object; the variant is
/// carried by the envelope's `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatEventPayload {
    GroupCreated(ChatGroup),
    GroupUpdated(ChatGroup),
    GroupDeleted(GroupRef),
    MemberAdded(MemberPayload),
    MemberRemoved(MemberPayload),
    MessageCreated(MessagePayload),
    MessageUpdated(MessagePayload),
    MessageDeleted(MessageRef),
    ReactionAdded(ReactionPayload),
    ReactionRemoved(ReactionPayload),
    LastReadUpdated(LastReadPayload),
}

impl ChatEventPayload {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::GroupCreated(_) => ChatEventType::GroupCreated,
            Self::GroupUpdated(_) => ChatEventType::GroupUpdated,
            Self::GroupDeleted(_) => ChatEventType::GroupDeleted,
            Self::MemberAdded(_) => ChatEventType::MemberAdded,
            Self::MemberRemoved(_) => ChatEventType::MemberRemoved,
            Self::MessageCreated(_) => ChatEventType::MessageCreated,
            Self::MessageUpdated(_) => ChatEventType::MessageUpdated,
            Self::MessageDeleted(_) => ChatEventType::MessageDeleted,
            Self::ReactionAdded(_) => ChatEventType::ReactionAdded,
            Self::ReactionRemoved(_) => ChatEventType::ReactionRemoved,
            Self::LastReadUpdated(_) => ChatEventType::LastReadUpdated,
        }
    }

    /// The group this payload concerns, when it names one directly.
    pub fn group_id(&self) -> Option<&str> {
        match self {
            Self::GroupCreated(g) | Self::GroupUpdated(g) => Some(&g.id),
            Self::GroupDeleted(r) => Some(&r.group_id),
            Self::MemberAdded(m) | Self::MemberRemoved(m) => Some(&m.group_id),
            Self::MessageCreated(m) | Self::MessageUpdated(m) => Some(&m.message.group_id),
            Self::MessageDeleted(r) => Some(&r.group_id),
            Self::LastReadUpdated(r) => Some(&r.group_id),
            Self::ReactionAdded(_) | Self::ReactionRemoved(_) => None,
        }
    }
}

/// Envelope published to every subscriber of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: ChatEventType,
    #[serde(rename = "tripID")]
    pub trip_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
    pub source: String,
    pub payload: Value,
}

impl ChatEvent {
    /// Build an envelope around a typed payload.
    pub fn new(
        id: impl Into<String>,
        trip_id: impl Into<String>,
        actor_id: impl Into<String>,
        payload: &ChatEventPayload,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            id: id.into(),
            event_type: payload.event_type(),
            trip_id: trip_id.into(),
            user_id: actor_id.into(),
            timestamp: Utc::now(),
            version: EVENT_VERSION,
            source: EVENT_SOURCE.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Decode the payload into one of the typed payload structs.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_uses_stable_field_names() {
        let payload = ChatEventPayload::MessageDeleted(MessageRef {
            message_id: "m1".into(),
            group_id: "g1".into(),
        });
        let event = ChatEvent::new("e1", "t1", "u1", &payload).unwrap();
        let wire = serde_json::to_value(&event).unwrap();

        assert_eq!(wire["type"], "chat.message_deleted");
        assert_eq!(wire["tripID"], "t1");
        assert_eq!(wire["userID"], "u1");
        assert_eq!(wire["version"], 1);
        assert_eq!(wire["source"], "chat-service");
        assert_eq!(wire["payload"], json!({ "message_id": "m1", "group_id": "g1" }));
    }

    #[test]
    fn member_payload_omits_missing_profile() {
        let payload = ChatEventPayload::MemberAdded(MemberPayload {
            group_id: "g1".into(),
            user_id: "u2".into(),
            user: None,
        });
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value, json!({ "group_id": "g1", "user_id": "u2" }));
    }

    #[test]
    fn payload_decodes_back_from_envelope() {
        let payload = ChatEventPayload::ReactionAdded(ReactionPayload {
            message_id: "m1".into(),
            reaction: "👍".into(),
        });
        let event = ChatEvent::new("e2", "t1", "u1", &payload).unwrap();
        let decoded: ReactionPayload = event.payload_as().unwrap();
        assert_eq!(decoded.reaction, "👍");
        assert_eq!(event.event_type.as_str(), "chat.reaction_added");
    }
}
