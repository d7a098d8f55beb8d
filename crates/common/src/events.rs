//! Events pushed to connected users

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::UserId;

/// Event delivered to a user over the live channel
///
/// Serializes as `{"type": "MATCH_FOUND", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchEvent {
    /// A partner was found and the shared workspace is ready
    MatchFound(MatchFoundPayload),
}

/// Payload of a `MATCH_FOUND` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFoundPayload {
    pub match_id: Uuid,
    pub users: [UserId; 2],
    pub collaboration_url: String,
}

impl MatchEvent {
    /// Build a `MATCH_FOUND` event
    pub fn match_found(
        match_id: Uuid,
        user1: UserId,
        user2: UserId,
        collaboration_url: impl Into<String>,
    ) -> Self {
        MatchEvent::MatchFound(MatchFoundPayload {
            match_id,
            users: [user1, user2],
            collaboration_url: collaboration_url.into(),
        })
    }

    /// Wire name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            MatchEvent::MatchFound(_) => "MATCH_FOUND",
        }
    }

    /// Match id carried by the event
    pub fn match_id(&self) -> Uuid {
        match self {
            MatchEvent::MatchFound(payload) => payload.match_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_found_wire_shape() {
        let id = Uuid::nil();
        let event = MatchEvent::match_found(id, "user1".into(), "user2".into(), "/room/collab123");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "MATCH_FOUND");
        assert_eq!(value["payload"]["matchId"], id.to_string());
        assert_eq!(value["payload"]["users"][0], "user1");
        assert_eq!(value["payload"]["users"][1], "user2");
        assert_eq!(value["payload"]["collaborationUrl"], "/room/collab123");
        assert_eq!(event.event_type(), "MATCH_FOUND");
    }
}
