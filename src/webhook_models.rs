use crate::models::{ChatMessage, ChatRole, Lead};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lead intake event - can be single object or array
///
/// The chat widget backend posts one event per lead creation or update;
/// replays may arrive batched.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Single(LeadEvent),
    Batch(Vec<LeadEvent>),
}

impl WebhookPayload {
    /// Convert to a vec of events for uniform processing
    pub fn into_events(self) -> Vec<LeadEvent> {
        match self {
            WebhookPayload::Single(event) => vec![event],
            WebhookPayload::Batch(events) => events,
        }
    }
}

/// Individual lead event from the intake flow
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LeadEvent {
    /// Lead ID
    pub id: uuid::Uuid,

    /// Hook action type (e.g., "lead.created", "lead.updated")
    #[serde(default)]
    pub hook_action: Option<String>,

    /// Event attributes
    pub attributes: LeadEventAttributes,

    /// Raw data for any additional fields
    #[serde(flatten)]
    pub raw: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LeadEventAttributes {
    /// When the lead was last updated; idempotency key together with the
    /// lead id.
    pub updated_at: Option<String>,

    /// The lead record, when the sender inlines it. Absent means the lead
    /// is loaded from the database.
    #[serde(default)]
    pub lead: Option<Lead>,

    /// Transcript snapshot, when the sender inlines it.
    #[serde(default)]
    pub messages: Vec<EventMessage>,

    /// Raw attributes for any additional fields
    #[serde(flatten)]
    pub raw: Value,
}

/// One transcript message as sent by the intake flow.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventMessage {
    pub role: Option<String>,
    pub content: Option<String>,
    pub created_at: Option<String>,

    /// Raw message data
    #[serde(flatten)]
    pub raw: Value,
}

impl EventMessage {
    /// Convert to the scorer's message model. Unknown roles score as
    /// neither user nor assistant; unparseable timestamps are dropped.
    pub fn to_chat_message(&self) -> ChatMessage {
        let role = match self.role.as_deref() {
            Some("user") => ChatRole::User,
            Some("assistant") => ChatRole::Assistant,
            _ => ChatRole::Other,
        };
        let timestamp = self
            .created_at
            .as_deref()
            .and_then(|ts| crate::webhook_handler::parse_timestamp(ts).ok());
        ChatMessage {
            role,
            content: self.content.clone().unwrap_or_default(),
            timestamp,
        }
    }
}

/// Response sent back to the intake flow
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: String,
    pub received: usize,
    pub processed: usize,
    pub duplicates: usize,
}

/// Idempotency key for lead events
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct IdempotencyKey {
    pub lead_id: uuid::Uuid,
    pub updated_at: String,
}

impl IdempotencyKey {
    pub fn new(lead_id: uuid::Uuid, updated_at: String) -> Self {
        Self {
            lead_id,
            updated_at,
        }
    }

    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.lead_id, self.updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_event() {
        let json = r#"
        {
            "id": "7f1f9bb4-7e7e-4b0a-9f3e-1f8f4cf1a2b3",
            "hook_action": "lead.created",
            "attributes": {
                "updated_at": "2025-01-01T00:00:00Z",
                "lead": {
                    "kunde_id": "werkstatt-muenchen",
                    "anliegen": "Bremsen quietschen"
                }
            }
        }
        "#;

        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        match payload {
            WebhookPayload::Single(event) => {
                assert_eq!(event.hook_action, Some("lead.created".to_string()));
                let lead = event.attributes.lead.unwrap();
                assert_eq!(lead.kunde_id.as_deref(), Some("werkstatt-muenchen"));
            }
            _ => panic!("Expected single event"),
        }
    }

    #[test]
    fn test_parse_batch_events() {
        let json = r#"
        [
            {
                "id": "7f1f9bb4-7e7e-4b0a-9f3e-1f8f4cf1a2b3",
                "attributes": {"updated_at": "2025-01-01T00:00:00Z"}
            },
            {
                "id": "5d0f7aa2-11aa-4c4c-8d8d-2e9e5df2b3c4",
                "attributes": {"updated_at": "2025-01-01T00:01:00Z"}
            }
        ]
        "#;

        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        match payload {
            WebhookPayload::Batch(events) => {
                assert_eq!(events.len(), 2);
            }
            _ => panic!("Expected batch events"),
        }
    }

    #[test]
    fn test_event_message_conversion() {
        let msg = EventMessage {
            role: Some("user".to_string()),
            content: Some("Was kostet eine Inspektion?".to_string()),
            created_at: Some("2025-01-01T10:00:00Z".to_string()),
            raw: serde_json::json!({}),
        };

        let chat = msg.to_chat_message();
        assert_eq!(chat.role, ChatRole::User);
        assert!(chat.timestamp.is_some());

        let unknown = EventMessage {
            role: Some("system".to_string()),
            content: None,
            created_at: Some("not a timestamp".to_string()),
            raw: serde_json::json!({}),
        };
        let chat = unknown.to_chat_message();
        assert_eq!(chat.role, ChatRole::Other);
        assert!(chat.timestamp.is_none());
        assert!(chat.content.is_empty());
    }
}
