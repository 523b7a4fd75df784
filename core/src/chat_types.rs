/// Shared types for the conversation sync layer
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery lifecycle of a message as seen by the local client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Optimistic local entry, remote insert not yet acknowledged
    Pending,
    /// Acknowledged by the remote store (has a real id)
    Confirmed,
    /// Remote insert errored; entry stays visible so the UI can show it
    Failed,
}

/// One chat message in a conversation's visible log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier assigned by the remote store; None until acknowledged
    pub id: Option<String>,

    /// Locally generated identifier, set at optimistic-insert time and used to
    /// match the authoritative record back to its placeholder; None for
    /// messages that originated remotely
    pub client_temp_id: Option<Uuid>,

    /// Owning conversation
    pub conversation_id: String,

    /// Author; never empty
    pub sender_id: String,

    /// Text content; non-empty after trimming
    pub body: String,

    /// Assigned by the remote store; optimistic entries carry the local send
    /// time as a provisional value until confirmation
    pub created_at: DateTime<Utc>,

    pub delivery_state: DeliveryState,
}

impl Message {
    /// True when `other` is the same logical message: same non-null remote id,
    /// or same client temp id for locally-originated entries
    pub fn same_identity(&self, other: &Message) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => match (self.client_temp_id, other.client_temp_id) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Display metadata for the other party in a two-person conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterpartProfile {
    pub id: Option<String>,
    pub name: String,
    pub avatar: String,
    pub status: String,
}

impl Default for CounterpartProfile {
    /// Fallbacks shown when the remote store has no profile row
    fn default() -> Self {
        Self {
            id: None,
            name: "Unknown User".to_string(),
            avatar: "/default-avatar.jpg".to_string(),
            status: "offline".to_string(),
        }
    }
}

/// Summary of one conversation thread (for the list view)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub name: String,
    /// Preview text of the last message ("No messages yet" when empty)
    pub last_message_preview: String,
    pub counterpart: CounterpartProfile,
}

/// Events emitted by the session as the cache changes.
///
/// The merge contract is transport-agnostic: today these are fed by the
/// polling refresh loop, but a push transport could emit the same stream
/// without touching the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message entered the visible log (remote arrival or optimistic send)
    NewMessage { message: Message },
    /// A message we sent was acknowledged by the remote store
    MessageDelivered { message: Message },
    /// A message we sent failed to insert remotely
    MessageFailed { client_temp_id: Uuid },
}
