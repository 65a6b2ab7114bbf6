//! Chat message payloads.
//!
//! Mirrors the `chatMessage` resource. Only the fields the client reads are
//! modelled; unknown fields are ignored on decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of entry in a chat thread.
///
/// System entries (members added, topic renamed) share the messages endpoint
/// with user messages, so the client has to filter on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    /// Regular user-authored message.
    #[default]
    Message,
    /// Membership or topic event rendered by the service.
    ChatEvent,
    /// Typing indicator.
    Typing,
    /// System-generated event message.
    SystemEventMessage,
    /// Any value this client does not know about.
    #[serde(other)]
    Other,
}

/// Format of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodyContentType {
    /// Plain text.
    #[default]
    Text,
    /// HTML fragment.
    Html,
}

/// Message body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    /// Body format.
    #[serde(default)]
    pub content_type: BodyContentType,
    /// Body content. Deleted messages come back with this absent or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A single identity (user, application or device).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Directory object id.
    #[serde(default)]
    pub id: String,
    /// Display name at the time the message was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// The `from` block of a message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySet {
    /// Set when a user authored the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
    /// Set when an application authored the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<Identity>,
}

/// A chat message as returned by the Graph messages endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphChatMessage {
    /// Persisted message id.
    pub id: String,
    /// Entry kind.
    #[serde(default)]
    pub message_type: MessageType,
    /// Owning chat thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Author. `None` for some system entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<IdentitySet>,
    /// Message body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ItemBody>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<DateTime<Utc>>,
    /// Last modification of any kind (reactions included).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_date_time: Option<DateTime<Utc>>,
    /// Last content edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_date_time: Option<DateTime<Utc>>,
    /// Deletion time. Set on soft-deleted messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_date_time: Option<DateTime<Utc>>,
}

impl GraphChatMessage {
    /// Body content, if present and non-empty.
    pub fn content(&self) -> Option<&str> {
        self.body.as_ref().and_then(|b| b.content.as_deref()).filter(|c| !c.is_empty())
    }

    /// Authoring user, if any.
    pub fn sender(&self) -> Option<&Identity> {
        self.from.as_ref().and_then(|f| f.user.as_ref())
    }
}

/// One page of messages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageCollection {
    /// Messages in this page, newest first as the service returns them.
    #[serde(default)]
    pub value: Vec<GraphChatMessage>,
    /// Continuation cursor. `None` once history is exhausted.
    #[serde(rename = "@odata.nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}
