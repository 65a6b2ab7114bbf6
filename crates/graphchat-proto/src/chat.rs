//! Chat thread metadata.

use serde::{Deserialize, Serialize};

/// Kind of chat thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChatType {
    /// Two participants.
    OneOnOne,
    /// Named or unnamed group chat.
    #[default]
    Group,
    /// Meeting chat.
    Meeting,
    /// Any value this client does not know about.
    #[serde(other)]
    Other,
}

/// A member of a chat thread.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMember {
    /// Membership id (not the user id).
    #[serde(default)]
    pub id: String,
    /// Member display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Directory user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Chat thread metadata, fetched with members expanded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Thread id.
    pub id: String,
    /// Chat topic. Only group chats carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Thread kind.
    #[serde(default)]
    pub chat_type: ChatType,
    /// Members. Empty unless the request expanded them.
    #[serde(default)]
    pub members: Vec<ConversationMember>,
}

impl Chat {
    /// Number of participants.
    pub fn participant_count(&self) -> usize {
        self.members.len()
    }
}
