//! Observable chat state.
//!
//! [`ChatState`] is the single source of truth a UI renders from. It is
//! never mutated once published: the [`crate::ChatClient`] derives each new
//! snapshot from the previous one and hands out `Arc<ChatState>` clones.

use std::fmt;

use chrono::{DateTime, Utc};
use graphchat_proto::Chat;
use serde::Serialize;

/// Chat thread identifier.
pub type ThreadId = String;

/// Content shown in place of a deleted message.
pub const DELETED_CONTENT: &str = "<em>This message has been deleted.</em>";

/// Lifecycle of the followed thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChatStatus {
    /// No thread followed yet, or signed out.
    #[default]
    Initial,
    /// Waiting for the notification subscription to be confirmed.
    Subscribing,
    /// Loading thread history. Stays here while older pages remain.
    Loading,
    /// History fully loaded.
    Ready,
    /// Subscription or initial load failed.
    Error,
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Initial => "initial",
            Self::Subscribing => "subscribing to notifications",
            Self::Loading => "loading messages",
            Self::Ready => "ready",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Format of message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    /// Plain text.
    #[default]
    Text,
    /// HTML fragment.
    Html,
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageStatus {
    /// Remote operation in flight.
    Sending,
    /// Confirmed by the service.
    Delivered,
    /// Remote operation failed. The UI may offer a retry.
    Failed,
}

/// A message as the UI sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Persisted id, or the pending id for unconfirmed sends.
    pub message_id: String,
    /// Present only on locally-originated messages the service has not
    /// confirmed yet.
    pub client_message_id: Option<String>,
    /// Message content.
    pub content: String,
    /// Content format.
    pub content_type: ContentType,
    /// Creation time. The message sequence is ordered by this.
    pub created_on: DateTime<Utc>,
    /// Last content edit, if any.
    pub edited_on: Option<DateTime<Utc>>,
    /// Set once the message has been deleted.
    pub deleted_on: Option<DateTime<Utc>>,
    /// Author id.
    pub sender_id: String,
    /// Author display name.
    pub sender_display_name: String,
    /// Authored by the signed-in user.
    pub mine: bool,
    /// Delivery status.
    pub status: MessageStatus,
}

impl Message {
    /// Whether the service has not confirmed this message yet.
    pub fn is_pending(&self) -> bool {
        self.client_message_id.is_some()
    }

    /// Whether this entry is a deletion tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted_on.is_some()
    }

    /// Whether `id` names this entry, by persisted or client id.
    pub fn matches(&self, id: &str) -> bool {
        self.message_id == id || self.client_message_id.as_deref() == Some(id)
    }

    /// Replace content with the deletion placeholder.
    ///
    /// The entry keeps its position so the thread reads continuously.
    pub fn tombstone(&mut self, at: DateTime<Utc>) {
        self.content = DELETED_CONTENT.to_owned();
        self.content_type = ContentType::Html;
        self.deleted_on.get_or_insert(at);
    }

    /// Whether this entry reflects a later change than `other`.
    ///
    /// A tombstone is final. Otherwise the later edit wins.
    pub fn supersedes(&self, other: &Message) -> bool {
        self.is_deleted() || self.edited_on > other.edited_on
    }

    /// The persisted form of a pending message under its service id.
    pub fn confirmed(&self, message_id: String) -> Self {
        Self {
            message_id,
            client_message_id: None,
            status: MessageStatus::Delivered,
            ..self.clone()
        }
    }
}

/// Category of a visible error notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Notification subscription failed.
    Subscribe,
    /// Thread history could not be loaded.
    LoadMessages,
    /// A message could not be sent.
    SendMessage,
    /// A message could not be edited.
    EditMessage,
    /// A message could not be deleted.
    DeleteMessage,
}

/// An error notice the UI should display until dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    /// Notice category. At most one notice per kind is active.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Snapshot of the chat client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    /// Incremented on every change. Snapshots with equal revisions are equal.
    pub revision: u64,
    /// Lifecycle of the followed thread.
    pub status: ChatStatus,
    /// Signed-in user id. Empty when signed out.
    pub user_id: String,
    /// Signed-in user display name.
    pub user_display_name: String,
    /// Followed thread.
    pub thread_id: Option<ThreadId>,
    /// Thread metadata, once loaded.
    pub chat: Option<Chat>,
    /// Messages ordered ascending by creation time.
    pub messages: Vec<Message>,
    /// Participants in the thread.
    pub participant_count: usize,
    /// Currently visible error notices.
    pub error_notices: Vec<ErrorNotice>,
    /// Cursor for older history. `None` once exhausted.
    pub next_link: Option<String>,
    /// Whether a load-more operation is offered.
    pub load_more_available: bool,
    /// Whether the UI should hide edit affordances.
    pub disable_editing: bool,
    /// Messages fetched per page.
    pub messages_to_reload: usize,
}

impl ChatState {
    /// Initial state for a client fetching `page_size` messages per call.
    pub fn new(page_size: usize) -> Self {
        Self {
            revision: 0,
            status: ChatStatus::Initial,
            user_id: String::new(),
            user_display_name: String::new(),
            thread_id: None,
            chat: None,
            messages: Vec::new(),
            participant_count: 0,
            error_notices: Vec::new(),
            next_link: None,
            load_more_available: false,
            disable_editing: false,
            messages_to_reload: page_size,
        }
    }

    /// Message by persisted or client id.
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.matches(id))
    }

    /// Position of the persisted message with the given id.
    pub(crate) fn persisted_index(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| !m.is_pending() && m.message_id == message_id)
    }

    /// Position of the message with the given id, pending or persisted.
    pub(crate) fn index_of(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.message_id == message_id)
    }

    /// Re-establish ascending creation order. Stable for equal timestamps.
    pub(crate) fn sort_messages(&mut self) {
        self.messages.sort_by_key(|m| m.created_on);
    }

    /// Insert or replace by id. Replacement keeps position, insertion sorts.
    pub(crate) fn upsert(&mut self, message: Message) {
        match self.index_of(&message.message_id) {
            Some(index) => self.messages[index] = message,
            None => {
                self.messages.push(message);
                self.sort_messages();
            },
        }
    }

    pub(crate) fn set_cursor(&mut self, next_link: Option<String>) {
        self.load_more_available = next_link.is_some();
        self.next_link = next_link;
    }

    /// Show a notice, replacing any active notice of the same kind.
    pub(crate) fn push_notice(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.error_notices.retain(|n| n.kind != kind);
        self.error_notices.push(ErrorNotice { kind, message: message.into() });
    }

    pub(crate) fn clear_notice(&mut self, kind: ErrorKind) {
        self.error_notices.retain(|n| n.kind != kind);
    }

    /// Drop everything tied to the followed thread.
    pub(crate) fn reset_thread(&mut self) {
        self.status = ChatStatus::Initial;
        self.chat = None;
        self.messages.clear();
        self.participant_count = 0;
        self.error_notices.clear();
        self.set_cursor(None);
    }
}
