//! Client events and actions.

use graphchat_proto::{Chat, GraphChatMessage, MessageCollection};

use crate::state::{Message, ThreadId};

/// Events the caller feeds into the client.
///
/// Three sources drive the client:
/// - Application intents (select a thread, send, edit, delete, load more)
/// - Completions of the remote operations the client asked for, each tagged
///   with the thread it was issued for so stale results can be discarded
/// - Live notifications and identity changes
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// The active account changed without a sign-in transition.
    IdentityChanged {
        /// Normalized user id.
        user_id: String,
        /// Display name.
        display_name: String,
    },

    /// The identity provider signed in.
    SignedIn {
        /// Normalized user id.
        user_id: String,
        /// Display name.
        display_name: String,
    },

    /// The identity provider signed out.
    SignedOut,

    /// Application selected a thread to follow.
    SelectThread {
        /// Thread to follow.
        thread_id: ThreadId,
    },

    /// Notification subscription confirmed.
    NotificationsSubscribed {
        /// Resource path the subscription covers.
        resource: String,
    },

    /// Notification subscription could not be created.
    SubscriptionFailed {
        /// Thread the subscription was for.
        thread_id: ThreadId,
        /// Failure description.
        reason: String,
    },

    /// Thread metadata and first page arrived.
    ChatDataLoaded {
        /// Thread the load was issued for.
        thread_id: ThreadId,
        /// Thread metadata.
        chat: Chat,
        /// Newest page of messages.
        page: MessageCollection,
    },

    /// Thread metadata or first page failed to load.
    ChatDataFailed {
        /// Thread the load was issued for.
        thread_id: ThreadId,
        /// Failure description.
        reason: String,
    },

    /// Application wants older history.
    LoadMore,

    /// An older page arrived.
    MoreMessagesLoaded {
        /// Thread the load was issued for.
        thread_id: ThreadId,
        /// Cursor the load consumed.
        cursor: String,
        /// The page.
        page: MessageCollection,
    },

    /// An older page failed to load.
    MoreMessagesFailed {
        /// Thread the load was issued for.
        thread_id: ThreadId,
        /// Cursor the load consumed.
        cursor: String,
        /// Failure description.
        reason: String,
    },

    /// Application wants to send a message.
    Send {
        /// Message content.
        content: String,
    },

    /// The service accepted a sent message.
    SendSucceeded {
        /// Thread the send was issued for.
        thread_id: ThreadId,
        /// Pending id of the optimistic entry.
        pending_id: String,
        /// Persisted message returned by the service.
        message: GraphChatMessage,
    },

    /// A send failed.
    SendFailed {
        /// Thread the send was issued for.
        thread_id: ThreadId,
        /// Pending id of the optimistic entry.
        pending_id: String,
        /// Failure description.
        reason: String,
    },

    /// Application wants to edit a message.
    Edit {
        /// Persisted message id.
        message_id: String,
        /// Replacement content.
        content: String,
    },

    /// The service accepted an edit.
    EditSucceeded {
        /// Thread the edit was issued for.
        thread_id: ThreadId,
        /// Edited message.
        message_id: String,
    },

    /// An edit failed.
    EditFailed {
        /// Thread the edit was issued for.
        thread_id: ThreadId,
        /// Message that failed to update.
        message_id: String,
        /// Failure description.
        reason: String,
    },

    /// Application wants to delete a message.
    Delete {
        /// Persisted or client message id.
        message_id: String,
    },

    /// The service deleted a message.
    DeleteSucceeded {
        /// Thread the delete was issued for.
        thread_id: ThreadId,
        /// Deleted message.
        message_id: String,
    },

    /// A delete failed.
    DeleteFailed {
        /// Thread the delete was issued for.
        thread_id: ThreadId,
        /// Message that failed to delete.
        message_id: String,
        /// Failure description.
        reason: String,
    },

    /// Live notification: new (or re-delivered) message.
    MessageReceived {
        /// Thread the notification belongs to.
        thread_id: ThreadId,
        /// Translated message.
        message: Message,
    },

    /// Live notification: message edited.
    MessageEdited {
        /// Thread the notification belongs to.
        thread_id: ThreadId,
        /// Translated message.
        message: Message,
    },

    /// Live notification: message deleted.
    MessageDeleted {
        /// Thread the notification belongs to.
        thread_id: ThreadId,
        /// Deleted message id.
        message_id: String,
    },

    /// Application dismissed the visible error notices.
    DismissErrors,
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    /// A new snapshot was published. Broadcast it to subscribers.
    StateChanged,

    /// Subscribe to live notifications for a thread.
    ///
    /// Confirmation arrives later as
    /// [`ChatEvent::NotificationsSubscribed`].
    Subscribe {
        /// Viewer user id.
        user_id: String,
        /// Thread to subscribe to.
        thread_id: ThreadId,
    },

    /// Tear down the subscription for a thread no longer followed.
    Unsubscribe {
        /// Thread to unsubscribe from.
        thread_id: ThreadId,
    },

    /// Fetch thread metadata and the newest page.
    LoadChatData {
        /// Thread to load.
        thread_id: ThreadId,
        /// Messages per page.
        page_size: usize,
    },

    /// Fetch the page behind a cursor.
    LoadMoreMessages {
        /// Thread being paged.
        thread_id: ThreadId,
        /// Cursor to follow.
        cursor: String,
    },

    /// Load more was requested but history is exhausted.
    NoMoreMessages,

    /// Send a message to the service.
    SendMessage {
        /// Target thread.
        thread_id: ThreadId,
        /// Pending id of the optimistic entry.
        pending_id: String,
        /// Message content.
        content: String,
    },

    /// Update a message on the service.
    UpdateMessage {
        /// Target thread.
        thread_id: ThreadId,
        /// Persisted message id.
        message_id: String,
        /// Replacement content.
        content: String,
    },

    /// Delete a message on the service.
    DeleteMessage {
        /// Target thread.
        thread_id: ThreadId,
        /// Persisted message id.
        message_id: String,
    },
}
