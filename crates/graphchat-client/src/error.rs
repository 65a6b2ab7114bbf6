//! Error types surfaced to callers of chat operations.
//!
//! Every error is scoped to a single message or operation. None of them
//! invalidate the rest of the state.

use thiserror::Error;

/// Errors returned by chat operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Sending failed. The optimistic entry is left with `failed` status.
    #[error("failed to send message: {reason}")]
    SendFailed {
        /// Pending id of the failed entry.
        pending_id: String,
        /// Remote failure description
        reason: String,
    },

    /// Editing failed. The entry is left with `failed` status.
    #[error("failed to update message {message_id}: {reason}")]
    UpdateFailed {
        /// Message that failed to update
        message_id: String,
        /// Remote failure description
        reason: String,
    },

    /// Deleting failed. The entry is left untouched.
    #[error("failed to delete message {message_id}: {reason}")]
    DeleteFailed {
        /// Message that failed to delete
        message_id: String,
        /// Remote failure description
        reason: String,
    },

    /// Thread metadata or history could not be loaded.
    #[error("failed to load thread {thread_id}: {reason}")]
    LoadFailed {
        /// Thread being loaded
        thread_id: String,
        /// Remote failure description
        reason: String,
    },

    /// Notification subscription could not be created.
    #[error("failed to subscribe to thread {thread_id}: {reason}")]
    SubscribeFailed {
        /// Thread being subscribed
        thread_id: String,
        /// Remote failure description
        reason: String,
    },

}
