//! Network collaborator for chat operations.
//!
//! The [`ChatApi`] trait decouples the runtime from the HTTP client that
//! talks to the service. Production wires an authenticated Graph client in;
//! the simulation harness wires an in-memory service with failure injection.

use std::future::Future;

use graphchat_proto::{Chat, GraphChatMessage, MessageCollection};

/// Remote chat operations.
///
/// Every method is a single request. Retrying, ordering and reconciliation
/// with local state are the caller's concern.
///
/// # Associated Types
///
/// - [`Error`](ChatApi::Error): transport or service failure
pub trait ChatApi: Send + Sync + 'static {
    /// Transport or service failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch thread metadata including members.
    fn load_chat(&self, thread_id: &str) -> impl Future<Output = Result<Chat, Self::Error>> + Send;

    /// Fetch the newest `page_size` messages of a thread.
    fn load_chat_thread(
        &self,
        thread_id: &str,
        page_size: usize,
    ) -> impl Future<Output = Result<MessageCollection, Self::Error>> + Send;

    /// Follow a continuation cursor returned by a previous page.
    fn load_more_chat_messages(
        &self,
        next_link: &str,
    ) -> impl Future<Output = Result<MessageCollection, Self::Error>> + Send;

    /// Post a plain-text message. Returns the persisted message.
    fn send_chat_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> impl Future<Output = Result<GraphChatMessage, Self::Error>> + Send;

    /// Replace the content of a message.
    fn update_chat_message(
        &self,
        thread_id: &str,
        message_id: &str,
        content: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Soft-delete a message.
    fn delete_chat_message(
        &self,
        thread_id: &str,
        message_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
