//! Chat client state machine.
//!
//! [`ChatClient`] owns the canonical [`ChatState`] snapshot of one followed
//! thread and reconciles three inputs into it: pages fetched from the
//! service, live notifications, and optimistic local mutations.
//!
//! The machine performs no I/O. Remote work is requested through
//! [`ChatAction`]s and its outcome comes back as a completion
//! [`ChatEvent`]. Between the two the world may have moved on (a different
//! thread selected, the message deleted, a notification applied first), so
//! every completion re-validates its target before touching state.

use std::sync::Arc;

use graphchat_proto::{Chat, GraphChatMessage, MessageCollection, resource};

use crate::{
    env::Environment,
    event::{ChatAction, ChatEvent},
    state::{ChatState, ChatStatus, ContentType, ErrorKind, Message, MessageStatus, ThreadId},
    translate,
};

/// Messages fetched per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Stateful chat client for a single followed thread.
pub struct ChatClient<E: Environment> {
    /// Environment for timestamps and pending ids.
    env: E,

    /// Latest published snapshot.
    state: Arc<ChatState>,

    /// Messages fetched per page.
    page_size: usize,

    /// Cursor of the load-more request in flight, if any.
    load_more_in_flight: Option<String>,
}

impl<E: Environment> ChatClient<E> {
    /// Create a client fetching `page_size` messages per call.
    pub fn new(env: E, page_size: usize) -> Self {
        Self {
            env,
            state: Arc::new(ChatState::new(page_size)),
            page_size,
            load_more_in_flight: None,
        }
    }

    /// Latest snapshot.
    pub fn state(&self) -> &Arc<ChatState> {
        &self.state
    }

    /// Followed thread. `None` until one is selected.
    pub fn thread_id(&self) -> Option<&str> {
        self.state.thread_id.as_deref()
    }

    /// Process an event and return resulting actions.
    pub fn handle(&mut self, event: ChatEvent) -> Vec<ChatAction> {
        match event {
            ChatEvent::IdentityChanged { user_id, display_name } => {
                self.handle_identity(user_id, display_name)
            },
            ChatEvent::SignedIn { user_id, display_name } => {
                self.handle_signed_in(user_id, display_name)
            },
            ChatEvent::SignedOut => self.handle_signed_out(),
            ChatEvent::SelectThread { thread_id } => self.handle_select_thread(thread_id),
            ChatEvent::NotificationsSubscribed { resource } => self.handle_subscribed(&resource),
            ChatEvent::SubscriptionFailed { thread_id, reason } => {
                self.handle_bootstrap_failed(&thread_id, ErrorKind::Subscribe, &reason)
            },
            ChatEvent::ChatDataLoaded { thread_id, chat, page } => {
                self.handle_chat_data(&thread_id, chat, page)
            },
            ChatEvent::ChatDataFailed { thread_id, reason } => {
                self.handle_bootstrap_failed(&thread_id, ErrorKind::LoadMessages, &reason)
            },
            ChatEvent::LoadMore => self.handle_load_more(),
            ChatEvent::MoreMessagesLoaded { thread_id, cursor, page } => {
                self.handle_more_messages(&thread_id, &cursor, page)
            },
            ChatEvent::MoreMessagesFailed { thread_id, cursor, reason } => {
                self.handle_more_messages_failed(&thread_id, &cursor, &reason)
            },
            ChatEvent::Send { content } => self.handle_send(content),
            ChatEvent::SendSucceeded { thread_id, pending_id, message } => {
                self.handle_send_succeeded(&thread_id, &pending_id, &message)
            },
            ChatEvent::SendFailed { thread_id, pending_id, reason } => {
                self.handle_send_failed(&thread_id, &pending_id, &reason)
            },
            ChatEvent::Edit { message_id, content } => self.handle_edit(message_id, content),
            ChatEvent::EditSucceeded { thread_id, message_id } => {
                self.handle_edit_settled(&thread_id, &message_id, None)
            },
            ChatEvent::EditFailed { thread_id, message_id, reason } => {
                self.handle_edit_settled(&thread_id, &message_id, Some(&reason))
            },
            ChatEvent::Delete { message_id } => self.handle_delete(&message_id),
            ChatEvent::DeleteSucceeded { thread_id, message_id } => {
                self.handle_delete_succeeded(&thread_id, &message_id)
            },
            ChatEvent::DeleteFailed { thread_id, message_id, reason } => {
                self.handle_delete_failed(&thread_id, &message_id, &reason)
            },
            ChatEvent::MessageReceived { thread_id, message } => {
                self.handle_received(&thread_id, message)
            },
            ChatEvent::MessageEdited { thread_id, message } => {
                self.handle_edited(&thread_id, message)
            },
            ChatEvent::MessageDeleted { thread_id, message_id } => {
                self.handle_deleted(&thread_id, &message_id)
            },
            ChatEvent::DismissErrors => self.handle_dismiss_errors(),
        }
    }

    /// Derive the next snapshot from the current one.
    ///
    /// The only path by which state changes. Clones the snapshot if anyone
    /// still holds the previous one, so published snapshots never change.
    fn update(&mut self, recipe: impl FnOnce(&mut ChatState)) -> ChatAction {
        let next = Arc::make_mut(&mut self.state);
        recipe(next);
        next.revision += 1;
        tracing::trace!(revision = next.revision, status = %next.status, "state changed");
        ChatAction::StateChanged
    }

    /// Whether a completion for `thread_id` still applies.
    ///
    /// Signing out drops the thread's state, so nothing issued before it
    /// applies afterwards.
    fn is_current(&self, thread_id: &str) -> bool {
        let current = self.thread_id() == Some(thread_id) && !self.state.user_id.is_empty();
        if !current {
            tracing::debug!(%thread_id, followed = ?self.thread_id(), "discarding stale result");
        }
        current
    }

    fn handle_identity(&mut self, user_id: String, display_name: String) -> Vec<ChatAction> {
        if self.state.user_id == user_id && self.state.user_display_name == display_name {
            return vec![];
        }
        vec![self.update(|s| {
            for message in &mut s.messages {
                message.mine = !message.sender_id.is_empty() && message.sender_id == user_id;
            }
            s.user_id = user_id;
            s.user_display_name = display_name;
        })]
    }

    fn handle_signed_in(&mut self, user_id: String, display_name: String) -> Vec<ChatAction> {
        let mut actions = self.handle_identity(user_id, display_name);
        actions.extend(self.follow_thread());
        actions
    }

    fn handle_signed_out(&mut self) -> Vec<ChatAction> {
        let mut actions = Vec::new();
        if let Some(thread_id) = self.state.thread_id.clone() {
            actions.push(ChatAction::Unsubscribe { thread_id });
        }
        self.load_more_in_flight = None;
        actions.push(self.update(|s| {
            s.user_id.clear();
            s.user_display_name.clear();
            s.reset_thread();
        }));
        actions
    }

    fn handle_select_thread(&mut self, thread_id: ThreadId) -> Vec<ChatAction> {
        if thread_id.is_empty() || self.thread_id() == Some(thread_id.as_str()) {
            return vec![];
        }

        let mut actions = Vec::new();
        if let Some(previous) = self.state.thread_id.clone() {
            actions.push(ChatAction::Unsubscribe { thread_id: previous });
        }

        tracing::info!(%thread_id, "following thread");
        self.load_more_in_flight = None;
        actions.push(self.update(|s| {
            s.thread_id = Some(thread_id);
            s.reset_thread();
        }));
        actions.extend(self.follow_thread());
        actions
    }

    /// Request a live subscription for the followed thread.
    ///
    /// Waits for a signed-in user; sign-in re-enters here.
    fn follow_thread(&mut self) -> Vec<ChatAction> {
        let Some(thread_id) = self.state.thread_id.clone() else {
            return vec![];
        };
        if self.state.user_id.is_empty() {
            tracing::debug!(%thread_id, "deferring subscription until sign-in");
            return vec![];
        }

        let user_id = self.state.user_id.clone();
        vec![
            self.update(|s| s.status = ChatStatus::Subscribing),
            ChatAction::Subscribe { user_id, thread_id },
        ]
    }

    fn handle_subscribed(&mut self, resource: &str) -> Vec<ChatAction> {
        let Some(thread_id) = self.state.thread_id.clone() else {
            tracing::debug!(%resource, "subscription confirmed with no thread followed");
            return vec![];
        };
        if !resource::resource_targets_thread(resource, &thread_id) {
            tracing::debug!(%resource, %thread_id, "ignoring confirmation for another thread");
            return vec![];
        }
        if self.state.status != ChatStatus::Subscribing {
            tracing::debug!(%resource, status = %self.state.status, "duplicate confirmation");
            return vec![];
        }

        let page_size = self.page_size;
        vec![
            self.update(|s| {
                s.status = ChatStatus::Loading;
                s.clear_notice(ErrorKind::Subscribe);
            }),
            ChatAction::LoadChatData { thread_id, page_size },
        ]
    }

    fn handle_bootstrap_failed(
        &mut self,
        thread_id: &str,
        kind: ErrorKind,
        reason: &str,
    ) -> Vec<ChatAction> {
        if !self.is_current(thread_id) {
            return vec![];
        }
        tracing::warn!(%thread_id, ?kind, %reason, "thread bootstrap failed");
        vec![self.update(|s| {
            s.status = ChatStatus::Error;
            s.push_notice(kind, reason);
        })]
    }

    fn handle_chat_data(
        &mut self,
        thread_id: &str,
        chat: Chat,
        page: MessageCollection,
    ) -> Vec<ChatAction> {
        if !self.is_current(thread_id) {
            return vec![];
        }

        let loaded = translate::ingest(&page.value, &self.state.user_id);
        tracing::debug!(
            %thread_id,
            loaded = loaded.len(),
            more = page.next_link.is_some(),
            "thread history loaded"
        );

        vec![self.update(|s| {
            // Keep what arrived while loading: pending sends and live messages.
            let mut messages = loaded;
            for existing in s.messages.drain(..) {
                if !messages.iter().any(|m| m.message_id == existing.message_id) {
                    messages.push(existing);
                }
            }
            s.messages = messages;
            s.sort_messages();

            s.participant_count = chat.participant_count();
            s.chat = Some(chat);
            s.status =
                if page.next_link.is_some() { ChatStatus::Loading } else { ChatStatus::Ready };
            s.set_cursor(page.next_link);
            s.clear_notice(ErrorKind::LoadMessages);
        })]
    }

    fn handle_load_more(&mut self) -> Vec<ChatAction> {
        let (Some(thread_id), Some(cursor)) =
            (self.state.thread_id.clone(), self.state.next_link.clone())
        else {
            return vec![ChatAction::NoMoreMessages];
        };
        if self.load_more_in_flight.is_some() {
            return vec![];
        }

        self.load_more_in_flight = Some(cursor.clone());
        vec![ChatAction::LoadMoreMessages { thread_id, cursor }]
    }

    /// Whether a load-more completion matches the request in flight.
    fn take_load_more(&mut self, thread_id: &str, cursor: &str) -> bool {
        if !self.is_current(thread_id) || self.load_more_in_flight.as_deref() != Some(cursor) {
            return false;
        }
        self.load_more_in_flight = None;
        self.state.next_link.as_deref() == Some(cursor)
    }

    fn handle_more_messages(
        &mut self,
        thread_id: &str,
        cursor: &str,
        page: MessageCollection,
    ) -> Vec<ChatAction> {
        if !self.take_load_more(thread_id, cursor) {
            return vec![];
        }

        let older = translate::ingest(&page.value, &self.state.user_id);
        vec![self.update(|s| {
            for message in older {
                // Entries already present carry fresher state from notifications.
                if s.index_of(&message.message_id).is_none() {
                    s.messages.push(message);
                }
            }
            s.sort_messages();
            if page.next_link.is_none() && s.status == ChatStatus::Loading {
                s.status = ChatStatus::Ready;
            }
            s.set_cursor(page.next_link);
        })]
    }

    fn handle_more_messages_failed(
        &mut self,
        thread_id: &str,
        cursor: &str,
        reason: &str,
    ) -> Vec<ChatAction> {
        if !self.take_load_more(thread_id, cursor) {
            return vec![];
        }
        tracing::warn!(%thread_id, %reason, "loading older messages failed");
        vec![self.update(|s| s.push_notice(ErrorKind::LoadMessages, reason))]
    }

    fn handle_send(&mut self, content: String) -> Vec<ChatAction> {
        if content.is_empty() {
            return vec![];
        }
        let Some(thread_id) = self.state.thread_id.clone() else {
            tracing::debug!("send ignored with no thread followed");
            return vec![];
        };
        if self.state.user_id.is_empty() {
            tracing::debug!(%thread_id, "send ignored while signed out");
            return vec![];
        }

        let pending_id = self.env.pending_id();
        let pending = Message {
            message_id: pending_id.clone(),
            client_message_id: Some(pending_id.clone()),
            content: content.clone(),
            content_type: ContentType::Text,
            created_on: self.env.now(),
            edited_on: None,
            deleted_on: None,
            sender_id: self.state.user_id.clone(),
            sender_display_name: self.state.user_display_name.clone(),
            mine: true,
            status: MessageStatus::Sending,
        };

        tracing::debug!(%thread_id, %pending_id, "sending message");
        vec![
            self.update(|s| {
                // Lands last unless a remote clock ran ahead of ours.
                s.messages.push(pending);
                s.sort_messages();
            }),
            ChatAction::SendMessage { thread_id, pending_id, content },
        ]
    }

    fn handle_send_succeeded(
        &mut self,
        thread_id: &str,
        pending_id: &str,
        sent: &GraphChatMessage,
    ) -> Vec<ChatAction> {
        if !self.is_current(thread_id) {
            return vec![];
        }

        let pending = self
            .state
            .messages
            .iter()
            .position(|m| m.client_message_id.as_deref() == Some(pending_id));
        let confirmed = match translate::to_message(sent, &self.state.user_id) {
            Ok(message) => message,
            Err(e) => match pending.map(|index| &self.state.messages[index]) {
                Some(entry) => entry.confirmed(sent.id.clone()),
                None => {
                    tracing::warn!(%pending_id, error = %e, "untranslatable send confirmation");
                    return vec![];
                },
            },
        };

        tracing::debug!(%pending_id, message_id = %confirmed.message_id, "send confirmed");
        vec![self.update(|s| {
            // Idempotent upsert keyed by the persisted id: a notification for
            // the same message may have landed first.
            match (pending, s.persisted_index(&confirmed.message_id)) {
                (Some(p), None) => s.messages[p] = confirmed,
                (Some(p), Some(existing)) => {
                    if !s.messages[existing].supersedes(&confirmed) {
                        s.messages[existing] = confirmed;
                    }
                    s.messages.remove(p);
                },
                (None, Some(existing)) => {
                    if !s.messages[existing].supersedes(&confirmed) {
                        s.messages[existing] = confirmed;
                    }
                },
                (None, None) => s.upsert(confirmed),
            }
            // The service stamps its own creation time.
            s.sort_messages();
        })]
    }

    fn handle_send_failed(
        &mut self,
        thread_id: &str,
        pending_id: &str,
        reason: &str,
    ) -> Vec<ChatAction> {
        if !self.is_current(thread_id) {
            return vec![];
        }
        tracing::warn!(%pending_id, %reason, "send failed");
        vec![self.update(|s| {
            if let Some(entry) =
                s.messages.iter_mut().find(|m| m.client_message_id.as_deref() == Some(pending_id))
            {
                entry.status = MessageStatus::Failed;
            }
            s.push_notice(ErrorKind::SendMessage, reason);
        })]
    }

    fn handle_edit(&mut self, message_id: String, content: String) -> Vec<ChatAction> {
        if message_id.is_empty() || content.is_empty() {
            return vec![];
        }
        let Some(thread_id) = self.state.thread_id.clone() else {
            return vec![];
        };
        let Some(index) = self.state.persisted_index(&message_id) else {
            return vec![];
        };
        let existing = &self.state.messages[index];
        if !existing.mine || existing.content.is_empty() || existing.is_deleted() {
            return vec![];
        }

        vec![
            self.update(|s| {
                let entry = &mut s.messages[index];
                entry.content.clone_from(&content);
                entry.status = MessageStatus::Sending;
            }),
            ChatAction::UpdateMessage { thread_id, message_id, content },
        ]
    }

    fn handle_edit_settled(
        &mut self,
        thread_id: &str,
        message_id: &str,
        failure: Option<&str>,
    ) -> Vec<ChatAction> {
        if !self.is_current(thread_id) {
            return vec![];
        }
        let Some(index) = self.state.persisted_index(message_id) else {
            tracing::debug!(%message_id, "edited message no longer present");
            return vec![];
        };

        let now = self.env.now();
        vec![self.update(|s| match failure {
            None => {
                let entry = &mut s.messages[index];
                entry.status = MessageStatus::Delivered;
                entry.edited_on = Some(now);
            },
            Some(reason) => {
                tracing::warn!(%message_id, %reason, "edit failed");
                s.messages[index].status = MessageStatus::Failed;
                s.push_notice(ErrorKind::EditMessage, reason);
            },
        })]
    }

    fn handle_delete(&mut self, id: &str) -> Vec<ChatAction> {
        if id.is_empty() {
            return vec![];
        }
        let Some(thread_id) = self.state.thread_id.clone() else {
            return vec![];
        };
        let Some(index) = self.state.messages.iter().position(|m| m.matches(id)) else {
            return vec![];
        };
        let entry = &self.state.messages[index];
        if !entry.mine || entry.is_deleted() {
            return vec![];
        }

        if entry.is_pending() {
            // Nothing persisted yet, so nothing to delete remotely.
            return vec![self.update(|s| {
                s.messages.remove(index);
            })];
        }

        vec![ChatAction::DeleteMessage { thread_id, message_id: entry.message_id.clone() }]
    }

    fn handle_delete_succeeded(&mut self, thread_id: &str, message_id: &str) -> Vec<ChatAction> {
        if !self.is_current(thread_id) {
            return vec![];
        }
        let Some(index) = self.state.persisted_index(message_id) else {
            return vec![];
        };
        let now = self.env.now();
        vec![self.update(|s| s.messages[index].tombstone(now))]
    }

    fn handle_delete_failed(
        &mut self,
        thread_id: &str,
        message_id: &str,
        reason: &str,
    ) -> Vec<ChatAction> {
        if !self.is_current(thread_id) {
            return vec![];
        }
        tracing::warn!(%message_id, %reason, "delete failed");
        vec![self.update(|s| s.push_notice(ErrorKind::DeleteMessage, reason))]
    }

    fn handle_received(&mut self, thread_id: &str, message: Message) -> Vec<ChatAction> {
        if !self.is_current(thread_id) {
            return vec![];
        }
        vec![self.update(|s| s.upsert(message))]
    }

    fn handle_edited(&mut self, thread_id: &str, message: Message) -> Vec<ChatAction> {
        if !self.is_current(thread_id) {
            return vec![];
        }
        let Some(index) = self.state.index_of(&message.message_id) else {
            tracing::debug!(message_id = %message.message_id, "edit for unknown message");
            return vec![];
        };
        vec![self.update(|s| s.messages[index] = message)]
    }

    fn handle_deleted(&mut self, thread_id: &str, message_id: &str) -> Vec<ChatAction> {
        if !self.is_current(thread_id) {
            return vec![];
        }
        let Some(index) = self.state.index_of(message_id) else {
            return vec![];
        };
        let now = self.env.now();
        vec![self.update(|s| s.messages[index].tombstone(now))]
    }

    fn handle_dismiss_errors(&mut self) -> Vec<ChatAction> {
        if self.state.error_notices.is_empty() {
            return vec![];
        }
        vec![self.update(|s| s.error_notices.clear())]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use chrono::{DateTime, TimeZone, Utc};
    use graphchat_proto::{BodyContentType, Identity, IdentitySet, ItemBody, MessageType};

    use super::*;
    use crate::state::DELETED_CONTENT;

    /// Clock advancing one second per reading; counter-based randomness.
    #[derive(Clone, Default)]
    struct TestEnv {
        ticks: Arc<AtomicU64>,
    }

    impl Environment for TestEnv {
        fn now(&self) -> DateTime<Utc> {
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst) as i64;
            Utc.timestamp_opt(1_800_000_000 + tick, 0).unwrap()
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let seed = self.ticks.fetch_add(1, Ordering::SeqCst);
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = (seed as u8).wrapping_add(i as u8);
            }
        }
    }

    const ME: &str = "me";

    fn wire(id: &str, sender: &str, secs: i64) -> GraphChatMessage {
        GraphChatMessage {
            id: id.to_owned(),
            message_type: MessageType::Message,
            chat_id: Some("t1".to_owned()),
            from: Some(IdentitySet {
                user: Some(Identity { id: sender.to_owned(), display_name: None }),
                application: None,
            }),
            body: Some(ItemBody {
                content_type: BodyContentType::Text,
                content: Some(format!("message {id}")),
            }),
            created_date_time: Some(Utc.timestamp_opt(secs, 0).unwrap()),
            ..GraphChatMessage::default()
        }
    }

    fn live(id: &str, sender: &str, secs: i64) -> Message {
        translate::to_message(&wire(id, sender, secs), ME).unwrap()
    }

    fn chat() -> Chat {
        Chat { id: "t1".to_owned(), ..Chat::default() }
    }

    /// Client signed in and following `t1`, history loaded with `messages`.
    fn ready_client(messages: Vec<GraphChatMessage>) -> ChatClient<TestEnv> {
        let mut client = ChatClient::new(TestEnv::default(), DEFAULT_PAGE_SIZE);
        client.handle(ChatEvent::SignedIn { user_id: ME.into(), display_name: "Me".into() });
        client.handle(ChatEvent::SelectThread { thread_id: "t1".into() });
        client.handle(ChatEvent::NotificationsSubscribed {
            resource: resource::chat_messages_resource("t1"),
        });
        client.handle(ChatEvent::ChatDataLoaded {
            thread_id: "t1".into(),
            chat: chat(),
            page: MessageCollection { value: messages, next_link: None },
        });
        client
    }

    fn pending_id(actions: &[ChatAction]) -> String {
        actions
            .iter()
            .find_map(|a| match a {
                ChatAction::SendMessage { pending_id, .. } => Some(pending_id.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn select_thread_subscribes() {
        let mut client = ChatClient::new(TestEnv::default(), DEFAULT_PAGE_SIZE);
        client.handle(ChatEvent::SignedIn { user_id: ME.into(), display_name: "Me".into() });
        let actions = client.handle(ChatEvent::SelectThread { thread_id: "t1".into() });

        assert!(actions.contains(&ChatAction::Subscribe {
            user_id: ME.into(),
            thread_id: "t1".into()
        }));
        assert_eq!(client.state().status, ChatStatus::Subscribing);

        // Same thread again is a no-op.
        assert!(client.handle(ChatEvent::SelectThread { thread_id: "t1".into() }).is_empty());
    }

    #[test]
    fn selection_before_sign_in_waits() {
        let mut client = ChatClient::new(TestEnv::default(), DEFAULT_PAGE_SIZE);
        let actions = client.handle(ChatEvent::SelectThread { thread_id: "t1".into() });
        assert!(!actions.iter().any(|a| matches!(a, ChatAction::Subscribe { .. })));
        assert_eq!(client.state().status, ChatStatus::Initial);

        let actions =
            client.handle(ChatEvent::SignedIn { user_id: ME.into(), display_name: "Me".into() });
        assert!(actions.iter().any(|a| matches!(a, ChatAction::Subscribe { .. })));
    }

    #[test]
    fn switching_threads_unsubscribes_previous() {
        let mut client = ready_client(vec![wire("1", ME, 10)]);
        let actions = client.handle(ChatEvent::SelectThread { thread_id: "t2".into() });

        assert_eq!(actions[0], ChatAction::Unsubscribe { thread_id: "t1".into() });
        assert!(client.state().messages.is_empty());
        assert_eq!(client.thread_id(), Some("t2"));
    }

    #[test]
    fn stale_subscription_confirmation_is_ignored() {
        let mut client = ChatClient::new(TestEnv::default(), DEFAULT_PAGE_SIZE);
        client.handle(ChatEvent::SignedIn { user_id: ME.into(), display_name: "Me".into() });
        client.handle(ChatEvent::SelectThread { thread_id: "t1".into() });
        client.handle(ChatEvent::SelectThread { thread_id: "t2".into() });

        let revision = client.state().revision;
        let actions = client.handle(ChatEvent::NotificationsSubscribed {
            resource: resource::chat_messages_resource("t1"),
        });
        assert!(actions.is_empty());
        assert_eq!(client.state().revision, revision);
    }

    #[test]
    fn repeated_confirmation_does_not_reload() {
        let mut client = ready_client(vec![wire("1", ME, 10)]);
        let actions = client.handle(ChatEvent::NotificationsSubscribed {
            resource: resource::chat_messages_resource("t1"),
        });
        assert!(actions.is_empty());
        assert_eq!(client.state().status, ChatStatus::Ready);
    }

    #[test]
    fn stale_page_is_discarded() {
        let mut client = ready_client(vec![]);
        client.handle(ChatEvent::SelectThread { thread_id: "t2".into() });

        let actions = client.handle(ChatEvent::ChatDataLoaded {
            thread_id: "t1".into(),
            chat: chat(),
            page: MessageCollection { value: vec![wire("1", ME, 10)], next_link: None },
        });
        assert!(actions.is_empty());
        assert!(client.state().messages.is_empty());
    }

    #[test]
    fn empty_send_is_noop() {
        let mut client = ready_client(vec![]);
        let before = Arc::clone(client.state());
        assert!(client.handle(ChatEvent::Send { content: String::new() }).is_empty());
        assert!(Arc::ptr_eq(&before, client.state()));
    }

    #[test]
    fn send_appends_optimistic_entry() {
        let mut client = ready_client(vec![wire("1", "them", 10)]);
        let actions = client.handle(ChatEvent::Send { content: "hi".into() });
        let pending_id = pending_id(&actions);

        let last = client.state().messages.last().unwrap();
        assert_eq!(last.client_message_id.as_deref(), Some(pending_id.as_str()));
        assert_eq!(last.message_id, pending_id);
        assert_eq!(last.status, MessageStatus::Sending);
        assert!(last.mine);
    }

    #[test]
    fn send_confirmation_replaces_pending() {
        let mut client = ready_client(vec![]);
        let actions = client.handle(ChatEvent::Send { content: "hi".into() });
        let pending_id = pending_id(&actions);

        client.handle(ChatEvent::SendSucceeded {
            thread_id: "t1".into(),
            pending_id: pending_id.clone(),
            message: wire("m1", ME, 1_800_000_100),
        });

        let messages = &client.state().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, "m1");
        assert_eq!(messages[0].client_message_id, None);
        assert_eq!(messages[0].status, MessageStatus::Delivered);
    }

    #[test]
    fn notification_before_confirmation_converges() {
        let mut client = ready_client(vec![]);
        let actions = client.handle(ChatEvent::Send { content: "hi".into() });
        let pending_id = pending_id(&actions);

        client.handle(ChatEvent::MessageReceived {
            thread_id: "t1".into(),
            message: live("m1", ME, 1_800_000_100),
        });
        assert_eq!(client.state().messages.len(), 2);

        client.handle(ChatEvent::SendSucceeded {
            thread_id: "t1".into(),
            pending_id,
            message: wire("m1", ME, 1_800_000_100),
        });

        let messages = &client.state().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, "m1");
        assert!(!messages[0].is_pending());
    }

    #[test]
    fn late_confirmation_keeps_remote_deletion() {
        let mut client = ready_client(vec![]);
        let actions = client.handle(ChatEvent::Send { content: "hi".into() });
        let pending_id = pending_id(&actions);

        client.handle(ChatEvent::MessageReceived {
            thread_id: "t1".into(),
            message: live("m1", ME, 1_800_000_100),
        });
        client.handle(ChatEvent::MessageDeleted {
            thread_id: "t1".into(),
            message_id: "m1".into(),
        });
        client.handle(ChatEvent::SendSucceeded {
            thread_id: "t1".into(),
            pending_id: pending_id.clone(),
            message: wire("m1", ME, 1_800_000_100),
        });

        let state = client.state();
        assert_eq!(state.messages.len(), 1);
        let m1 = state.message("m1").unwrap();
        assert!(m1.is_deleted());
        assert_eq!(m1.content, DELETED_CONTENT);
        assert!(state.message(&pending_id).is_none());
    }

    #[test]
    fn late_confirmation_keeps_remote_edit() {
        let mut client = ready_client(vec![]);
        let actions = client.handle(ChatEvent::Send { content: "hi".into() });
        let pending_id = pending_id(&actions);

        client.handle(ChatEvent::MessageReceived {
            thread_id: "t1".into(),
            message: live("m1", ME, 1_800_000_100),
        });
        let mut edited = wire("m1", ME, 1_800_000_100);
        edited.body = Some(ItemBody {
            content_type: BodyContentType::Text,
            content: Some("fixed typo".to_owned()),
        });
        edited.last_edited_date_time = Some(Utc.timestamp_opt(1_800_000_200, 0).unwrap());
        client.handle(ChatEvent::MessageEdited {
            thread_id: "t1".into(),
            message: translate::to_message(&edited, ME).unwrap(),
        });
        client.handle(ChatEvent::SendSucceeded {
            thread_id: "t1".into(),
            pending_id,
            message: wire("m1", ME, 1_800_000_100),
        });

        let state = client.state();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.message("m1").unwrap().content, "fixed typo");
    }

    #[test]
    fn failed_send_keeps_entry() {
        let mut client = ready_client(vec![]);
        let actions = client.handle(ChatEvent::Send { content: "hi".into() });
        let pending_id = pending_id(&actions);
        let len = client.state().messages.len();

        client.handle(ChatEvent::SendFailed {
            thread_id: "t1".into(),
            pending_id,
            reason: "503".into(),
        });

        assert_eq!(client.state().messages.len(), len);
        assert_eq!(client.state().messages[0].status, MessageStatus::Failed);
        assert_eq!(client.state().error_notices[0].kind, ErrorKind::SendMessage);
    }

    #[test]
    fn edit_is_optimistic_then_delivered() {
        let mut client = ready_client(vec![wire("1", ME, 10)]);
        let actions =
            client.handle(ChatEvent::Edit { message_id: "1".into(), content: "fixed".into() });

        assert!(actions.contains(&ChatAction::UpdateMessage {
            thread_id: "t1".into(),
            message_id: "1".into(),
            content: "fixed".into()
        }));
        assert_eq!(client.state().messages[0].status, MessageStatus::Sending);
        assert_eq!(client.state().messages[0].content, "fixed");

        client.handle(ChatEvent::EditSucceeded { thread_id: "t1".into(), message_id: "1".into() });
        assert_eq!(client.state().messages[0].status, MessageStatus::Delivered);
        assert!(client.state().messages[0].edited_on.is_some());
    }

    #[test]
    fn editing_others_messages_is_noop() {
        let mut client = ready_client(vec![wire("1", "them", 10)]);
        let before = Arc::clone(client.state());
        let actions =
            client.handle(ChatEvent::Edit { message_id: "1".into(), content: "mine now".into() });
        assert!(actions.is_empty());
        assert!(Arc::ptr_eq(&before, client.state()));
    }

    #[test]
    fn editing_tombstone_is_noop() {
        let mut client = ready_client(vec![wire("1", ME, 10)]);
        client.handle(ChatEvent::MessageDeleted { thread_id: "t1".into(), message_id: "1".into() });
        let actions =
            client.handle(ChatEvent::Edit { message_id: "1".into(), content: "revive".into() });
        assert!(actions.is_empty());
        assert_eq!(client.state().messages[0].content, DELETED_CONTENT);
    }

    #[test]
    fn deleting_pending_message_removes_it() {
        let mut client = ready_client(vec![wire("1", ME, 10)]);
        let actions = client.handle(ChatEvent::Send { content: "oops".into() });
        let pending_id = pending_id(&actions);

        let actions = client.handle(ChatEvent::Delete { message_id: pending_id });
        assert_eq!(actions, vec![ChatAction::StateChanged]);
        assert_eq!(client.state().messages.len(), 1);
    }

    #[test]
    fn deleting_persisted_message_tombstones_after_confirmation() {
        let mut client = ready_client(vec![wire("1", ME, 10), wire("2", ME, 20)]);
        let actions = client.handle(ChatEvent::Delete { message_id: "1".into() });
        assert_eq!(actions, vec![ChatAction::DeleteMessage {
            thread_id: "t1".into(),
            message_id: "1".into()
        }]);

        client
            .handle(ChatEvent::DeleteSucceeded { thread_id: "t1".into(), message_id: "1".into() });
        let messages = &client.state().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_id, "1");
        assert_eq!(messages[0].content, DELETED_CONTENT);
        assert_eq!(messages[0].content_type, ContentType::Html);
    }

    #[test]
    fn delete_failure_is_surfaced() {
        let mut client = ready_client(vec![wire("1", ME, 10)]);
        client.handle(ChatEvent::DeleteFailed {
            thread_id: "t1".into(),
            message_id: "1".into(),
            reason: "403".into(),
        });
        assert_eq!(client.state().error_notices[0].kind, ErrorKind::DeleteMessage);
        assert_eq!(client.state().messages[0].content, "message 1");
    }

    #[test]
    fn out_of_order_receive_is_sorted() {
        let mut client = ready_client(vec![wire("1", "them", 10), wire("3", "them", 30)]);
        client.handle(ChatEvent::MessageReceived {
            thread_id: "t1".into(),
            message: live("2", "them", 20),
        });

        let ids: Vec<_> = client.state().messages.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn duplicate_receive_replaces_in_place() {
        let mut client = ready_client(vec![wire("1", "them", 10), wire("2", "them", 20)]);
        let mut again = live("1", "them", 10);
        again.content = "edited via receive".into();
        client.handle(ChatEvent::MessageReceived { thread_id: "t1".into(), message: again });

        assert_eq!(client.state().messages.len(), 2);
        assert_eq!(client.state().messages[0].content, "edited via receive");
    }

    #[test]
    fn unmatched_live_edit_and_delete_are_noops() {
        let mut client = ready_client(vec![wire("1", "them", 10)]);
        let revision = client.state().revision;

        client.handle(ChatEvent::MessageEdited {
            thread_id: "t1".into(),
            message: live("404", "them", 10),
        });
        client
            .handle(ChatEvent::MessageDeleted { thread_id: "t1".into(), message_id: "404".into() });

        assert_eq!(client.state().revision, revision);
    }

    #[test]
    fn load_more_without_cursor_reports_no_more() {
        let mut client = ready_client(vec![]);
        assert_eq!(client.handle(ChatEvent::LoadMore), vec![ChatAction::NoMoreMessages]);
    }

    #[test]
    fn load_more_is_single_flight() {
        let mut client = ChatClient::new(TestEnv::default(), DEFAULT_PAGE_SIZE);
        client.handle(ChatEvent::SignedIn { user_id: ME.into(), display_name: "Me".into() });
        client.handle(ChatEvent::SelectThread { thread_id: "t1".into() });
        client.handle(ChatEvent::NotificationsSubscribed {
            resource: resource::chat_messages_resource("t1"),
        });
        client.handle(ChatEvent::ChatDataLoaded {
            thread_id: "t1".into(),
            chat: chat(),
            page: MessageCollection { value: vec![], next_link: Some("c1".into()) },
        });

        assert_eq!(client.handle(ChatEvent::LoadMore), vec![ChatAction::LoadMoreMessages {
            thread_id: "t1".into(),
            cursor: "c1".into()
        }]);
        assert!(client.handle(ChatEvent::LoadMore).is_empty());
    }

    #[test]
    fn sign_out_clears_state() {
        let mut client = ready_client(vec![wire("1", ME, 10)]);
        let actions = client.handle(ChatEvent::SignedOut);

        assert!(actions.contains(&ChatAction::Unsubscribe { thread_id: "t1".into() }));
        let state = client.state();
        assert!(state.user_id.is_empty());
        assert!(state.messages.is_empty());
        assert_eq!(state.status, ChatStatus::Initial);

        // The thread is still selected, but nobody can send to it.
        assert_eq!(client.thread_id(), Some("t1"));
        assert!(client.handle(ChatEvent::Send { content: "hi".into() }).is_empty());
    }

    #[test]
    fn published_snapshots_are_never_mutated() {
        let mut client = ready_client(vec![wire("1", ME, 10)]);
        let before = Arc::clone(client.state());
        client.handle(ChatEvent::Send { content: "hi".into() });

        assert_eq!(before.messages.len(), 1);
        assert_eq!(client.state().messages.len(), 2);
        assert!(client.state().revision > before.revision);
    }
}
