//! In-memory chat service.
//!
//! [`SimService`] holds threads, messages and notification subscriptions.
//! Two handles expose it to the runtime: [`SimGraph`] implements
//! [`ChatApi`] and [`SimTransport`] implements [`NotificationTransport`].
//! Every mutation, whether made through the API or injected by a test as a
//! remote participant, is pushed to matching subscriptions the way the real
//! service does.
//!
//! # Fault injection
//!
//! - [`SimService::fail_next`]: the next call of an operation fails without
//!   effect
//! - [`SimService::hold`]: calls of an operation take effect, then wait until
//!   [`SimService::release`] before returning, which lets a test order a
//!   notification ahead of the operation's own completion
//! - [`SimService::detach_hold`]: later calls pass straight through while
//!   the calls already held keep waiting, which lets a newer call overtake
//!   an older one

use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use graphchat_app::{ChatApi, NotificationTransport, Subscription};
use graphchat_client::Environment;
use graphchat_proto::{
    BodyContentType, ChangeNotification, ChangeType, Chat, ChatType, ConversationMember,
    GraphChatMessage, Identity, IdentitySet, ItemBody, MessageCollection, MessageType,
    NotificationBatch, resource,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};

use crate::sim_env::SimEnv;

/// Prefix of continuation cursors handed out by the simulated service.
const CURSOR_PREFIX: &str = "sim://";

/// Operations that support fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`ChatApi::load_chat`]
    LoadChat,
    /// [`ChatApi::load_chat_thread`]
    LoadThread,
    /// [`ChatApi::load_more_chat_messages`]
    LoadMore,
    /// [`ChatApi::send_chat_message`]
    Send,
    /// [`ChatApi::update_chat_message`]
    Update,
    /// [`ChatApi::delete_chat_message`]
    Delete,
    /// [`NotificationTransport::subscribe`]
    Subscribe,
    /// [`NotificationTransport::renew`]
    Renew,
}

/// Calls that were waiting on a hold when it was detached.
pub struct HeldCalls(Arc<Semaphore>);

impl HeldCalls {
    /// Let the held calls return.
    pub fn release(self) {
        self.0.close();
    }
}

/// Errors returned by the simulated service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Failure injected with [`SimService::fail_next`].
    #[error("{reason}")]
    Injected {
        /// Operation that failed.
        operation: Operation,
        /// Injected failure description.
        reason: String,
    },

    /// Unknown thread, message or subscription.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to modify the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Cursor was not issued by this service.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

struct SimThread {
    chat: Chat,
    messages: Vec<GraphChatMessage>,
}

struct SimSubscription {
    thread_id: String,
    expires_at: DateTime<Utc>,
    sender: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct ServiceState {
    threads: BTreeMap<String, SimThread>,
    subscriptions: BTreeMap<String, SimSubscription>,
    failures: HashMap<Operation, String>,
    holds: HashMap<Operation, Arc<Semaphore>>,
    next_message_id: u64,
    next_subscription_id: u64,
    renewals: u64,
    calls: HashMap<Operation, u64>,
}

/// In-memory chat service shared by the API and transport handles.
#[derive(Clone)]
pub struct SimService {
    env: SimEnv,
    state: Arc<Mutex<ServiceState>>,
}

impl SimService {
    /// Create an empty service on the given environment's clock.
    pub fn new(env: SimEnv) -> Self {
        Self { env, state: Arc::new(Mutex::new(ServiceState::default())) }
    }

    /// API handle acting as `user_id`.
    pub fn graph(&self, user_id: &str, display_name: &str) -> SimGraph {
        SimGraph {
            service: self.clone(),
            user: Identity { id: user_id.to_owned(), display_name: Some(display_name.to_owned()) },
        }
    }

    /// Notification transport handle.
    pub fn transport(&self) -> SimTransport {
        SimTransport { service: self.clone() }
    }

    /// Create a group thread with the given member user ids.
    pub fn create_thread(&self, thread_id: &str, members: &[&str]) {
        let chat = Chat {
            id: thread_id.to_owned(),
            topic: Some(format!("Topic {thread_id}")),
            chat_type: ChatType::Group,
            members: members
                .iter()
                .map(|user| ConversationMember {
                    id: format!("member-{user}"),
                    display_name: Some((*user).to_owned()),
                    user_id: Some((*user).to_owned()),
                })
                .collect(),
        };
        self.state
            .lock()
            .threads
            .insert(thread_id.to_owned(), SimThread { chat, messages: Vec::new() });
    }

    /// Post a message as a remote participant. Notifies subscribers.
    pub fn post_as(
        &self,
        thread_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<GraphChatMessage, SimError> {
        let sender = Identity { id: user_id.to_owned(), display_name: Some(user_id.to_owned()) };
        self.create_message(thread_id, &sender, content)
    }

    /// Post a message with an explicit creation time. Notifies subscribers.
    ///
    /// Lets a test deliver messages out of creation order.
    pub fn post_at(
        &self,
        thread_id: &str,
        user_id: &str,
        content: &str,
        created: DateTime<Utc>,
    ) -> Result<GraphChatMessage, SimError> {
        let sender = Identity { id: user_id.to_owned(), display_name: Some(user_id.to_owned()) };
        self.insert_message(thread_id, &sender, content, created)
    }

    /// Edit any message as a remote participant. Notifies subscribers.
    pub fn edit_remote(
        &self,
        thread_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), SimError> {
        self.modify(thread_id, message_id, None, |message, now| {
            message.body = Some(text_body(content));
            message.last_edited_date_time = Some(now);
            message.last_modified_date_time = Some(now);
        })
    }

    /// Delete any message as a remote participant. Notifies subscribers.
    pub fn delete_remote(&self, thread_id: &str, message_id: &str) -> Result<(), SimError> {
        self.remove(thread_id, message_id, None)
    }

    /// Push a raw payload to every subscription on a thread.
    pub fn deliver_raw(&self, thread_id: &str, raw: &str) {
        let state = self.state.lock();
        for subscription in state.subscriptions.values().filter(|s| s.thread_id == thread_id) {
            let _ = subscription.sender.send(raw.to_owned());
        }
    }

    /// Persisted messages of a thread, oldest first, tombstones included.
    pub fn messages(&self, thread_id: &str) -> Vec<GraphChatMessage> {
        self.state.lock().threads.get(thread_id).map(|t| t.messages.clone()).unwrap_or_default()
    }

    /// Threads with at least one live subscription.
    pub fn subscribed_threads(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut threads: Vec<_> =
            state.subscriptions.values().map(|s| s.thread_id.clone()).collect();
        threads.sort();
        threads.dedup();
        threads
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Number of successful renewals.
    pub fn renewal_count(&self) -> u64 {
        self.state.lock().renewals
    }

    /// Number of calls made to an operation, failed ones included.
    pub fn call_count(&self, operation: Operation) -> u64 {
        self.state.lock().calls.get(&operation).copied().unwrap_or_default()
    }

    /// Make the next call of `operation` fail with `reason`.
    pub fn fail_next(&self, operation: Operation, reason: &str) {
        self.state.lock().failures.insert(operation, reason.to_owned());
    }

    /// Hold calls of `operation` after they take effect until released.
    pub fn hold(&self, operation: Operation) {
        self.state.lock().holds.insert(operation, Arc::new(Semaphore::new(0)));
    }

    /// Let held calls of `operation` return.
    pub fn release(&self, operation: Operation) {
        if let Some(gate) = self.state.lock().holds.remove(&operation) {
            gate.close();
        }
    }

    /// Stop holding new calls of `operation`. Calls already held keep
    /// waiting until the returned handle is released.
    pub fn detach_hold(&self, operation: Operation) -> Option<HeldCalls> {
        self.state.lock().holds.remove(&operation).map(HeldCalls)
    }

    /// Count the call and consume an injected failure, if any.
    fn enter(&self, operation: Operation) -> Result<(), SimError> {
        let mut state = self.state.lock();
        *state.calls.entry(operation).or_default() += 1;
        match state.failures.remove(&operation) {
            Some(reason) => Err(SimError::Injected { operation, reason }),
            None => Ok(()),
        }
    }

    /// Wait out a hold on `operation`.
    async fn leave(&self, operation: Operation) {
        let gate = self.state.lock().holds.get(&operation).cloned();
        if let Some(gate) = gate {
            // Closed on release; the error is the signal to continue.
            let _ = gate.acquire().await;
        }
    }

    fn create_message(
        &self,
        thread_id: &str,
        sender: &Identity,
        content: &str,
    ) -> Result<GraphChatMessage, SimError> {
        let created = self.env.now();
        self.insert_message(thread_id, sender, content, created)
    }

    fn insert_message(
        &self,
        thread_id: &str,
        sender: &Identity,
        content: &str,
        created: DateTime<Utc>,
    ) -> Result<GraphChatMessage, SimError> {
        let mut state = self.state.lock();
        state.next_message_id += 1;
        let message = GraphChatMessage {
            id: format!("msg-{}", state.next_message_id),
            message_type: MessageType::Message,
            chat_id: Some(thread_id.to_owned()),
            from: Some(IdentitySet { user: Some(sender.clone()), application: None }),
            body: Some(text_body(content)),
            created_date_time: Some(created),
            last_modified_date_time: Some(created),
            ..GraphChatMessage::default()
        };

        let thread = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| SimError::NotFound(thread_id.to_owned()))?;
        thread.messages.push(message.clone());
        thread.messages.sort_by_key(|m| m.created_date_time);

        notify(&state, thread_id, ChangeType::Created, &message);
        Ok(message)
    }

    fn modify(
        &self,
        thread_id: &str,
        message_id: &str,
        author: Option<&str>,
        edit: impl FnOnce(&mut GraphChatMessage, DateTime<Utc>),
    ) -> Result<(), SimError> {
        let now = self.env.now();
        let mut state = self.state.lock();
        let message = find_message(&mut state, thread_id, message_id, author)?;
        edit(message, now);
        let message = message.clone();
        notify(&state, thread_id, ChangeType::Updated, &message);
        Ok(())
    }

    fn remove(
        &self,
        thread_id: &str,
        message_id: &str,
        author: Option<&str>,
    ) -> Result<(), SimError> {
        let now = self.env.now();
        let mut state = self.state.lock();
        let message = find_message(&mut state, thread_id, message_id, author)?;
        message.deleted_date_time = Some(now);
        message.body = Some(ItemBody { content_type: BodyContentType::Html, content: None });
        let message = message.clone();
        notify(&state, thread_id, ChangeType::Deleted, &message);
        Ok(())
    }

    /// One page of a thread, newest first, starting `skip` from the newest.
    fn page(
        &self,
        thread_id: &str,
        skip: usize,
        top: usize,
    ) -> Result<MessageCollection, SimError> {
        let state = self.state.lock();
        let thread =
            state.threads.get(thread_id).ok_or_else(|| SimError::NotFound(thread_id.to_owned()))?;

        let value: Vec<_> = thread.messages.iter().rev().skip(skip).take(top).cloned().collect();
        let consumed = skip + value.len();
        let next_link = (consumed < thread.messages.len())
            .then(|| format!("{CURSOR_PREFIX}{thread_id}?skip={consumed}&top={top}"));
        Ok(MessageCollection { value, next_link })
    }
}

fn text_body(content: &str) -> ItemBody {
    ItemBody { content_type: BodyContentType::Text, content: Some(content.to_owned()) }
}

fn find_message<'a>(
    state: &'a mut ServiceState,
    thread_id: &str,
    message_id: &str,
    author: Option<&str>,
) -> Result<&'a mut GraphChatMessage, SimError> {
    let thread =
        state.threads.get_mut(thread_id).ok_or_else(|| SimError::NotFound(thread_id.to_owned()))?;
    let message = thread
        .messages
        .iter_mut()
        .find(|m| m.id == message_id && m.deleted_date_time.is_none())
        .ok_or_else(|| SimError::NotFound(message_id.to_owned()))?;

    if let Some(author) = author
        && message.sender().map(|s| s.id.as_str()) != Some(author)
    {
        return Err(SimError::Forbidden(message_id.to_owned()));
    }
    Ok(message)
}

/// Push a change to every subscription on `thread_id`.
fn notify(
    state: &ServiceState,
    thread_id: &str,
    change_type: ChangeType,
    message: &GraphChatMessage,
) {
    for (id, subscription) in &state.subscriptions {
        if subscription.thread_id != thread_id {
            continue;
        }
        let batch = NotificationBatch {
            value: vec![ChangeNotification {
                subscription_id: id.clone(),
                change_type,
                resource: format!("chats('{thread_id}')/messages('{}')", message.id),
                resource_data: Some(message.clone()),
                tenant_id: None,
                subscription_expiration_date_time: Some(subscription.expires_at),
            }],
        };
        match serde_json::to_string(&batch) {
            Ok(raw) => {
                let _ = subscription.sender.send(raw);
            },
            Err(e) => tracing::error!(error = %e, "failed to encode notification"),
        }
    }
}

/// Parse `sim://{thread}?skip={n}&top={m}`.
fn parse_cursor(cursor: &str) -> Option<(&str, usize, usize)> {
    let rest = cursor.strip_prefix(CURSOR_PREFIX)?;
    let (thread_id, query) = rest.split_once('?')?;
    let mut skip = None;
    let mut top = None;
    for pair in query.split('&') {
        match pair.split_once('=')? {
            ("skip", value) => skip = value.parse().ok(),
            ("top", value) => top = value.parse().ok(),
            _ => {},
        }
    }
    Some((thread_id, skip?, top?))
}

/// [`ChatApi`] over a [`SimService`], acting as one user.
#[derive(Clone)]
pub struct SimGraph {
    service: SimService,
    user: Identity,
}

impl ChatApi for SimGraph {
    type Error = SimError;

    fn load_chat(&self, thread_id: &str) -> impl Future<Output = Result<Chat, SimError>> + Send {
        let service = self.service.clone();
        let thread_id = thread_id.to_owned();
        async move {
            service.enter(Operation::LoadChat)?;
            let chat = service
                .state
                .lock()
                .threads
                .get(&thread_id)
                .map(|t| t.chat.clone())
                .ok_or(SimError::NotFound(thread_id));
            service.leave(Operation::LoadChat).await;
            chat
        }
    }

    fn load_chat_thread(
        &self,
        thread_id: &str,
        page_size: usize,
    ) -> impl Future<Output = Result<MessageCollection, SimError>> + Send {
        let service = self.service.clone();
        let thread_id = thread_id.to_owned();
        async move {
            service.enter(Operation::LoadThread)?;
            let page = service.page(&thread_id, 0, page_size);
            service.leave(Operation::LoadThread).await;
            page
        }
    }

    fn load_more_chat_messages(
        &self,
        next_link: &str,
    ) -> impl Future<Output = Result<MessageCollection, SimError>> + Send {
        let service = self.service.clone();
        let next_link = next_link.to_owned();
        async move {
            service.enter(Operation::LoadMore)?;
            let page = match parse_cursor(&next_link) {
                Some((thread_id, skip, top)) => service.page(thread_id, skip, top),
                None => Err(SimError::InvalidCursor(next_link.clone())),
            };
            service.leave(Operation::LoadMore).await;
            page
        }
    }

    fn send_chat_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> impl Future<Output = Result<GraphChatMessage, SimError>> + Send {
        let service = self.service.clone();
        let user = self.user.clone();
        let thread_id = thread_id.to_owned();
        let content = content.to_owned();
        async move {
            service.enter(Operation::Send)?;
            let message = service.create_message(&thread_id, &user, &content);
            service.leave(Operation::Send).await;
            message
        }
    }

    fn update_chat_message(
        &self,
        thread_id: &str,
        message_id: &str,
        content: &str,
    ) -> impl Future<Output = Result<(), SimError>> + Send {
        let service = self.service.clone();
        let user_id = self.user.id.clone();
        let (thread_id, message_id, content) =
            (thread_id.to_owned(), message_id.to_owned(), content.to_owned());
        async move {
            service.enter(Operation::Update)?;
            let result = service.modify(&thread_id, &message_id, Some(&user_id), |message, now| {
                message.body = Some(text_body(&content));
                message.last_edited_date_time = Some(now);
                message.last_modified_date_time = Some(now);
            });
            service.leave(Operation::Update).await;
            result
        }
    }

    fn delete_chat_message(
        &self,
        thread_id: &str,
        message_id: &str,
    ) -> impl Future<Output = Result<(), SimError>> + Send {
        let service = self.service.clone();
        let user_id = self.user.id.clone();
        let (thread_id, message_id) = (thread_id.to_owned(), message_id.to_owned());
        async move {
            service.enter(Operation::Delete)?;
            let result = service.remove(&thread_id, &message_id, Some(&user_id));
            service.leave(Operation::Delete).await;
            result
        }
    }
}

/// [`NotificationTransport`] over a [`SimService`].
#[derive(Clone)]
pub struct SimTransport {
    service: SimService,
}

impl NotificationTransport for SimTransport {
    type Error = SimError;

    fn subscribe(
        &self,
        _user_id: &str,
        thread_id: &str,
        lifetime: Duration,
    ) -> impl Future<Output = Result<Subscription, SimError>> + Send {
        let service = self.service.clone();
        let thread_id = thread_id.to_owned();
        async move {
            service.enter(Operation::Subscribe)?;
            let expires_at = expiry(&service.env, lifetime);
            let (sender, notifications) = mpsc::unbounded_channel();

            let id = {
                let mut state = service.state.lock();
                if !state.threads.contains_key(&thread_id) {
                    return Err(SimError::NotFound(thread_id));
                }
                state.next_subscription_id += 1;
                let id = format!("sub-{}", state.next_subscription_id);
                let subscription =
                    SimSubscription { thread_id: thread_id.clone(), expires_at, sender };
                state.subscriptions.insert(id.clone(), subscription);
                id
            };

            service.leave(Operation::Subscribe).await;
            Ok(Subscription {
                id,
                resource: resource::chat_messages_resource(&thread_id),
                expires_at,
                notifications,
            })
        }
    }

    fn renew(
        &self,
        subscription_id: &str,
        lifetime: Duration,
    ) -> impl Future<Output = Result<DateTime<Utc>, SimError>> + Send {
        let service = self.service.clone();
        let subscription_id = subscription_id.to_owned();
        async move {
            service.enter(Operation::Renew)?;
            let expires_at = expiry(&service.env, lifetime);
            let mut state = service.state.lock();
            let subscription = state
                .subscriptions
                .get_mut(&subscription_id)
                .ok_or(SimError::NotFound(subscription_id))?;
            subscription.expires_at = expires_at;
            state.renewals += 1;
            Ok(expires_at)
        }
    }

    fn unsubscribe(
        &self,
        subscription_id: &str,
    ) -> impl Future<Output = Result<(), SimError>> + Send {
        let service = self.service.clone();
        let subscription_id = subscription_id.to_owned();
        async move {
            service
                .state
                .lock()
                .subscriptions
                .remove(&subscription_id)
                .map(|_| ())
                .ok_or(SimError::NotFound(subscription_id))
        }
    }
}

fn expiry(env: &SimEnv, lifetime: Duration) -> DateTime<Utc> {
    let now = env.peek();
    chrono::TimeDelta::from_std(lifetime)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(now)
}
