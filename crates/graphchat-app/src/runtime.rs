//! Stateful chat client runtime.
//!
//! [`StatefulChatClient`] wraps the pure [`ChatClient`] state machine with
//! everything that needs I/O:
//! - [`ChatApi`]: network operations requested by the machine
//! - [`NotificationClient`]: the live subscription feeding the emitter
//! - [`IdentityProvider`]: sign-in changes
//! - state distribution to registered handlers and watchers
//!
//! The machine sits behind a synchronous lock that is only held while an
//! event is handled and the resulting snapshot broadcast. Remote calls happen
//! outside the lock; their outcomes are fed back as completion events.

use std::{collections::VecDeque, sync::Arc};

use graphchat_client::{
    ChatAction, ChatClient, ChatError, ChatEvent, ChatState, Environment, translate,
};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc, watch};

use crate::{
    api::ChatApi,
    config::ChatConfig,
    emitter::{ThreadEvent, ThreadEventEmitter},
    identity::{Account, IdentityEvent, IdentityProvider, ProviderState},
    notifications::{NotificationClient, NotificationTransport},
};

/// Callback receiving every published snapshot.
///
/// Handlers run synchronously, in registration order, while the state
/// machine is locked. They may call [`StatefulChatClient::get_state`] but
/// must not invoke other operations on the client directly; spawn a task
/// instead.
pub type StateHandler = Arc<dyn Fn(Arc<ChatState>) + Send + Sync>;

/// Result of driving one event to quiescence.
#[derive(Default)]
struct Outcome {
    /// First failure among the remote operations performed.
    error: Option<ChatError>,
    /// The machine reported that history is exhausted.
    exhausted: bool,
}

impl Outcome {
    fn fail(&mut self, error: ChatError) {
        self.error.get_or_insert(error);
    }

    fn into_result(self) -> Result<(), ChatError> {
        self.error.map_or(Ok(()), Err)
    }
}

/// Chat client for one followed thread, with state distribution.
///
/// # Type Parameters
///
/// - `A`: network operations
/// - `T`: notification transport
/// - `I`: identity provider
/// - `E`: environment for timestamps and pending ids
pub struct StatefulChatClient<A, T, I, E>
where
    A: ChatApi,
    T: NotificationTransport,
    I: IdentityProvider,
    E: Environment,
{
    api: A,
    notifications: NotificationClient<T, E>,
    identity: I,
    emitter: Arc<ThreadEventEmitter>,
    machine: Mutex<ChatClient<E>>,
    published: watch::Sender<Arc<ChatState>>,
    handlers: Mutex<Vec<StateHandler>>,
    thread_events: Mutex<Option<mpsc::UnboundedReceiver<ThreadEvent>>>,
    identity_events: Mutex<Option<mpsc::UnboundedReceiver<IdentityEvent>>>,
    shutdown: Notify,
}

impl<A, T, I, E> StatefulChatClient<A, T, I, E>
where
    A: ChatApi,
    T: NotificationTransport,
    I: IdentityProvider,
    E: Environment,
{
    /// Create a client. Picks up the identity already signed in, if any.
    ///
    /// Nothing is followed until [`set_chat_id`](Self::set_chat_id), and
    /// notifications only flow while [`run`](Self::run) is polled.
    pub fn new(api: A, transport: T, identity: I, env: E, config: &ChatConfig) -> Self {
        let emitter = Arc::new(ThreadEventEmitter::new());
        let thread_events = emitter.subscribe();
        let identity_events = identity.events();

        let mut machine = ChatClient::new(env.clone(), config.messages_per_call);
        if let Some(account) = signed_in_account(&identity) {
            machine.handle(identity_changed(&account));
        }
        let (published, _) = watch::channel(Arc::clone(machine.state()));

        Self {
            api,
            notifications: NotificationClient::new(Arc::new(transport), env, config),
            identity,
            emitter,
            machine: Mutex::new(machine),
            published,
            handlers: Mutex::new(Vec::new()),
            thread_events: Mutex::new(Some(thread_events)),
            identity_events: Mutex::new(Some(identity_events)),
            shutdown: Notify::new(),
        }
    }

    /// Latest published snapshot.
    pub fn get_state(&self) -> Arc<ChatState> {
        Arc::clone(&self.published.borrow())
    }

    /// Watch published snapshots.
    pub fn watch_state(&self) -> watch::Receiver<Arc<ChatState>> {
        self.published.subscribe()
    }

    /// Register a handler. Registering the same handler twice is a no-op.
    pub fn on_state_change(&self, handler: StateHandler) {
        let mut handlers = self.handlers.lock();
        if !handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            handlers.push(handler);
        }
    }

    /// Unregister a handler. Unknown handlers are ignored.
    pub fn off_state_change(&self, handler: &StateHandler) {
        self.handlers.lock().retain(|h| !Arc::ptr_eq(h, handler));
    }

    /// The shared thread event bus.
    pub fn emitter(&self) -> &Arc<ThreadEventEmitter> {
        &self.emitter
    }

    /// The notification subscription owner.
    pub fn notifications(&self) -> &NotificationClient<T, E> {
        &self.notifications
    }

    /// Follow a thread.
    ///
    /// Drops the previous thread's state and subscription and subscribes to
    /// the new one. History loads once the subscription is confirmed, which
    /// [`run`](Self::run) delivers. An empty id or the current thread is a
    /// no-op. Without a signed-in user, following waits for sign-in.
    ///
    /// # Errors
    ///
    /// [`ChatError::SubscribeFailed`] if the subscription cannot be created.
    pub async fn set_chat_id(&self, thread_id: impl Into<String>) -> Result<(), ChatError> {
        self.drive(ChatEvent::SelectThread { thread_id: thread_id.into() }).await.into_result()
    }

    /// Send a message, optimistically appending it.
    ///
    /// Empty content or no followed thread is a no-op.
    ///
    /// # Errors
    ///
    /// [`ChatError::SendFailed`] if the service rejects the message. The
    /// entry stays in the thread marked failed.
    pub async fn send_message(&self, content: impl Into<String>) -> Result<(), ChatError> {
        self.drive(ChatEvent::Send { content: content.into() }).await.into_result()
    }

    /// Replace the content of one of the user's messages.
    ///
    /// Unknown, foreign, pending or deleted messages are left alone.
    ///
    /// # Errors
    ///
    /// [`ChatError::UpdateFailed`] if the service rejects the edit.
    pub async fn update_message(
        &self,
        message_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), ChatError> {
        let event = ChatEvent::Edit { message_id: message_id.into(), content: content.into() };
        self.drive(event).await.into_result()
    }

    /// Delete one of the user's messages.
    ///
    /// A pending message is removed locally. A persisted one becomes a
    /// tombstone once the service confirms.
    ///
    /// # Errors
    ///
    /// [`ChatError::DeleteFailed`] if the service rejects the deletion.
    pub async fn delete_message(&self, message_id: impl Into<String>) -> Result<(), ChatError> {
        self.drive(ChatEvent::Delete { message_id: message_id.into() }).await.into_result()
    }

    /// Load the next page of older history.
    ///
    /// Returns `true` once no older history remains.
    ///
    /// # Errors
    ///
    /// [`ChatError::LoadFailed`] if the page cannot be fetched.
    pub async fn load_more_messages(&self) -> Result<bool, ChatError> {
        let outcome = self.drive(ChatEvent::LoadMore).await;
        let exhausted = outcome.exhausted;
        outcome.into_result()?;
        Ok(exhausted || self.get_state().next_link.is_none())
    }

    /// Clear the visible error notices.
    ///
    /// Must not be called from a [`StateHandler`].
    pub fn dismiss_errors(&self) {
        self.dispatch(ChatEvent::DismissErrors);
    }

    /// Pump notifications and identity changes until [`shutdown`].
    ///
    /// Returns immediately if another `run` already owns the event streams.
    ///
    /// [`shutdown`]: Self::shutdown
    pub async fn run(&self) {
        let thread_events = self.thread_events.lock().take();
        let identity_events = self.identity_events.lock().take();
        let (Some(mut thread_events), Some(mut identity_events)) = (thread_events, identity_events)
        else {
            tracing::warn!("chat runtime already running");
            return;
        };

        tracing::debug!("chat runtime started");
        let mut identity_open = true;
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.notified() => break,

                event = identity_events.recv(), if identity_open => match event {
                    Some(event) => self.on_identity_event(&event).await,
                    None => identity_open = false,
                },

                event = thread_events.recv() => match event {
                    Some(event) => self.on_thread_event(event).await,
                    None => break,
                },
            }
        }

        self.notifications.close().await;
        tracing::debug!("chat runtime stopped");
    }

    /// Stop [`run`](Self::run). A later `run` call returns immediately.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn on_thread_event(&self, event: ThreadEvent) {
        let event = match event {
            ThreadEvent::Received { thread_id, message } => {
                ChatEvent::MessageReceived { thread_id, message }
            },
            ThreadEvent::Edited { thread_id, message } => {
                ChatEvent::MessageEdited { thread_id, message }
            },
            ThreadEvent::Deleted { thread_id, message_id } => {
                ChatEvent::MessageDeleted { thread_id, message_id }
            },
            ThreadEvent::Subscribed { resource } => ChatEvent::NotificationsSubscribed { resource },
        };
        self.drive_in_background(event).await;
    }

    async fn on_identity_event(&self, event: &IdentityEvent) {
        let event = match event {
            IdentityEvent::LoginChanged(ProviderState::SignedIn) => {
                match self.identity.active_account() {
                    Some(account) => ChatEvent::SignedIn {
                        user_id: translate::normalize_user_id(&account.id).to_owned(),
                        display_name: account.name,
                    },
                    None => {
                        tracing::warn!("signed in without an active account");
                        return;
                    },
                }
            },
            IdentityEvent::LoginChanged(ProviderState::SignedOut) => ChatEvent::SignedOut,
            IdentityEvent::LoginChanged(ProviderState::Loading) => return,
            IdentityEvent::ActiveAccountChanged => match self.identity.active_account() {
                Some(account) => identity_changed(&account),
                None => return,
            },
        };
        self.drive_in_background(event).await;
    }

    /// Drive an event nobody awaits. Failures are already recorded as
    /// notices, so they are only logged.
    async fn drive_in_background(&self, event: ChatEvent) {
        if let Err(e) = self.drive(event).await.into_result() {
            tracing::warn!(error = %e, "background chat operation failed");
        }
    }

    /// Feed an event and perform every remote action it leads to.
    async fn drive(&self, event: ChatEvent) -> Outcome {
        let mut outcome = Outcome::default();
        let mut pending: VecDeque<ChatAction> = self.dispatch(event).into();

        while let Some(action) = pending.pop_front() {
            if let Some(completion) = self.perform(action, &mut outcome).await {
                pending.extend(self.dispatch(completion));
            }
        }
        outcome
    }

    /// Handle one event under the machine lock and broadcast the result.
    ///
    /// Returns the actions that need I/O.
    fn dispatch(&self, event: ChatEvent) -> Vec<ChatAction> {
        let mut machine = self.machine.lock();
        let mut actions = machine.handle(event);

        let len = actions.len();
        actions.retain(|a| *a != ChatAction::StateChanged);
        if actions.len() != len {
            self.publish(machine.state());
        }
        actions
    }

    /// Publish a snapshot. Called with the machine lock held so broadcasts
    /// are totally ordered.
    fn publish(&self, state: &Arc<ChatState>) {
        self.published.send_replace(Arc::clone(state));
        let handlers = self.handlers.lock().clone();
        for handler in &handlers {
            handler(Arc::clone(state));
        }
    }

    /// Perform a remote action. Returns the completion event, if any.
    async fn perform(&self, action: ChatAction, outcome: &mut Outcome) -> Option<ChatEvent> {
        match action {
            ChatAction::StateChanged => None,
            ChatAction::NoMoreMessages => {
                outcome.exhausted = true;
                None
            },
            ChatAction::Subscribe { user_id, thread_id } => {
                let subscribed = self
                    .notifications
                    .subscribe_to_chat_notifications(&user_id, &thread_id, &self.emitter)
                    .await;
                match subscribed {
                    Ok(()) => None,
                    Err(e) => {
                        let reason = e.to_string();
                        outcome.fail(ChatError::SubscribeFailed {
                            thread_id: thread_id.clone(),
                            reason: reason.clone(),
                        });
                        Some(ChatEvent::SubscriptionFailed { thread_id, reason })
                    },
                }
            },
            ChatAction::Unsubscribe { thread_id } => {
                self.notifications.unsubscribe(&thread_id).await;
                None
            },
            ChatAction::LoadChatData { thread_id, page_size } => {
                let (chat, page) = tokio::join!(
                    self.api.load_chat(&thread_id),
                    self.api.load_chat_thread(&thread_id, page_size)
                );
                match chat.and_then(|chat| page.map(|page| (chat, page))) {
                    Ok((chat, page)) => Some(ChatEvent::ChatDataLoaded { thread_id, chat, page }),
                    Err(e) => {
                        let reason = e.to_string();
                        outcome.fail(ChatError::LoadFailed {
                            thread_id: thread_id.clone(),
                            reason: reason.clone(),
                        });
                        Some(ChatEvent::ChatDataFailed { thread_id, reason })
                    },
                }
            },
            ChatAction::LoadMoreMessages { thread_id, cursor } => {
                match self.api.load_more_chat_messages(&cursor).await {
                    Ok(page) => Some(ChatEvent::MoreMessagesLoaded { thread_id, cursor, page }),
                    Err(e) => {
                        let reason = e.to_string();
                        outcome.fail(ChatError::LoadFailed {
                            thread_id: thread_id.clone(),
                            reason: reason.clone(),
                        });
                        Some(ChatEvent::MoreMessagesFailed { thread_id, cursor, reason })
                    },
                }
            },
            ChatAction::SendMessage { thread_id, pending_id, content } => {
                match self.api.send_chat_message(&thread_id, &content).await {
                    Ok(message) => {
                        Some(ChatEvent::SendSucceeded { thread_id, pending_id, message })
                    },
                    Err(e) => {
                        let reason = e.to_string();
                        outcome.fail(ChatError::SendFailed {
                            pending_id: pending_id.clone(),
                            reason: reason.clone(),
                        });
                        Some(ChatEvent::SendFailed { thread_id, pending_id, reason })
                    },
                }
            },
            ChatAction::UpdateMessage { thread_id, message_id, content } => {
                match self.api.update_chat_message(&thread_id, &message_id, &content).await {
                    Ok(()) => Some(ChatEvent::EditSucceeded { thread_id, message_id }),
                    Err(e) => {
                        let reason = e.to_string();
                        outcome.fail(ChatError::UpdateFailed {
                            message_id: message_id.clone(),
                            reason: reason.clone(),
                        });
                        Some(ChatEvent::EditFailed { thread_id, message_id, reason })
                    },
                }
            },
            ChatAction::DeleteMessage { thread_id, message_id } => {
                match self.api.delete_chat_message(&thread_id, &message_id).await {
                    Ok(()) => Some(ChatEvent::DeleteSucceeded { thread_id, message_id }),
                    Err(e) => {
                        let reason = e.to_string();
                        outcome.fail(ChatError::DeleteFailed {
                            message_id: message_id.clone(),
                            reason: reason.clone(),
                        });
                        Some(ChatEvent::DeleteFailed { thread_id, message_id, reason })
                    },
                }
            },
        }
    }
}

fn signed_in_account<I: IdentityProvider>(identity: &I) -> Option<Account> {
    if identity.state() == ProviderState::SignedIn { identity.active_account() } else { None }
}

fn identity_changed(account: &Account) -> ChatEvent {
    ChatEvent::IdentityChanged {
        user_id: translate::normalize_user_id(&account.id).to_owned(),
        display_name: account.name.clone(),
    }
}
