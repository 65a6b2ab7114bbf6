//! Live change notifications for the followed thread.
//!
//! [`NotificationClient`] owns at most one subscription at a time. Creating
//! it spawns two tasks: a pump that decodes raw payloads into
//! [`ThreadEvent`]s, and a renewal timer that keeps the subscription alive.
//! Replacing or dropping the subscription aborts both and deletes it on the
//! service.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use graphchat_client::{Environment, translate};
use graphchat_proto::{ChangeNotification, ChangeType, ProtocolError, decode_notifications};
use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    config::ChatConfig,
    emitter::{ThreadEvent, ThreadEventEmitter},
};

/// Floor between renewal attempts, for services that hand back short expiries.
const MIN_RENEWAL_INTERVAL: Duration = Duration::from_secs(30);

/// A created notification subscription.
#[derive(Debug)]
pub struct Subscription {
    /// Service-assigned subscription id.
    pub id: String,
    /// Resource the subscription covers.
    pub resource: String,
    /// When the service will drop the subscription unless renewed.
    pub expires_at: DateTime<Utc>,
    /// Raw JSON notification payloads in delivery order.
    pub notifications: mpsc::UnboundedReceiver<String>,
}

/// Channel that delivers change notifications.
///
/// # Associated Types
///
/// - [`Error`](NotificationTransport::Error): transport or service failure
pub trait NotificationTransport: Send + Sync + 'static {
    /// Transport or service failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Subscribe `user_id` to message changes in `thread_id`.
    fn subscribe(
        &self,
        user_id: &str,
        thread_id: &str,
        lifetime: Duration,
    ) -> impl Future<Output = Result<Subscription, Self::Error>> + Send;

    /// Extend a subscription. Returns the new expiry.
    fn renew(
        &self,
        subscription_id: &str,
        lifetime: Duration,
    ) -> impl Future<Output = Result<DateTime<Utc>, Self::Error>> + Send;

    /// Delete a subscription.
    fn unsubscribe(
        &self,
        subscription_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// The live subscription and the tasks serving it.
struct ActiveSubscription {
    id: String,
    thread_id: String,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Which subscription is wanted, and the one that is live.
///
/// Every subscribe, unsubscribe and close bumps `generation`. A subscribe
/// call only installs its result if the generation is still the one it
/// started with.
#[derive(Default)]
struct Slot {
    generation: u64,
    wanted: Option<String>,
    active: Option<ActiveSubscription>,
}

/// Subscribes to a thread and feeds its notifications to an emitter.
pub struct NotificationClient<T: NotificationTransport, E: Environment> {
    transport: Arc<T>,
    env: E,
    renewal_margin: Duration,
    lifetime: Duration,
    slot: Mutex<Slot>,
}

impl<T: NotificationTransport, E: Environment> NotificationClient<T, E> {
    /// Create a client with no active subscription.
    pub fn new(transport: Arc<T>, env: E, config: &ChatConfig) -> Self {
        Self {
            transport,
            env,
            renewal_margin: config.renewal_margin,
            lifetime: config.subscription_lifetime,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Subscribe to `thread_id` on behalf of `user_id`.
    ///
    /// Replaces any existing subscription. Once the handshake completes,
    /// [`ThreadEvent::Subscribed`] is emitted; notifications follow as
    /// [`ThreadEvent::Received`], [`ThreadEvent::Edited`] and
    /// [`ThreadEvent::Deleted`].
    ///
    /// If another subscribe, an unsubscribe of `thread_id` or a close happens
    /// while the handshake is in flight, its result is deleted again and
    /// nothing is emitted.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the subscription cannot be created. The
    /// previous subscription is gone either way. Failures of superseded calls
    /// are only logged.
    pub async fn subscribe_to_chat_notifications(
        &self,
        user_id: &str,
        thread_id: &str,
        emitter: &Arc<ThreadEventEmitter>,
    ) -> Result<(), T::Error> {
        let (generation, previous) = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            slot.wanted = Some(thread_id.to_owned());
            (slot.generation, slot.active.take())
        };
        if let Some(previous) = previous {
            self.teardown(previous).await;
        }

        let subscribed = self.transport.subscribe(user_id, thread_id, self.lifetime).await;
        let Subscription { id, resource, expires_at, notifications } = match subscribed {
            Ok(subscription) => subscription,
            Err(e) if self.is_superseded(generation) => {
                tracing::debug!(%thread_id, error = %e, "superseded subscribe failed");
                return Ok(());
            },
            Err(e) => return Err(e),
        };

        let installed = {
            let mut slot = self.slot.lock();
            if slot.generation == generation {
                let pump =
                    tokio::spawn(pump(notifications, user_id.to_owned(), Arc::clone(emitter)));
                let renewal = tokio::spawn(renew(
                    Arc::clone(&self.transport),
                    self.env.clone(),
                    id.clone(),
                    expires_at,
                    self.renewal_margin,
                    self.lifetime,
                ));
                slot.active = Some(ActiveSubscription {
                    id: id.clone(),
                    thread_id: thread_id.to_owned(),
                    tasks: vec![pump, renewal],
                });
                true
            } else {
                false
            }
        };

        if !installed {
            tracing::debug!(
                %thread_id,
                subscription_id = %id,
                "discarding superseded subscription"
            );
            let stale = ActiveSubscription { id, thread_id: thread_id.to_owned(), tasks: vec![] };
            self.teardown(stale).await;
            return Ok(());
        }

        tracing::info!(
            %thread_id,
            subscription_id = %id,
            %expires_at,
            "subscribed to notifications"
        );
        emitter.emit(ThreadEvent::Subscribed { resource });
        Ok(())
    }

    /// Drop the subscription for `thread_id`, including one still being
    /// created.
    pub async fn unsubscribe(&self, thread_id: &str) {
        let current = {
            let mut slot = self.slot.lock();
            if slot.wanted.as_deref() == Some(thread_id) {
                slot.generation += 1;
                slot.wanted = None;
            }
            if slot.active.as_ref().is_some_and(|a| a.thread_id == thread_id) {
                slot.active.take()
            } else {
                None
            }
        };
        if let Some(current) = current {
            self.teardown(current).await;
        }
    }

    /// Drop the active subscription, whatever thread it covers, and abandon
    /// any subscribe in flight.
    pub async fn close(&self) {
        let current = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            slot.wanted = None;
            slot.active.take()
        };
        if let Some(current) = current {
            self.teardown(current).await;
        }
    }

    /// Id of the active subscription.
    pub fn subscription_id(&self) -> Option<String> {
        self.slot.lock().active.as_ref().map(|a| a.id.clone())
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.slot.lock().generation != generation
    }

    async fn teardown(&self, subscription: ActiveSubscription) {
        let id = subscription.id.clone();
        let thread_id = subscription.thread_id.clone();
        drop(subscription);

        match self.transport.unsubscribe(&id).await {
            Ok(()) => tracing::debug!(%thread_id, subscription_id = %id, "unsubscribed"),
            Err(e) => {
                tracing::warn!(%thread_id, subscription_id = %id, error = %e, "unsubscribe failed");
            },
        }
    }
}

/// Decode raw payloads and emit the resulting thread events.
async fn pump(
    mut notifications: mpsc::UnboundedReceiver<String>,
    user_id: String,
    emitter: Arc<ThreadEventEmitter>,
) {
    while let Some(raw) = notifications.recv().await {
        let batch = match decode_notifications(&raw) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable notification");
                continue;
            },
        };

        for notification in &batch {
            match thread_event(notification, &user_id) {
                Ok(Some(event)) => emitter.emit(event),
                Ok(None) => {},
                Err(e) => {
                    let resource = &notification.resource;
                    tracing::warn!(%resource, error = %e, "dropping notification");
                },
            }
        }
    }
    tracing::debug!("notification stream closed");
}

/// Map one notification to the thread event it implies.
///
/// Returns `None` for changes the chat does not render.
pub(crate) fn thread_event(
    notification: &ChangeNotification,
    user_id: &str,
) -> Result<Option<ThreadEvent>, ProtocolError> {
    let thread_id = notification.thread_id()?;

    let event = match notification.change_type {
        ChangeType::Created | ChangeType::Updated => {
            let wire = notification.message()?;
            if wire.deleted_date_time.is_some() {
                // Soft deletes arrive as updates carrying a deletion time.
                ThreadEvent::Deleted { thread_id, message_id: wire.id.clone() }
            } else if !translate::is_renderable(wire) {
                return Ok(None);
            } else {
                let message = translate::to_message(wire, user_id)?;
                if notification.change_type == ChangeType::Created {
                    ThreadEvent::Received { thread_id, message }
                } else {
                    ThreadEvent::Edited { thread_id, message }
                }
            }
        },
        ChangeType::Deleted => {
            ThreadEvent::Deleted { thread_id, message_id: notification.message_id()? }
        },
        ChangeType::Unknown => return Ok(None),
    };
    Ok(Some(event))
}

/// Renew the subscription `margin` before each expiry until aborted or a
/// renewal fails.
async fn renew<T: NotificationTransport, E: Environment>(
    transport: Arc<T>,
    env: E,
    subscription_id: String,
    mut expires_at: DateTime<Utc>,
    margin: Duration,
    lifetime: Duration,
) {
    loop {
        let remaining = (expires_at - env.now()).to_std().unwrap_or_default();
        let wait = remaining.saturating_sub(margin).max(MIN_RENEWAL_INTERVAL);
        tokio::time::sleep(wait).await;

        match transport.renew(&subscription_id, lifetime).await {
            Ok(next) => {
                tracing::debug!(%subscription_id, expires_at = %next, "subscription renewed");
                expires_at = next;
            },
            Err(e) => {
                tracing::warn!(%subscription_id, error = %e, "subscription renewal failed");
                return;
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn notification(raw: &str) -> ChangeNotification {
        decode_notifications(raw).unwrap().remove(0)
    }

    #[test]
    fn created_message_is_received() {
        let n = notification(
            r#"{
                "changeType": "created",
                "resource": "chats('t1')/messages('m1')",
                "resourceData": {
                    "id": "m1",
                    "messageType": "message",
                    "createdDateTime": "2024-01-01T10:00:00Z",
                    "from": {"user": {"id": "me", "displayName": "Me"}},
                    "body": {"contentType": "text", "content": "hi"}
                }
            }"#,
        );
        let Some(ThreadEvent::Received { thread_id, message }) = thread_event(&n, "me").unwrap()
        else {
            unreachable!("expected a received event");
        };
        assert_eq!(thread_id, "t1");
        assert_eq!(message.message_id, "m1");
        assert!(message.mine);
    }

    #[test]
    fn system_messages_are_skipped() {
        let n = notification(
            r#"{
                "changeType": "created",
                "resource": "chats('t1')/messages('m1')",
                "resourceData": {
                    "id": "m1",
                    "messageType": "systemEventMessage",
                    "createdDateTime": "2024-01-01T10:00:00Z"
                }
            }"#,
        );
        assert_eq!(thread_event(&n, "me").unwrap(), None);
    }

    #[test]
    fn soft_delete_update_is_deletion() {
        let n = notification(
            r#"{
                "changeType": "updated",
                "resource": "chats('t1')/messages('m1')",
                "resourceData": {
                    "id": "m1",
                    "createdDateTime": "2024-01-01T10:00:00Z",
                    "deletedDateTime": "2024-01-01T11:00:00Z"
                }
            }"#,
        );
        assert_eq!(
            thread_event(&n, "me").unwrap(),
            Some(ThreadEvent::Deleted { thread_id: "t1".into(), message_id: "m1".into() })
        );
    }

    #[test]
    fn deletion_without_resource_data_uses_path() {
        let n = notification(r#"{"changeType":"deleted","resource":"/chats/t1/messages/m9"}"#);
        assert_eq!(
            thread_event(&n, "me").unwrap(),
            Some(ThreadEvent::Deleted { thread_id: "t1".into(), message_id: "m9".into() })
        );
    }

    #[test]
    fn created_without_resource_data_is_an_error() {
        let n = notification(r#"{"changeType":"created","resource":"/chats/t1/messages/m9"}"#);
        assert!(thread_event(&n, "me").is_err());
    }

    #[tokio::test]
    async fn pump_skips_garbage_and_keeps_going() {
        let emitter = Arc::new(ThreadEventEmitter::new());
        let mut events = emitter.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(pump(rx, "me".to_owned(), Arc::clone(&emitter)));

        tx.send("not json".to_owned()).unwrap();
        tx.send(r#"{"changeType":"deleted","resource":"/chats/t1/messages/m9"}"#.to_owned())
            .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            ThreadEvent::Deleted { thread_id: "t1".into(), message_id: "m9".into() }
        );
        assert!(events.try_recv().is_err());
    }
}
