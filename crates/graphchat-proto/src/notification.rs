//! Change notifications for subscribed chat threads.
//!
//! The notification channel delivers either a batch envelope (`{"value":
//! [...]}`) or a single notification object depending on the transport, so
//! [`decode_notifications`] accepts both and always yields a flat list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GraphChatMessage, ProtocolError, Result, resource};

/// What happened to the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeType {
    /// New message in the thread.
    Created,
    /// Existing message edited.
    Updated,
    /// Message soft-deleted.
    Deleted,
    /// Any value this client does not know about.
    #[serde(other)]
    Unknown,
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    /// Subscription that produced this notification.
    #[serde(default)]
    pub subscription_id: String,
    /// Kind of change.
    pub change_type: ChangeType,
    /// Resource path of the changed message.
    pub resource: String,
    /// The changed message, when the subscription includes resource data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_data: Option<GraphChatMessage>,
    /// Tenant the subscription belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Expiry of the producing subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_expiration_date_time: Option<DateTime<Utc>>,
}

impl ChangeNotification {
    /// Thread the notification belongs to.
    ///
    /// Prefers the `chatId` carried in the resource data and falls back to
    /// parsing the resource path.
    pub fn thread_id(&self) -> Result<String> {
        if let Some(chat_id) = self.resource_data.as_ref().and_then(|m| m.chat_id.as_ref()) {
            return Ok(chat_id.clone());
        }
        resource::thread_id_from_resource(&self.resource)
            .map(str::to_owned)
            .ok_or_else(|| ProtocolError::UnknownResource(self.resource.clone()))
    }

    /// Id of the changed message.
    ///
    /// Deletions may arrive without resource data, so this falls back to the
    /// resource path.
    pub fn message_id(&self) -> Result<String> {
        if let Some(message) = self.resource_data.as_ref().filter(|m| !m.id.is_empty()) {
            return Ok(message.id.clone());
        }
        resource::message_id_from_resource(&self.resource)
            .map(str::to_owned)
            .ok_or_else(|| ProtocolError::UnknownResource(self.resource.clone()))
    }

    /// The changed message, or an error if the notification carried none.
    pub fn message(&self) -> Result<&GraphChatMessage> {
        self.resource_data.as_ref().ok_or(ProtocolError::MissingField { field: "resourceData" })
    }
}

/// Batch envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationBatch {
    /// Notifications in delivery order.
    pub value: Vec<ChangeNotification>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Batch(NotificationBatch),
    Single(ChangeNotification),
}

/// Decode a raw notification payload into individual notifications.
pub fn decode_notifications(raw: &str) -> Result<Vec<ChangeNotification>> {
    let envelope: Envelope = serde_json::from_str(raw)
        .map_err(|e| ProtocolError::Malformed(format!("notification payload: {e}")))?;
    Ok(match envelope {
        Envelope::Batch(batch) => batch.value,
        Envelope::Single(notification) => vec![notification],
    })
}
