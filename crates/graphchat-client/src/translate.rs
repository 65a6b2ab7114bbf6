//! Mapping from Graph wire messages to UI messages.

use graphchat_proto::{BodyContentType, GraphChatMessage, MessageType, ProtocolError};

use crate::state::{ContentType, Message, MessageStatus};

/// Normalize an active-account id to a directory user id.
///
/// Home-account ids are `{oid}.{tid}`; messages are authored by the `oid`.
pub fn normalize_user_id(account_id: &str) -> &str {
    account_id.split('.').next().unwrap_or_default()
}

/// Whether a wire entry should be shown at all.
///
/// System entries share the messages endpoint with user messages, and
/// messages deleted out-of-band come back without content. Neither can be
/// filtered server-side, so they are dropped here.
pub fn is_renderable(message: &GraphChatMessage) -> bool {
    message.message_type == MessageType::Message && message.content().is_some()
}

/// Translate a wire message for the viewer `user_id`.
pub fn to_message(message: &GraphChatMessage, user_id: &str) -> Result<Message, ProtocolError> {
    let created_on = message
        .created_date_time
        .ok_or(ProtocolError::MissingField { field: "createdDateTime" })?;

    let sender = message.sender();
    let sender_id = sender.map(|s| s.id.clone()).unwrap_or_default();
    let sender_display_name =
        sender.and_then(|s| s.display_name.clone()).unwrap_or_default();

    let content_type = match message.body.as_ref().map(|b| b.content_type) {
        Some(BodyContentType::Html) => ContentType::Html,
        Some(BodyContentType::Text) | None => ContentType::Text,
    };

    let mut translated = Message {
        message_id: message.id.clone(),
        client_message_id: None,
        content: message.content().unwrap_or_default().to_owned(),
        content_type,
        created_on,
        edited_on: message.last_edited_date_time,
        deleted_on: None,
        mine: !sender_id.is_empty() && sender_id == user_id,
        sender_id,
        sender_display_name,
        status: MessageStatus::Delivered,
    };

    if let Some(deleted_on) = message.deleted_date_time {
        translated.tombstone(deleted_on);
    }

    Ok(translated)
}

/// Filter and translate a page of wire messages.
///
/// Entries that fail translation are dropped rather than failing the page.
pub fn ingest(messages: &[GraphChatMessage], user_id: &str) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| is_renderable(m))
        .filter_map(|m| match to_message(m, user_id) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!(message_id = %m.id, error = %e, "dropping untranslatable message");
                None
            },
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use graphchat_proto::{Identity, IdentitySet, ItemBody};
    use proptest::prelude::*;

    use super::*;
    use crate::state::DELETED_CONTENT;

    fn wire(id: &str, sender: &str, content: Option<&str>) -> GraphChatMessage {
        GraphChatMessage {
            id: id.to_owned(),
            message_type: MessageType::Message,
            chat_id: Some("t1".to_owned()),
            from: Some(IdentitySet {
                user: Some(Identity {
                    id: sender.to_owned(),
                    display_name: Some(format!("User {sender}")),
                }),
                application: None,
            }),
            body: Some(ItemBody {
                content_type: BodyContentType::Text,
                content: content.map(str::to_owned),
            }),
            created_date_time: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            ..GraphChatMessage::default()
        }
    }

    #[test]
    fn home_account_id_is_truncated() {
        assert_eq!(normalize_user_id("oid-123.tenant-456"), "oid-123");
        assert_eq!(normalize_user_id("plain"), "plain");
        assert_eq!(normalize_user_id(""), "");
    }

    #[test]
    fn translation_marks_own_messages() {
        let mine = to_message(&wire("1", "me", Some("hi")), "me").unwrap();
        assert!(mine.mine);
        assert_eq!(mine.status, MessageStatus::Delivered);
        assert_eq!(mine.client_message_id, None);
        assert_eq!(mine.sender_display_name, "User me");

        let theirs = to_message(&wire("2", "them", Some("hi")), "me").unwrap();
        assert!(!theirs.mine);
    }

    #[test]
    fn senderless_message_is_never_mine() {
        let mut message = wire("1", "me", Some("hi"));
        message.from = None;
        let translated = to_message(&message, "").unwrap();
        assert!(!translated.mine);
        assert!(translated.sender_id.is_empty());
    }

    #[test]
    fn missing_creation_time_is_an_error() {
        let mut message = wire("1", "me", Some("hi"));
        message.created_date_time = None;
        assert!(to_message(&message, "me").is_err());
    }

    #[test]
    fn soft_deleted_message_becomes_tombstone() {
        let mut message = wire("1", "me", Some("gone soon"));
        message.deleted_date_time = Some(Utc.timestamp_opt(1_700_000_100, 0).unwrap());
        let translated = to_message(&message, "me").unwrap();
        assert_eq!(translated.content, DELETED_CONTENT);
        assert_eq!(translated.content_type, ContentType::Html);
        assert!(translated.is_deleted());
    }

    #[test]
    fn ingest_drops_system_and_empty_entries() {
        let mut system = wire("sys", "me", Some("Ada added Grace"));
        system.message_type = MessageType::SystemEventMessage;
        let deleted = wire("del", "me", None);
        let empty = wire("empty", "me", Some(""));
        let kept = wire("ok", "me", Some("hello"));

        let ingested = ingest(&[system, deleted, empty, kept], "me");
        assert_eq!(ingested.len(), 1);
        assert_eq!(ingested[0].message_id, "ok");
    }

    proptest! {
        #[test]
        fn prop_normalized_id_is_leading_segment(id in "[a-z0-9.-]{0,40}") {
            let user_id = normalize_user_id(&id);
            prop_assert!(id.starts_with(user_id));
            prop_assert!(!user_id.contains('.'));
        }

        #[test]
        fn prop_ownership_follows_sender(sender in "[a-z]{1,8}", viewer in "[a-z]{0,8}") {
            let message = to_message(&wire("1", &sender, Some("hi")), &viewer).unwrap();
            prop_assert_eq!(message.mine, sender == viewer);
        }
    }
}
