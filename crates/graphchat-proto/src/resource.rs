//! Resource paths used by chat subscriptions and notifications.
//!
//! Subscriptions are created against `/chats/{id}/messages`. Notifications
//! name the changed message either in OData key syntax
//! (`chats('{id}')/messages('{mid}')`) or in path syntax
//! (`/chats/{id}/messages/{mid}`).

/// Subscription resource for all messages in a thread.
pub fn chat_messages_resource(thread_id: &str) -> String {
    format!("/chats/{thread_id}/messages")
}

/// Whether a subscription resource targets the given thread.
///
/// Matches on the `/{thread_id}/` segment so a confirmation for one thread
/// never satisfies a different thread whose id happens to share a prefix.
pub fn resource_targets_thread(resource: &str, thread_id: &str) -> bool {
    !thread_id.is_empty() && resource.contains(&format!("/{thread_id}/"))
}

/// Extract the thread id from a message resource path.
///
/// Returns `None` if the path names no chat.
pub fn thread_id_from_resource(resource: &str) -> Option<&str> {
    let path = resource.trim_start_matches('/');

    if let Some(rest) = path.strip_prefix("chats('") {
        let end = rest.find("')")?;
        return Some(&rest[..end]).filter(|id| !id.is_empty());
    }

    let rest = path.strip_prefix("chats/")?;
    let end = rest.find('/').unwrap_or(rest.len());
    Some(&rest[..end]).filter(|id| !id.is_empty())
}

/// Extract the message id from a message resource path.
///
/// Returns `None` if the path names no message.
pub fn message_id_from_resource(resource: &str) -> Option<&str> {
    if let Some(start) = resource.find("messages('") {
        let rest = &resource[start + "messages('".len()..];
        let end = rest.find("')")?;
        return Some(&rest[..end]).filter(|id| !id.is_empty());
    }

    let start = resource.find("/messages/")?;
    let rest = &resource[start + "/messages/".len()..];
    let end = rest.find('/').unwrap_or(rest.len());
    Some(&rest[..end]).filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn subscription_resource_targets_its_thread() {
        let resource = chat_messages_resource("19:abc@thread.v2");
        assert_eq!(resource, "/chats/19:abc@thread.v2/messages");
        assert!(resource_targets_thread(&resource, "19:abc@thread.v2"));
    }

    #[test]
    fn prefix_thread_does_not_match() {
        let resource = chat_messages_resource("thread-10");
        assert!(!resource_targets_thread(&resource, "thread-1"));
        assert!(!resource_targets_thread(&resource, ""));
    }

    #[test]
    fn extracts_thread_from_odata_keys() {
        assert_eq!(
            thread_id_from_resource("chats('19:abc@thread.v2')/messages('1001')"),
            Some("19:abc@thread.v2")
        );
    }

    #[test]
    fn extracts_thread_from_path_segments() {
        assert_eq!(thread_id_from_resource("/chats/t1/messages/1001"), Some("t1"));
        assert_eq!(thread_id_from_resource("chats/t1"), Some("t1"));
    }

    #[test]
    fn foreign_resources_have_no_thread() {
        assert_eq!(thread_id_from_resource("/teams/x/channels/y/messages"), None);
        assert_eq!(thread_id_from_resource("chats('')/messages('1')"), None);
        assert_eq!(thread_id_from_resource("chats('unterminated"), None);
    }

    #[test]
    fn extracts_message_id() {
        assert_eq!(message_id_from_resource("chats('t1')/messages('1001')"), Some("1001"));
        assert_eq!(message_id_from_resource("/chats/t1/messages/1001"), Some("1001"));
        assert_eq!(message_id_from_resource("/chats/t1/messages"), None);
        assert_eq!(message_id_from_resource("/chats/t1/messages/"), None);
    }

    proptest! {
        #[test]
        fn prop_subscription_resource_round_trips(id in "[a-zA-Z0-9:@._-]{1,40}") {
            let resource = chat_messages_resource(&id);
            prop_assert!(resource_targets_thread(&resource, &id));
            prop_assert_eq!(thread_id_from_resource(&resource), Some(id.as_str()));
        }
    }
}
