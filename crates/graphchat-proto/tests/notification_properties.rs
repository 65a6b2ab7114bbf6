//! Property-based tests for change-notification decoding.
//!
//! Notification payloads come from the network, so decoding must reject
//! anything malformed without panicking, and every well-formed notification
//! must resolve to the thread and message it names.

use graphchat_proto::{
    ChangeNotification, ChangeType, NotificationBatch, decode_notifications, resource,
};
use proptest::prelude::*;

/// Thread ids in the service's `19:{hash}@thread.v2` shape.
fn thread_id() -> impl Strategy<Value = String> {
    "19:[a-z0-9]{1,16}@thread\\.v2"
}

fn message_id() -> impl Strategy<Value = String> {
    "[0-9]{1,13}"
}

fn change_type() -> impl Strategy<Value = ChangeType> {
    prop_oneof![Just(ChangeType::Created), Just(ChangeType::Updated), Just(ChangeType::Deleted)]
}

/// Either resource syntax the service uses.
fn message_resource(thread_id: &str, message_id: &str, odata: bool) -> String {
    if odata {
        format!("chats('{thread_id}')/messages('{message_id}')")
    } else {
        format!("/chats/{thread_id}/messages/{message_id}")
    }
}

proptest! {
    /// Arbitrary input never panics the decoder.
    #[test]
    fn prop_decode_never_panics(raw in any::<String>()) {
        let _ = decode_notifications(&raw);
    }

    /// Arbitrary JSON-looking input never panics the decoder.
    #[test]
    fn prop_decode_json_shapes_never_panics(
        raw in r#"\{("value"|"changeType"|"resource"|"resourceData")?:?\[?\{?"?[a-z]{0,8}"?\]?\}?\}"#,
    ) {
        let _ = decode_notifications(&raw);
    }

    /// A batch decodes to the same number of notifications, in order, each
    /// resolving to the thread and message its resource names.
    #[test]
    fn prop_batch_resolves_every_resource(
        entries in prop::collection::vec(
            (thread_id(), message_id(), change_type(), any::<bool>()),
            1..8,
        ),
    ) {
        let batch = NotificationBatch {
            value: entries
                .iter()
                .map(|(thread, message, change_type, odata)| ChangeNotification {
                    subscription_id: "sub".to_owned(),
                    change_type: *change_type,
                    resource: message_resource(thread, message, *odata),
                    resource_data: None,
                    tenant_id: None,
                    subscription_expiration_date_time: None,
                })
                .collect(),
        };
        let raw = serde_json::to_string(&batch).unwrap();

        let decoded = decode_notifications(&raw).unwrap();
        prop_assert_eq!(decoded.len(), entries.len());
        for (notification, (thread, message, change_type, _)) in decoded.iter().zip(&entries) {
            prop_assert_eq!(notification.change_type, *change_type);
            prop_assert_eq!(&notification.thread_id().unwrap(), thread);
            prop_assert_eq!(&notification.message_id().unwrap(), message);
        }
    }

    /// A subscription confirmation for one thread never matches another.
    #[test]
    fn prop_confirmation_matches_only_its_thread(a in thread_id(), b in thread_id()) {
        let confirmed = resource::chat_messages_resource(&a);
        prop_assert!(resource::resource_targets_thread(&confirmed, &a));
        prop_assert_eq!(resource::resource_targets_thread(&confirmed, &b), a == b);
    }
}
