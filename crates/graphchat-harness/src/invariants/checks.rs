//! Standard invariant checks.

use std::collections::HashSet;

use graphchat_client::{ChatState, ContentType, DELETED_CONTENT};

use super::{Invariant, InvariantResult, Violation};

/// Messages are ordered ascending by creation time.
pub struct MessagesSorted;

impl Invariant for MessagesSorted {
    fn name(&self) -> &'static str {
        "messages_sorted"
    }

    fn check(&self, state: &ChatState) -> InvariantResult {
        for window in state.messages.windows(2) {
            if window[1].created_on < window[0].created_on {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{} ({}) after {} ({})",
                        window[1].message_id,
                        window[1].created_on,
                        window[0].message_id,
                        window[0].created_on
                    ),
                });
            }
        }
        Ok(())
    }
}

/// No two entries share a message id or a client message id.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &ChatState) -> InvariantResult {
        let mut seen = HashSet::new();
        let mut seen_client = HashSet::new();
        for message in &state.messages {
            let fresh = seen.insert(message.message_id.as_str());
            let fresh_client =
                message.client_message_id.as_deref().is_none_or(|id| seen_client.insert(id));
            if !fresh || !fresh_client {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("duplicate entry for {}", message.message_id),
                });
            }
        }
        Ok(())
    }
}

/// Unconfirmed entries were authored by the signed-in user.
pub struct PendingMessagesAreMine;

impl Invariant for PendingMessagesAreMine {
    fn name(&self) -> &'static str {
        "pending_messages_are_mine"
    }

    fn check(&self, state: &ChatState) -> InvariantResult {
        match state.messages.iter().find(|m| m.is_pending() && !m.mine) {
            Some(message) => Err(Violation {
                invariant: self.name(),
                message: format!("pending {} not marked mine", message.message_id),
            }),
            None => Ok(()),
        }
    }
}

/// Load-more is offered exactly when a continuation cursor exists.
pub struct CursorMatchesLoadMore;

impl Invariant for CursorMatchesLoadMore {
    fn name(&self) -> &'static str {
        "cursor_matches_load_more"
    }

    fn check(&self, state: &ChatState) -> InvariantResult {
        if state.load_more_available != state.next_link.is_some() {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "load_more_available={} with next_link={:?}",
                    state.load_more_available, state.next_link
                ),
            });
        }
        Ok(())
    }
}

/// Deleted entries carry the HTML placeholder and nothing else.
pub struct TombstonesAreHtml;

impl Invariant for TombstonesAreHtml {
    fn name(&self) -> &'static str {
        "tombstones_are_html"
    }

    fn check(&self, state: &ChatState) -> InvariantResult {
        let bad = state.messages.iter().find(|m| {
            m.is_deleted() && (m.content != DELETED_CONTENT || m.content_type != ContentType::Html)
        });
        match bad {
            Some(message) => Err(Violation {
                invariant: self.name(),
                message: format!("tombstone {} shows {:?}", message.message_id, message.content),
            }),
            None => Ok(()),
        }
    }
}
