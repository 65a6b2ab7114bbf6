//! Graph chat wire types.
//!
//! Serde models for the subset of the Microsoft Graph chat surface the client
//! consumes: chat messages, chat metadata, paged message collections and the
//! change notifications delivered for a subscribed thread.
//!
//! Everything here is plain data. Translation into the UI-facing message model
//! lives in `graphchat-client`; this crate only knows how the remote side
//! spells things.
//!
//! # Components
//!
//! - [`GraphChatMessage`]: a message as returned by the messages endpoints
//! - [`Chat`]: thread metadata with its members
//! - [`MessageCollection`]: one page of messages plus the continuation cursor
//! - [`ChangeNotification`]: a decoded live notification
//! - [`resource`]: helpers for the resource paths notifications refer to

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod chat;
mod errors;
mod message;
mod notification;
pub mod resource;

pub use chat::{Chat, ChatType, ConversationMember};
pub use errors::{ProtocolError, Result};
pub use message::{
    BodyContentType, GraphChatMessage, Identity, IdentitySet, ItemBody, MessageCollection,
    MessageType,
};
pub use notification::{ChangeNotification, ChangeType, NotificationBatch, decode_notifications};
