//! Graph chat client state machine.
//!
//! Pure, action-based reconciliation of one chat thread. The client holds an
//! immutable [`ChatState`] snapshot and derives a new one for every accepted
//! [`ChatEvent`]; remote work is requested as [`ChatAction`]s and completes
//! as further events. No I/O happens here, so the same machine runs against
//! the real service and against the simulation harness.
//!
//! # Components
//!
//! - [`ChatClient`]: the state machine
//! - [`ChatState`]: the observable snapshot a UI renders from
//! - [`Environment`]: clock and randomness for timestamps and pending ids
//! - [`translate`]: wire message to UI message mapping

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod env;
mod error;
mod event;
mod state;
pub mod translate;

pub use client::{ChatClient, DEFAULT_PAGE_SIZE};
pub use env::Environment;
pub use error::ChatError;
pub use event::{ChatAction, ChatEvent};
pub use state::{
    ChatState, ChatStatus, ContentType, DELETED_CONTENT, ErrorKind, ErrorNotice, Message,
    MessageStatus, ThreadId,
};
