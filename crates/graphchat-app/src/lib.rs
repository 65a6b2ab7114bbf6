//! Async runtime for the Graph chat client.
//!
//! Hosts the pure [`graphchat_client::ChatClient`] state machine behind a
//! shareable [`StatefulChatClient`]: it executes the remote operations the
//! machine asks for, keeps a live notification subscription for the followed
//! thread, tracks sign-in changes, and distributes every new state snapshot
//! to registered handlers.
//!
//! # Components
//!
//! - [`StatefulChatClient`]: state distribution and operation execution
//! - [`ChatApi`]: network operations, implemented by the host
//! - [`NotificationClient`]: subscription lifecycle over a
//!   [`NotificationTransport`]
//! - [`ThreadEventEmitter`]: typed bus of per-thread notifications
//! - [`IdentityProvider`]: source of the signed-in account
//! - [`ChatConfig`]: tunables
//! - [`SystemEnv`]: production clock and randomness

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod api;
mod config;
mod emitter;
mod identity;
mod notifications;
mod runtime;
mod system_env;

pub use api::ChatApi;
pub use config::ChatConfig;
pub use emitter::{ThreadEvent, ThreadEventEmitter};
pub use identity::{Account, IdentityEvent, IdentityProvider, ProviderState};
pub use notifications::{NotificationClient, NotificationTransport, Subscription};
pub use runtime::{StateHandler, StatefulChatClient};
pub use system_env::SystemEnv;
