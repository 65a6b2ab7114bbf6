//! Identity provider abstraction.
//!
//! The chat client needs to know who is signed in (to mark own messages and
//! to subscribe on their behalf) and when that changes. Hosts inject an
//! [`IdentityProvider`] instead of the client reaching for a global one.

use tokio::sync::mpsc;

/// Sign-in state of the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    /// Provider still initializing.
    Loading,
    /// No user signed in.
    SignedOut,
    /// A user is signed in.
    SignedIn,
}

/// The signed-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Home-account id, possibly `{oid}.{tid}`.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// Change notification from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    /// Sign-in state changed.
    LoginChanged(ProviderState),
    /// The active account switched without a sign-in transition.
    ActiveAccountChanged,
}

/// Source of the signed-in identity.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Current sign-in state.
    fn state(&self) -> ProviderState;

    /// The active account, if any.
    fn active_account(&self) -> Option<Account>;

    /// Stream of identity changes.
    ///
    /// Each call returns a fresh receiver. The runtime subscribes once.
    fn events(&self) -> mpsc::UnboundedReceiver<IdentityEvent>;
}
