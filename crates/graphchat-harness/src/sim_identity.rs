//! Scriptable identity provider.

use std::sync::Arc;

use graphchat_app::{Account, IdentityEvent, IdentityProvider, ProviderState};
use parking_lot::Mutex;
use tokio::sync::mpsc;

struct IdentityState {
    state: ProviderState,
    account: Option<Account>,
    listeners: Vec<mpsc::UnboundedSender<IdentityEvent>>,
}

/// Identity provider driven by the test. Clones share state.
#[derive(Clone)]
pub struct SimIdentity {
    inner: Arc<Mutex<IdentityState>>,
}

impl SimIdentity {
    /// A provider with nobody signed in.
    pub fn signed_out() -> Self {
        Self {
            inner: Arc::new(Mutex::new(IdentityState {
                state: ProviderState::SignedOut,
                account: None,
                listeners: Vec::new(),
            })),
        }
    }

    /// A provider with `account` already signed in.
    pub fn signed_in(id: &str, name: &str) -> Self {
        let identity = Self::signed_out();
        {
            let mut inner = identity.inner.lock();
            inner.state = ProviderState::SignedIn;
            inner.account = Some(Account { id: id.to_owned(), name: name.to_owned() });
        }
        identity
    }

    /// Sign `account` in and notify listeners.
    pub fn sign_in(&self, id: &str, name: &str) {
        let mut inner = self.inner.lock();
        inner.state = ProviderState::SignedIn;
        inner.account = Some(Account { id: id.to_owned(), name: name.to_owned() });
        broadcast(&mut inner, &IdentityEvent::LoginChanged(ProviderState::SignedIn));
    }

    /// Sign out and notify listeners.
    pub fn sign_out(&self) {
        let mut inner = self.inner.lock();
        inner.state = ProviderState::SignedOut;
        inner.account = None;
        broadcast(&mut inner, &IdentityEvent::LoginChanged(ProviderState::SignedOut));
    }

    /// Switch the active account without a sign-in transition.
    pub fn switch_account(&self, id: &str, name: &str) {
        let mut inner = self.inner.lock();
        inner.account = Some(Account { id: id.to_owned(), name: name.to_owned() });
        broadcast(&mut inner, &IdentityEvent::ActiveAccountChanged);
    }
}

fn broadcast(inner: &mut IdentityState, event: &IdentityEvent) {
    inner.listeners.retain(|tx| tx.send(event.clone()).is_ok());
}

impl IdentityProvider for SimIdentity {
    fn state(&self) -> ProviderState {
        self.inner.lock().state
    }

    fn active_account(&self) -> Option<Account> {
        self.inner.lock().account.clone()
    }

    fn events(&self) -> mpsc::UnboundedReceiver<IdentityEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().listeners.push(tx);
        rx
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn listeners_see_transitions() {
        let identity = SimIdentity::signed_out();
        let mut events = identity.events();

        identity.sign_in("oid.tid", "Ada");
        identity.sign_out();

        let signed_in = IdentityEvent::LoginChanged(ProviderState::SignedIn);
        let signed_out = IdentityEvent::LoginChanged(ProviderState::SignedOut);
        assert_eq!(events.try_recv().unwrap(), signed_in);
        assert_eq!(events.try_recv().unwrap(), signed_out);
        assert_eq!(identity.active_account(), None);
    }

    #[test]
    fn pre_signed_in() {
        let identity = SimIdentity::signed_in("oid", "Ada");
        assert_eq!(identity.state(), ProviderState::SignedIn);
        assert_eq!(identity.active_account().unwrap().name, "Ada");
    }
}
