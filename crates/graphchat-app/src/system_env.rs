//! Production environment using the system clock and OS randomness.

use chrono::{DateTime, Utc};
use graphchat_client::Environment;

/// Production environment.
///
/// Wall-clock timestamps from `chrono::Utc::now()` and pending-id entropy
/// from getrandom.
///
/// # Panics
///
/// Panics if the OS RNG fails. Pending ids must be unique for confirmations
/// to find their optimistic entry; RNG failure indicates an OS-level fault.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
