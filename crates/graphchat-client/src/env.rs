//! Environment abstraction for deterministic testing.
//!
//! Decouples the state machine from system resources (wall clock,
//! randomness). Production hosts use the system clock and OS entropy;
//! simulation uses a virtual clock and a seeded RNG so pending ids and
//! timestamps are reproducible.

use chrono::{DateTime, Utc};
use uuid::{Builder, Uuid};

/// Abstract environment providing time and randomness.
///
/// # Invariants
///
/// - `now()` never goes backwards within one execution context. Optimistic
///   messages are stamped with it, and the message sequence is ordered by
///   that stamp.
/// - Given the same seed, a simulated `random_bytes()` produces the same
///   sequence of bytes.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a locally-unique id for an unconfirmed message.
    ///
    /// A version 4 UUID built from [`Environment::random_bytes`].
    fn pending_id(&self) -> String {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        let id: Uuid = Builder::from_random_bytes(bytes).into_uuid();
        id.to_string()
    }
}
