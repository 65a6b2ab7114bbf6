//! Deterministic environment for simulation.
//!
//! A virtual clock and a seeded `ChaCha8` RNG. Two runs with the same seed
//! produce the same pending ids and the same timestamps, so failures replay.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use graphchat_client::Environment;
use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Virtual time every simulation starts at: 2024-01-01T00:00:00Z.
const EPOCH_SECS: i64 = 1_704_067_200;

/// Virtual time that passes on every clock reading.
///
/// Two readings never return the same instant, so messages stamped in
/// sequence keep their order.
const TICK: Duration = Duration::from_millis(1);

struct SimState {
    now: DateTime<Utc>,
    rng: ChaCha8Rng,
}

/// Simulation environment. Clones share the clock and RNG.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Create an environment from a seed.
    pub fn with_seed(seed: u64) -> Self {
        let now = Utc.timestamp_opt(EPOCH_SECS, 0).single().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let rng = ChaCha8Rng::seed_from_u64(seed);
        Self { state: Arc::new(Mutex::new(SimState { now, rng })) }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.now = advanced(state.now, duration);
    }

    /// Current virtual time without advancing the clock.
    pub fn peek(&self) -> DateTime<Utc> {
        self.state.lock().now
    }

    /// Next value from the seeded RNG.
    pub fn next_u64(&self) -> u64 {
        self.state.lock().rng.next_u64()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> DateTime<Utc> {
        let mut state = self.state.lock();
        let now = state.now;
        state.now = advanced(now, TICK);
        now
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.state.lock().rng.fill_bytes(buffer);
    }
}

/// `at + duration`, saturating at the end of representable time.
fn advanced(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
