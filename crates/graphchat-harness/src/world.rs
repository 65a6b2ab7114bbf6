//! Wiring for end-to-end simulations.
//!
//! A [`SimWorld`] is one seeded environment, one simulated service and one
//! identity provider. [`SimWorld::client`] builds a [`StatefulChatClient`]
//! wired to them, and [`SimWorld::start`] additionally spawns its event loop.

use std::{sync::Arc, time::Duration};

use graphchat_app::{ChatConfig, StatefulChatClient};
use graphchat_client::ChatState;
use tokio::task::JoinHandle;

use crate::{
    invariants::InvariantRegistry,
    sim_env::SimEnv,
    sim_identity::SimIdentity,
    sim_service::{SimGraph, SimService, SimTransport},
};

/// Chat client wired to the simulation.
pub type SimChatClient = StatefulChatClient<SimGraph, SimTransport, SimIdentity, SimEnv>;

/// Signed-in user of every simulation.
pub const SIM_USER: &str = "me";

/// Display name of [`SIM_USER`].
pub const SIM_USER_NAME: &str = "Me";

/// How long [`wait_for`] waits before giving up.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Seeded environment, service and identity.
pub struct SimWorld {
    /// Shared clock and RNG.
    pub env: SimEnv,
    /// The simulated chat service.
    pub service: SimService,
    /// Identity provider, initially signed in as [`SIM_USER`].
    pub identity: SimIdentity,
    /// Runtime configuration.
    pub config: ChatConfig,
}

impl SimWorld {
    /// A world with threads `t1` and `t2`, each with three members.
    pub fn new(seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let service = SimService::new(env.clone());
        service.create_thread("t1", &[SIM_USER, "ada", "grace"]);
        service.create_thread("t2", &[SIM_USER, "ada", "linus"]);

        // Home-account id form, to exercise normalization.
        let identity = SimIdentity::signed_in(&format!("{SIM_USER}.tenant"), SIM_USER_NAME);
        Self { env, service, identity, config: ChatConfig::default() }
    }

    /// Build a client without running it.
    pub fn client(&self) -> Arc<SimChatClient> {
        Arc::new(StatefulChatClient::new(
            self.service.graph(SIM_USER, SIM_USER_NAME),
            self.service.transport(),
            self.identity.clone(),
            self.env.clone(),
            &self.config,
        ))
    }

    /// Build a client and spawn its event loop.
    pub fn start(&self) -> (Arc<SimChatClient>, JoinHandle<()>) {
        let client = self.client();
        let runner = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.run().await })
        };
        (client, runner)
    }
}

/// Wait until the published state satisfies `predicate`.
///
/// Returns the matching snapshot, or `None` after a timeout.
pub async fn wait_for(
    client: &SimChatClient,
    predicate: impl FnMut(&Arc<ChatState>) -> bool,
) -> Option<Arc<ChatState>> {
    let mut states = client.watch_state();
    let waited = tokio::time::timeout(WAIT_TIMEOUT, states.wait_for(predicate)).await;
    match waited {
        Ok(Ok(state)) => Some(Arc::clone(&state)),
        Ok(Err(_)) | Err(_) => None,
    }
}

/// Check every standard invariant against the current state.
pub fn assert_invariants(client: &SimChatClient, context: &str) {
    InvariantRegistry::standard().assert_all(&client.get_state(), context);
}
