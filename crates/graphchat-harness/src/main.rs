//! Graph chat simulation binary.
//!
//! Runs a scripted conversation against the simulated service and checks
//! every standard invariant after each step.
//!
//! # Usage
//!
//! ```bash
//! # One run with the default seed
//! graphchat-sim
//!
//! # Many seeds, more history, verbose client logs
//! graphchat-sim --seed 7 --runs 50 --history 23 --log-level graphchat_client=debug
//! ```

use std::{error::Error, sync::Arc};

use clap::Parser;
use graphchat_client::{ChatState, ChatStatus};
use graphchat_harness::{InvariantRegistry, Operation, SIM_USER, SimChatClient, SimWorld, wait_for};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Graph chat client simulation
#[derive(Parser, Debug)]
#[command(name = "graphchat-sim")]
#[command(about = "Deterministic simulation of the stateful Graph chat client")]
#[command(version)]
struct Args {
    /// Seed of the first run
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of runs, with consecutive seeds
    #[arg(short, long, default_value = "1")]
    runs: u64,

    /// Messages already in the thread before the client follows it
    #[arg(long, default_value = "12")]
    history: usize,

    /// Messages fetched per page
    #[arg(long, default_value = "5")]
    page_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    for seed in args.seed..args.seed.saturating_add(args.runs) {
        run_scenario(seed, &args).await?;
    }

    tracing::info!(runs = args.runs, "all simulations passed");
    Ok(())
}

/// One scripted conversation.
async fn run_scenario(seed: u64, args: &Args) -> Result<(), Box<dyn Error>> {
    let mut world = SimWorld::new(seed);
    world.config.messages_per_call = args.page_size;
    for i in 0..args.history {
        let author = if world.env.next_u64() % 3 == 0 { SIM_USER } else { "ada" };
        world.service.post_as("t1", author, &format!("history {i}"))?;
    }

    let (client, runner) = world.start();
    let invariants = InvariantRegistry::standard();
    {
        let invariants = InvariantRegistry::standard();
        client.on_state_change(Arc::new(move |state| {
            if let Err(violations) = invariants.check_all(&state) {
                for violation in violations {
                    tracing::error!(revision = state.revision, %violation, "invariant violated");
                }
            }
        }));
    }

    client.set_chat_id("t1").await?;
    wait_until(&client, "history loaded", |s| s.chat.is_some()).await?;

    while !client.load_more_messages().await? {}
    let loaded = client.get_state().messages.len();
    tracing::info!(seed, loaded, "history paged in");

    client.send_message("hello from the simulation").await?;
    world.service.post_as("t1", "ada", "a reply")?;
    wait_until(&client, "reply received", |s| {
        s.messages.iter().any(|m| m.content == "a reply")
    })
    .await?;

    world.service.fail_next(Operation::Send, "service unavailable");
    if let Err(e) = client.send_message("this one fails").await {
        tracing::info!(error = %e, "injected send failure");
    }
    client.dismiss_errors();

    let state = client.get_state();
    let own = state.messages.iter().rev().find(|m| m.mine && !m.is_pending() && !m.is_deleted());
    if let Some(own) = own.cloned() {
        client.update_message(own.message_id.clone(), "edited in simulation").await?;
        client.delete_message(own.message_id).await?;
    }

    client.set_chat_id("t2").await?;
    wait_until(&client, "second thread loaded", |s| {
        s.thread_id.as_deref() == Some("t2") && s.chat.is_some()
    })
    .await?;

    let state = client.get_state();
    invariants.assert_all(&state, &format!("at end of seed {seed}"));
    tracing::info!(
        seed,
        revision = state.revision,
        status = %state.status,
        messages = state.messages.len(),
        subscriptions = world.service.subscription_count(),
        "simulation finished"
    );

    client.shutdown();
    runner.await?;
    Ok(())
}

async fn wait_until(
    client: &SimChatClient,
    what: &str,
    predicate: impl FnMut(&Arc<ChatState>) -> bool,
) -> Result<(), Box<dyn Error>> {
    match wait_for(client, predicate).await {
        Some(state) if state.status != ChatStatus::Error => Ok(()),
        Some(state) => {
            Err(format!("{what}: client in error state: {:?}", state.error_notices).into())
        },
        None => Err(format!("timed out waiting for {what}").into()),
    }
}
