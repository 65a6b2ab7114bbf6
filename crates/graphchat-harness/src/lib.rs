//! Deterministic simulation harness for the Graph chat client.
//!
//! In-memory implementations of every collaborator the runtime needs, so the
//! same [`graphchat_app::StatefulChatClient`] that runs in production runs
//! against a reproducible service.
//!
//! # Components
//!
//! - [`SimEnv`]: virtual clock and seeded RNG
//! - [`SimService`]: threads, messages and subscriptions, with fault
//!   injection; [`SimGraph`] and [`SimTransport`] expose it to the runtime
//! - [`SimIdentity`]: scriptable sign-in state
//! - [`SimWorld`]: all of the above wired together
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties every published snapshot must
//! satisfy. Use [`InvariantRegistry::standard()`] after each simulated step.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod sim_identity;
pub mod sim_service;
pub mod world;

pub use invariants::{Invariant, InvariantRegistry, InvariantResult, Violation};
pub use sim_env::SimEnv;
pub use sim_identity::SimIdentity;
pub use sim_service::{HeldCalls, Operation, SimError, SimGraph, SimService, SimTransport};
pub use world::{SIM_USER, SIM_USER_NAME, SimChatClient, SimWorld, assert_invariants, wait_for};
