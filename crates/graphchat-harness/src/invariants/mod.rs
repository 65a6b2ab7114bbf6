//! Invariant checking for chat state snapshots.
//!
//! Invariants are properties every published [`ChatState`] must satisfy,
//! whatever sequence of intents, completions and notifications produced it.
//! They are checked after every step of a simulation or property test.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.assert_all(&client.get_state(), "after send");
//! ```

mod checks;

use graphchat_client::ChatState;

pub use checks::{
    CursorMatchesLoadMore, MessagesSorted, PendingMessagesAreMine, TombstonesAreHtml,
    UniqueMessageIds,
};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property that must hold for every snapshot.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against a snapshot.
    fn check(&self, state: &ChatState) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with every standard invariant.
    ///
    /// Includes:
    /// - [`MessagesSorted`]: ascending creation order
    /// - [`UniqueMessageIds`]: no id appears twice
    /// - [`PendingMessagesAreMine`]: unconfirmed entries belong to the user
    /// - [`CursorMatchesLoadMore`]: load-more offered iff a cursor exists
    /// - [`TombstonesAreHtml`]: deleted entries show the placeholder
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(MessagesSorted);
        registry.add(UniqueMessageIds);
        registry.add(PendingMessagesAreMine);
        registry.add(CursorMatchesLoadMore);
        registry.add(TombstonesAreHtml);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants. Returns every violation found.
    pub fn check_all(&self, state: &ChatState) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &ChatState, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
