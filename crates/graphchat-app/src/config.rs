//! Runtime configuration.

use std::time::Duration;

use serde::Deserialize;

/// Chat runtime configuration.
///
/// Every field has a default, so a host may deserialize a partial document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatConfig {
    /// Messages fetched per page, initial load and load-more alike.
    pub messages_per_call: usize,
    /// How long before expiry a notification subscription is renewed.
    #[serde(with = "secs")]
    pub renewal_margin: Duration,
    /// Lifetime requested for new subscriptions. The service may shorten it.
    #[serde(with = "secs")]
    pub subscription_lifetime: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            messages_per_call: graphchat_client::DEFAULT_PAGE_SIZE,
            renewal_margin: Duration::from_secs(5 * 60),
            subscription_lifetime: Duration::from_secs(60 * 60),
        }
    }
}

impl ChatConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Durations as whole seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
