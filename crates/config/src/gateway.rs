use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Settings shared by every upstream provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Total timeout for a single upstream request.
    #[serde(deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,

    /// Cached access tokens are refreshed once they come this close to expiry.
    #[serde(deserialize_with = "deserialize_duration")]
    pub token_expiry_buffer: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            token_expiry_buffer: Duration::from_secs(60),
        }
    }
}
