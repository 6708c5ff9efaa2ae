//! Configuration for the gateway and its upstream providers.

mod error;
mod gateway;
mod loader;
mod provider;

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

pub use error::Error;
pub use gateway::GatewayConfig;
pub use provider::{DEFAULT_API_VERSION, ModelConfig, ProviderConfig, ProviderType};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Upstream providers, keyed by a name used in logs and errors.
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
}

impl Config {
    /// Reads, parses and validates a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Config> {
        loader::load(path)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(content: &str) -> crate::Result<Config> {
        loader::parse(content)
    }
}
