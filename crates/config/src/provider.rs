//! Upstream provider configuration.

use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// API version sent to enterprise deployments when none is configured.
pub const DEFAULT_API_VERSION: &str = "2024-10-21";

/// Explicit provider flavor. When absent, the flavor is inferred from the base URL host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    /// Generic OpenAI-compatible endpoint.
    Openai,
    /// Gemini through its OpenAI-compatible surface.
    Gemini,
    /// Enterprise gateway with per-deployment paths.
    Enterprise,
    /// Proprietary assistant endpoint with a binary event stream.
    Codewhisperer,
}

/// Per-model settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// The model name sent upstream. Defaults to the map key.
    #[serde(default)]
    pub rename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(rename = "type", default)]
    pub provider_type: Option<ProviderType>,

    /// Scheme and host of the upstream. A path, if present, is replaced by the completion path.
    pub base_url: Url,

    /// Static credential. Callers can override it per request.
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Overrides the completion path of the selected provider flavor.
    #[serde(default)]
    pub completion_path: Option<String>,

    #[serde(default)]
    pub api_version: Option<String>,

    #[serde(default)]
    pub profile_arn: Option<String>,

    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
}

impl ProviderConfig {
    pub fn api_version(&self) -> &str {
        self.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }

    /// Resolves a client-facing model name into the upstream one.
    pub fn upstream_model<'a>(&'a self, model: &'a str) -> &'a str {
        self.models
            .get(model)
            .and_then(|config| config.rename.as_deref())
            .unwrap_or(model)
    }
}
