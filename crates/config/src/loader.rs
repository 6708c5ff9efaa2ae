use std::path::Path;

use indoc::indoc;

use crate::{Config, Error, ProviderConfig, ProviderType};

pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())?;

    parse(&content)
}

pub(crate) fn parse(content: &str) -> crate::Result<Config> {
    let config: Config = toml::from_str(content)?;

    validate_has_providers(&config)?;

    for (name, provider) in &config.providers {
        validate_provider(name, provider)?;

        if provider.api_key.is_none() {
            log::warn!("Provider '{name}' has no api_key configured; every request must supply a credential");
        }
    }

    Ok(config)
}

fn validate_has_providers(config: &Config) -> crate::Result<()> {
    if config.providers.is_empty() {
        return Err(Error::Validation(
            indoc! {r#"
                No providers configured. The gateway requires at least one upstream provider.

                Example configuration:

                  [providers.openai]
                  base_url = "https://api.openai.com"
                  api_key = "sk-..."
            "#}
            .trim_end()
            .to_string(),
        ));
    }

    Ok(())
}

fn validate_provider(name: &str, provider: &ProviderConfig) -> crate::Result<()> {
    if provider.base_url.host_str().is_none() {
        return Err(Error::Validation(format!(
            "Provider '{name}' has a base_url without a host: {}",
            provider.base_url
        )));
    }

    if let Some(path) = &provider.completion_path
        && !path.starts_with('/')
    {
        return Err(Error::Validation(format!(
            "Provider '{name}' has a completion_path that does not start with '/': {path}"
        )));
    }

    let provider_type = provider.provider_type;

    if provider.api_version.is_some() && !matches!(provider_type, None | Some(ProviderType::Enterprise)) {
        return Err(Error::Validation(format!(
            "Provider '{name}' sets api_version, which only applies to enterprise providers"
        )));
    }

    if provider.profile_arn.is_some() && !matches!(provider_type, None | Some(ProviderType::Codewhisperer)) {
        return Err(Error::Validation(format!(
            "Provider '{name}' sets profile_arn, which only applies to codewhisperer providers"
        )));
    }

    Ok(())
}
