//! A configured upstream: adapter, HTTP client and configuration in one place.

use config::{GatewayConfig, ProviderConfig};
use reqwest::Client;
use secrecy::SecretString;

use crate::{
    LlmError,
    auth::CachedAuth,
    http_client::http_client,
    messages::unified::{UnifiedChatRequest, UnifiedResponse},
    provider::ProviderAdapter,
    stream::ChatEventStream,
};

/// Sends unified requests to one configured provider and translates what comes back.
#[derive(Debug, Clone)]
pub struct Upstream {
    name: String,
    adapter: ProviderAdapter,
    client: Client,
    config: ProviderConfig,
}

impl Upstream {
    pub fn new(
        name: impl Into<String>,
        config: &ProviderConfig,
        gateway: &GatewayConfig,
        auth: Option<CachedAuth>,
    ) -> crate::Result<Self> {
        let name = name.into();
        let adapter = ProviderAdapter::new(config, auth);

        log::debug!("Provider '{name}' uses the {} adapter", adapter.name());

        Ok(Self {
            name,
            adapter,
            client: http_client(gateway.request_timeout)?,
            config: config.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter(&self) -> &ProviderAdapter {
        &self.adapter
    }

    /// Sends a non-streaming completion. `credential` overrides the configured API key.
    pub async fn completion(
        &self,
        request: UnifiedChatRequest,
        credential: Option<&SecretString>,
    ) -> crate::Result<UnifiedResponse> {
        let model = request.model.clone();
        let response = self.send(request, credential, false).await?;

        let body = response.bytes().await.map_err(|e| {
            log::error!("Failed to read {} response body: {e}", self.name);
            LlmError::ConnectionError(format!("Failed to read response body: {e}"))
        })?;

        self.adapter.transform_response(&body, &model)
    }

    /// Sends a streaming completion and returns the translated event stream.
    pub async fn completion_stream(
        &self,
        request: UnifiedChatRequest,
        credential: Option<&SecretString>,
    ) -> crate::Result<ChatEventStream> {
        let model = request.model.clone();
        let response = self.send(request, credential, true).await?;

        Ok(self.adapter.transform_stream(response, &model))
    }

    async fn send(
        &self,
        mut request: UnifiedChatRequest,
        credential: Option<&SecretString>,
        stream: bool,
    ) -> crate::Result<reqwest::Response> {
        let credential = credential.or(self.config.api_key.as_ref()).ok_or_else(|| {
            LlmError::MissingCredential(format!(
                "provider '{}' has no api_key and the request carried none",
                self.name
            ))
        })?;

        let upstream_model = self.config.upstream_model(&request.model).to_string();

        if upstream_model != request.model {
            log::debug!("Renaming model '{}' to '{upstream_model}'", request.model);
        }

        request.model = upstream_model;
        request.stream = Some(stream);

        let path = match &self.config.completion_path {
            Some(path) => path.clone(),
            None => self.adapter.completion_path(&request.model),
        };

        let url = self.config.base_url.join(&path).map_err(|e| {
            log::error!("Invalid completion URL for provider '{}': {e}", self.name);
            LlmError::InternalError(None)
        })?;

        let body = self.adapter.transform_request(request)?.to_body()?;
        let headers = self.adapter.auth_headers(credential).await?;

        log::debug!("Sending {} request to {}", self.adapter.name(), url.path());

        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                log::error!("Failed to send request to {}: {e}", self.name);
                LlmError::ConnectionError(format!("Failed to send request to {}: {e}", self.name))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::error!("{} API error ({status}): {error_text}", self.name);

            return Err(LlmError::UpstreamHttp {
                status,
                error: self.adapter.transform_error(status, &error_text),
            });
        }

        Ok(response)
    }
}
