//! Provider adapters.
//!
//! Every upstream speaks one of four dialects. [`ProviderAdapter`] names the
//! dialect and bundles what differs between them: where completions are posted,
//! which headers carry the credential, and how requests, responses, streams and
//! error bodies are translated.

pub(crate) mod codewhisperer;
mod error;
pub(crate) mod openai;

use config::{ProviderConfig, ProviderType};
use http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use self::error::translate_http_error;

use crate::{
    LlmError,
    auth::CachedAuth,
    messages::{
        codewhisperer::CodeWhispererRequest,
        openai::{ChatCompletionRequest, ChatCompletionResponse},
        unified::{ThinkingConfig, UnifiedChatRequest, UnifiedError, UnifiedResponse},
    },
    stream::{ChatEventStream, forward},
};

const GEMINI_HOST: &str = "generativelanguage.googleapis.com";
const ENTERPRISE_HOST_SUFFIXES: [&str; 2] = [".openai.azure.com", ".cognitiveservices.azure.com"];
const CODEWHISPERER_HOST_PREFIXES: [&str; 2] = ["codewhisperer.", "q."];
const AMAZONAWS_SUFFIX: &str = ".amazonaws.com";

/// Picks the dialect of an upstream from its host. Unknown hosts are OpenAI-compatible.
pub fn resolve_provider_type(host: &str) -> ProviderType {
    let host = host.to_ascii_lowercase();

    if host == GEMINI_HOST {
        ProviderType::Gemini
    } else if ENTERPRISE_HOST_SUFFIXES.iter().any(|suffix| host.ends_with(suffix)) {
        ProviderType::Enterprise
    } else if host.ends_with(AMAZONAWS_SUFFIX)
        && CODEWHISPERER_HOST_PREFIXES
            .iter()
            .any(|prefix| host.starts_with(prefix))
    {
        ProviderType::Codewhisperer
    } else {
        ProviderType::Openai
    }
}

#[derive(Debug, Clone)]
pub enum ProviderAdapter {
    /// Generic OpenAI-compatible chat completions.
    OpenAI,
    /// Gemini's OpenAI-compatible surface. Thinking settings travel in `extra_body`.
    Gemini,
    /// Per-deployment paths with an `api-version` query.
    Enterprise {
        api_version: String,
        auth: Option<CachedAuth>,
    },
    /// The proprietary assistant endpoint.
    CodeWhisperer {
        profile_arn: Option<String>,
        auth: Option<CachedAuth>,
    },
}

/// A translated request, ready to be serialized.
#[derive(Debug)]
pub(crate) enum ProviderRequest {
    Chat(ChatCompletionRequest),
    CodeWhisperer(CodeWhispererRequest),
}

impl ProviderRequest {
    pub(crate) fn to_body(&self) -> crate::Result<Vec<u8>> {
        let body = match self {
            ProviderRequest::Chat(request) => sonic_rs::to_vec(request),
            ProviderRequest::CodeWhisperer(request) => sonic_rs::to_vec(request),
        };

        body.map_err(|e| LlmError::InvalidRequest(format!("Failed to serialize request: {e}")))
    }
}

impl ProviderAdapter {
    /// Builds the adapter for a configured provider. An explicit `type` wins over host matching.
    pub fn new(config: &ProviderConfig, auth: Option<CachedAuth>) -> Self {
        let provider_type = config
            .provider_type
            .unwrap_or_else(|| resolve_provider_type(config.base_url.host_str().unwrap_or_default()));

        match provider_type {
            ProviderType::Openai | ProviderType::Gemini => {
                if auth.is_some() {
                    log::debug!("Ignoring token exchange for {provider_type:?} provider, the credential is sent as-is");
                }

                if provider_type == ProviderType::Openai {
                    ProviderAdapter::OpenAI
                } else {
                    ProviderAdapter::Gemini
                }
            }
            ProviderType::Enterprise => ProviderAdapter::Enterprise {
                api_version: config.api_version().to_string(),
                auth,
            },
            ProviderType::Codewhisperer => ProviderAdapter::CodeWhisperer {
                profile_arn: config.profile_arn.clone(),
                auth,
            },
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderAdapter::OpenAI => ProviderType::Openai,
            ProviderAdapter::Gemini => ProviderType::Gemini,
            ProviderAdapter::Enterprise { .. } => ProviderType::Enterprise,
            ProviderAdapter::CodeWhisperer { .. } => ProviderType::Codewhisperer,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderAdapter::OpenAI => "openai",
            ProviderAdapter::Gemini => "gemini",
            ProviderAdapter::Enterprise { .. } => "enterprise",
            ProviderAdapter::CodeWhisperer { .. } => "codewhisperer",
        }
    }

    /// Path, relative to the base URL, that completions for `model` are posted to.
    pub fn completion_path(&self, model: &str) -> String {
        match self {
            ProviderAdapter::OpenAI => "/v1/chat/completions".to_string(),
            ProviderAdapter::Gemini => "/v1beta/openai/chat/completions".to_string(),
            ProviderAdapter::Enterprise { api_version, .. } => {
                format!("/openai/deployments/{model}/chat/completions?api-version={api_version}")
            }
            ProviderAdapter::CodeWhisperer { .. } => "/generateAssistantResponse".to_string(),
        }
    }

    /// Headers that authenticate a request with `credential`, exchanging it first when
    /// the adapter carries an auth provider.
    pub async fn auth_headers(&self, credential: &SecretString) -> crate::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match self {
            ProviderAdapter::OpenAI | ProviderAdapter::Gemini => {
                headers.insert(AUTHORIZATION, bearer(credential)?);
            }
            ProviderAdapter::Enterprise { auth: Some(auth), .. }
            | ProviderAdapter::CodeWhisperer { auth: Some(auth), .. } => {
                let token = auth.token(credential).await?;
                headers.insert(AUTHORIZATION, bearer(&token)?);
            }
            ProviderAdapter::Enterprise { auth: None, .. } => {
                headers.insert("api-key", sensitive(credential.expose_secret())?);
            }
            ProviderAdapter::CodeWhisperer { auth: None, .. } => {
                headers.insert(AUTHORIZATION, bearer(credential)?);
            }
        }

        Ok(headers)
    }

    pub(crate) fn transform_request(&self, request: UnifiedChatRequest) -> crate::Result<ProviderRequest> {
        match self {
            ProviderAdapter::OpenAI | ProviderAdapter::Enterprise { .. } => {
                Ok(ProviderRequest::Chat(ChatCompletionRequest::try_from(request)?))
            }
            ProviderAdapter::Gemini => {
                let thinking = request.thinking;
                let mut request = ChatCompletionRequest::try_from(request)?;

                if let Some(ThinkingConfig::Enabled { budget_tokens }) = thinking {
                    request.reasoning_effort = None;
                    request.extra_body = Some(json!({
                        "google": {
                            "thinking_config": {
                                "thinking_budget": budget_tokens,
                                "include_thoughts": true
                            }
                        }
                    }));
                }

                Ok(ProviderRequest::Chat(request))
            }
            ProviderAdapter::CodeWhisperer { profile_arn, .. } => Ok(ProviderRequest::CodeWhisperer(
                codewhisperer::to_codewhisperer(request, profile_arn.clone())?,
            )),
        }
    }

    /// Translates a complete success body. The response carries the client-facing `model`.
    pub(crate) fn transform_response(&self, body: &[u8], model: &str) -> crate::Result<UnifiedResponse> {
        if let ProviderAdapter::CodeWhisperer { .. } = self {
            return Ok(codewhisperer::parse_response(body, message_id(), model.to_string()));
        }

        let response: ChatCompletionResponse = sonic_rs::from_slice(body).map_err(|e| {
            log::error!("Failed to parse {} chat completion response: {e}", self.name());
            log::debug!("Response parsing failed, length: {} bytes", body.len());

            LlmError::UpstreamParse(e.to_string())
        })?;

        let mut response = UnifiedResponse::from(response);
        response.model = model.to_string();

        if response.id.is_empty() {
            response.id = message_id();
        }

        Ok(response)
    }

    /// Translates a streaming success body into unified events.
    pub(crate) fn transform_stream(&self, response: reqwest::Response, model: &str) -> ChatEventStream {
        use eventsource_stream::Eventsource;
        use futures::StreamExt;

        match self {
            ProviderAdapter::CodeWhisperer { .. } => forward(
                response.bytes_stream(),
                codewhisperer::CodeWhispererStreamProcessor::new(message_id(), model),
            ),
            _ => {
                let data = response
                    .bytes_stream()
                    .eventsource()
                    .map(|event| event.map(|event| event.data));

                forward(data, openai::OpenAIStreamProcessor::new(message_id(), model))
            }
        }
    }

    pub(crate) fn transform_error(&self, status: http::StatusCode, body: &str) -> UnifiedError {
        translate_http_error(status, body)
    }
}

fn message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

fn bearer(credential: &SecretString) -> crate::Result<HeaderValue> {
    sensitive(&format!("Bearer {}", credential.expose_secret()))
}

fn sensitive(value: &str) -> crate::Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| LlmError::InvalidRequest("credential contains characters not allowed in a header".to_string()))?;

    value.set_sensitive(true);

    Ok(value)
}
