use http::StatusCode;
use thiserror::Error;

use crate::messages::unified::{
    ERROR_TYPE_API, ERROR_TYPE_AUTHENTICATION, ERROR_TYPE_INVALID_REQUEST, UnifiedError, UnifiedErrorResponse,
};

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Gateway errors with the HTTP status and unified error type they surface as.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The inbound request is malformed or incomplete.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Neither the provider configuration nor the caller supplied a credential.
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// The provider answered with a non-success status. The body is already translated.
    #[error("Upstream error ({status}): {}", .error.message)]
    UpstreamHttp { status: StatusCode, error: UnifiedError },

    /// The provider answered successfully, but the body could not be decoded.
    #[error("Failed to parse upstream response: {0}")]
    UpstreamParse(String),

    /// Network or connection error. The detail is logged, never sent to clients.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Exchanging the caller's credential for an access token failed.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// Internal server error.
    /// If Some(message), it came from a provider and can be shown.
    /// If None, it's an internal error and should not leak details.
    #[error("Internal server error")]
    InternalError(Option<String>),
}

impl LlmError {
    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::MissingCredential(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamHttp { status, .. } => *status,
            Self::UpstreamParse(_) | Self::ConnectionError(_) => StatusCode::BAD_GATEWAY,
            Self::TokenExchange(_) => StatusCode::UNAUTHORIZED,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the unified error type string for the response.
    pub fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) | Self::MissingCredential(_) => ERROR_TYPE_INVALID_REQUEST,
            Self::UpstreamHttp { error, .. } => &error.r#type,
            Self::TokenExchange(_) => ERROR_TYPE_AUTHENTICATION,
            Self::UpstreamParse(_) | Self::ConnectionError(_) | Self::InternalError(_) => ERROR_TYPE_API,
        }
    }

    /// Message that is safe to expose to API consumers.
    pub fn client_message(&self) -> String {
        match self {
            Self::UpstreamHttp { error, .. } => error.message.clone(),
            Self::InternalError(Some(provider_msg)) => provider_msg.clone(),
            Self::InternalError(None) => "Internal server error".to_string(),
            Self::ConnectionError(_) => "Failed to reach upstream provider".to_string(),
            _ => self.to_string(),
        }
    }

    /// The error envelope sent to clients.
    pub fn to_unified(&self) -> UnifiedErrorResponse {
        UnifiedErrorResponse::from(UnifiedError::new(self.error_type(), self.client_message()))
    }
}
