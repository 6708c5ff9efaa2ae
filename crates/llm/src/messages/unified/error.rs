use serde::{Deserialize, Serialize};

pub const ERROR_TYPE_INVALID_REQUEST: &str = "invalid_request_error";
pub const ERROR_TYPE_AUTHENTICATION: &str = "authentication_error";
pub const ERROR_TYPE_PERMISSION: &str = "permission_error";
pub const ERROR_TYPE_NOT_FOUND: &str = "not_found_error";
pub const ERROR_TYPE_REQUEST_TOO_LARGE: &str = "request_too_large";
pub const ERROR_TYPE_RATE_LIMIT: &str = "rate_limit_error";
pub const ERROR_TYPE_API: &str = "api_error";
pub const ERROR_TYPE_OVERLOADED: &str = "overloaded_error";

/// The error envelope returned to clients: `{"type": "error", "error": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedErrorResponse {
    #[serde(rename = "type")]
    pub r#type: ErrorResponseType,
    pub error: UnifiedError,
}

impl From<UnifiedError> for UnifiedErrorResponse {
    fn from(error: UnifiedError) -> Self {
        Self {
            r#type: ErrorResponseType::Error,
            error,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorResponseType {
    #[default]
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedError {
    /// One of the `ERROR_TYPE_*` values, or a provider type passed through verbatim.
    #[serde(rename = "type")]
    pub r#type: String,

    pub message: String,
}

impl UnifiedError {
    pub fn new(r#type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            r#type: r#type.into(),
            message: message.into(),
        }
    }

    pub fn invalid_request_error(message: impl Into<String>) -> Self {
        Self::new(ERROR_TYPE_INVALID_REQUEST, message)
    }

    pub fn authentication_error(message: impl Into<String>) -> Self {
        Self::new(ERROR_TYPE_AUTHENTICATION, message)
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::new(ERROR_TYPE_API, message)
    }
}
