//! Upstream error bodies → unified error taxonomy.

use http::StatusCode;
use serde_json::Value;

use crate::messages::unified::{
    ERROR_TYPE_API, ERROR_TYPE_AUTHENTICATION, ERROR_TYPE_INVALID_REQUEST, ERROR_TYPE_NOT_FOUND,
    ERROR_TYPE_OVERLOADED, ERROR_TYPE_PERMISSION, ERROR_TYPE_RATE_LIMIT, ERROR_TYPE_REQUEST_TOO_LARGE, UnifiedError,
};

/// Translates a non-success upstream response.
///
/// Accepts `{"error": {...}}`, a bare error object, or an array of either.
/// The first of `type`, `status` and `code` that names a known kind decides
/// the unified type. When none is known, the first present value passes
/// through verbatim. Bodies that are not JSON become an `api_error` naming
/// the status.
pub(crate) fn translate_http_error(status: StatusCode, body: &str) -> UnifiedError {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        log::debug!("Upstream error body is not JSON ({} bytes)", body.len());
        return UnifiedError::api_error(status_line(status));
    };

    let envelope = match &value {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };

    let error = envelope.get("error").unwrap_or(envelope);

    if !error.is_object() {
        return match error.as_str() {
            Some(message) => UnifiedError::new(type_from_status(status), message),
            None => UnifiedError::api_error(status_line(status)),
        };
    }

    let kinds: Vec<&str> = ["type", "status", "code"]
        .iter()
        .filter_map(|key| error.get(key).and_then(Value::as_str))
        .filter(|kind| !kind.is_empty())
        .collect();

    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status_line(status));

    let error_type = match kinds.iter().find_map(|kind| map_type(kind)) {
        Some(mapped) => mapped.to_string(),
        None => match kinds.first() {
            Some(kind) => kind.to_string(),
            None => type_from_status(status).to_string(),
        },
    };

    UnifiedError::new(error_type, message)
}

fn map_type(kind: &str) -> Option<&'static str> {
    let mapped = match kind {
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "invalid_request" => ERROR_TYPE_INVALID_REQUEST,
        "UNAUTHENTICATED" | "invalid_api_key" | "authentication_error" => ERROR_TYPE_AUTHENTICATION,
        "PERMISSION_DENIED" | "permission_denied" => ERROR_TYPE_PERMISSION,
        "NOT_FOUND" | "model_not_found" => ERROR_TYPE_NOT_FOUND,
        "request_too_large" | "context_length_exceeded" => ERROR_TYPE_REQUEST_TOO_LARGE,
        "RESOURCE_EXHAUSTED" | "rate_limit_exceeded" | "insufficient_quota" => ERROR_TYPE_RATE_LIMIT,
        "INTERNAL" | "server_error" => ERROR_TYPE_API,
        "UNAVAILABLE" | "overloaded" => ERROR_TYPE_OVERLOADED,
        _ => return None,
    };

    Some(mapped)
}

fn type_from_status(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => ERROR_TYPE_INVALID_REQUEST,
        401 => ERROR_TYPE_AUTHENTICATION,
        403 => ERROR_TYPE_PERMISSION,
        404 => ERROR_TYPE_NOT_FOUND,
        413 => ERROR_TYPE_REQUEST_TOO_LARGE,
        429 => ERROR_TYPE_RATE_LIMIT,
        503 | 529 => ERROR_TYPE_OVERLOADED,
        _ => ERROR_TYPE_API,
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}
