use std::time::Duration;

use reqwest::Client;

/// Builds the client shared by every request to one upstream.
pub(crate) fn http_client(request_timeout: Duration) -> crate::Result<Client> {
    let mut headers = http::HeaderMap::new();
    headers.insert(http::header::CONNECTION, http::HeaderValue::from_static("keep-alive"));

    Client::builder()
        .timeout(request_timeout)
        // The pool has no TTL on connections, so a short idle timeout is what
        // lets DNS changes get picked up.
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
        .build()
        .map_err(|e| {
            log::error!("Failed to build HTTP client: {e}");
            crate::LlmError::InternalError(None)
        })
}
