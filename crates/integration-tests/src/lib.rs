//! Mock upstream providers and helpers for driving [`llm::Upstream`] end to end.

use std::{
    convert::Infallible,
    net::SocketAddr,
    str::FromStr,
    sync::{Arc, Mutex, Once},
};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{OriginalUri, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use config::Config;
use futures::{StreamExt, stream};
use llm::{CachedAuth, ChatEventStream, StreamEvent, UnifiedChatRequest, Upstream};
use logforth::{append::Stderr, filter::EnvFilter};
use serde_json::Value;
use tokio::net::TcpListener;

static LOGGER: Once = Once::new();

/// Installs stderr logging once per test process. `TEST_LOG` overrides the filter.
pub fn init_logger() {
    LOGGER.call_once(|| {
        let filter = std::env::var("TEST_LOG").unwrap_or_else(|_| "warn".to_string());

        logforth::builder()
            .dispatch(|d| {
                let filter = EnvFilter::from_str(&filter)
                    .unwrap_or_else(|_| EnvFilter::from_str("warn").expect("default filter should be valid"));

                d.filter(filter).append(Stderr::default())
            })
            .apply();
    });
}

/// What a mock upstream answers with.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A JSON body with the given status.
    Json(StatusCode, Value),
    /// A plain body with the given status.
    Text(StatusCode, String),
    /// An SSE body, one `data:` line per payload.
    Sse(Vec<String>),
    /// A binary body sent in the given chunks.
    Chunks(Vec<Vec<u8>>),
}

impl MockReply {
    pub fn ok(body: Value) -> Self {
        Self::Json(StatusCode::OK, body)
    }

    /// SSE payloads followed by `[DONE]`.
    pub fn sse<I, T>(payloads: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        let mut payloads: Vec<String> = payloads.into_iter().map(|p| p.to_string()).collect();
        payloads.push("[DONE]".to_string());

        Self::Sse(payloads)
    }
}

impl IntoResponse for MockReply {
    fn into_response(self) -> Response {
        match self {
            MockReply::Json(status, body) => (status, axum::Json(body)).into_response(),
            MockReply::Text(status, body) => (status, body).into_response(),
            MockReply::Sse(payloads) => {
                let frames = payloads
                    .into_iter()
                    .map(|payload| Ok::<_, Infallible>(Bytes::from(format!("data: {payload}\n\n"))));

                Response::builder()
                    .header(CONTENT_TYPE, "text/event-stream")
                    .body(Body::from_stream(stream::iter(frames)))
                    .expect("static response parts are valid")
            }
            MockReply::Chunks(chunks) => {
                let chunks = chunks.into_iter().map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk)));

                Response::builder()
                    .header(CONTENT_TYPE, "application/vnd.amazon.eventstream")
                    .body(Body::from_stream(stream::iter(chunks)))
                    .expect("static response parts are valid")
            }
        }
    }
}

/// One request as the mock upstream received it.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    /// Path and query.
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    reply: MockReply,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

/// An upstream provider listening on a random local port that answers every POST with one reply.
pub struct MockUpstream {
    address: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl MockUpstream {
    pub async fn start(reply: MockReply) -> Self {
        init_logger();

        let received = Arc::new(Mutex::new(Vec::new()));

        let state = MockState {
            reply,
            received: received.clone(),
        };

        let app = Router::new().fallback(handle).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { address, received }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }

    /// The only request received so far.
    pub fn request(&self) -> ReceivedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one upstream request");

        requests.into_iter().next().unwrap()
    }
}

async fn handle(
    State(state): State<MockState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);

    state.received.lock().unwrap().push(ReceivedRequest {
        uri: uri.to_string(),
        headers,
        body,
    });

    state.reply
}

/// Builds an upstream from a configuration with exactly one provider.
pub fn upstream(config: &str) -> Upstream {
    upstream_with_auth(config, None)
}

pub fn upstream_with_auth(config: &str, auth: Option<CachedAuth>) -> Upstream {
    let config = Config::from_toml(config).unwrap();
    let (name, provider) = config.providers.first().unwrap();

    Upstream::new(name.clone(), provider, &config.gateway, auth).unwrap()
}

pub fn request(value: Value) -> UnifiedChatRequest {
    serde_json::from_value(value).unwrap()
}

/// Drains a stream, failing the test on the first error.
pub async fn collect_events(stream: ChatEventStream) -> Vec<StreamEvent> {
    stream.map(|event| event.unwrap()).collect().await
}

/// Drains a stream, keeping errors.
pub async fn collect_results(stream: ChatEventStream) -> Vec<llm::Result<StreamEvent>> {
    stream.collect().await
}
