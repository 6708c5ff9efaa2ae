//! Protocol translation between the unified messages format and upstream LLM providers.
//!
//! An [`Upstream`] owns one configured provider. It translates a
//! [`UnifiedChatRequest`] into the provider's dialect, sends it, and turns the
//! reply back into a [`UnifiedResponse`] or a stream of unified events that
//! [`sse::frame_stream`] can put on the wire.

mod auth;
mod error;
mod http_client;
pub mod messages;
pub mod provider;
pub mod sse;
mod stream;
mod upstream;

pub use auth::{AccessToken, AuthProvider, CachedAuth, TokenCache};
pub use error::{LlmError, LlmResult as Result};
pub use messages::unified::{
    ContentBlock, StopReason, StreamEvent, UnifiedChatRequest, UnifiedError, UnifiedErrorResponse, UnifiedResponse,
    Usage,
};
pub use provider::{ProviderAdapter, resolve_provider_type};
pub use stream::ChatEventStream;
pub use upstream::Upstream;
