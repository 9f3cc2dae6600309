//! The channel handler contract.
//!
//! A handler owns the behavior of one channel family: what subscribing
//! and publishing mean there, which options the channel carries, and how
//! administrative HTTP requests scoped to its channels are answered.
//! Handlers are constructed once at startup and live for the process.

use crate::error::LiveError;
use crate::event::{ClientInfo, PublishEvent, SubscribeEvent};
use crate::options::ChannelOptions;
use crate::path::ChannelPath;
use async_trait::async_trait;
use bytes::Bytes;

/// A transport-neutral administrative HTTP request.
///
/// The external HTTP server adapts its own request type onto this before
/// handing it to the registry or a handler.
#[derive(Debug, Clone)]
pub struct AdminRequest {
    /// HTTP method, uppercase (`GET`, `POST`, ...).
    pub method: String,
    /// Channel path the request targets.
    pub path: String,
    /// Request body.
    pub body: Bytes,
}

impl AdminRequest {
    /// Create an administrative request.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            body: body.into(),
        }
    }
}

/// Response written back to the administrative HTTP caller.
#[derive(Debug, Clone)]
pub struct AdminResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, JSON unless noted otherwise.
    pub body: Bytes,
}

impl AdminResponse {
    /// A 200 response with the given body.
    #[must_use]
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// A 404 response.
    #[must_use]
    pub fn not_found(message: &str) -> Self {
        Self::json_error(404, message)
    }

    /// A 405 response.
    #[must_use]
    pub fn method_not_allowed() -> Self {
        Self::json_error(405, "method not allowed")
    }

    /// An error response with a JSON `{"error": ...}` body.
    #[must_use]
    pub fn json_error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self {
            status,
            body: Bytes::from(body),
        }
    }
}

/// Behavior of one channel family.
///
/// Implementations must be internally synchronized: every method can be
/// called concurrently from many sessions against the same instance.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Capability options for one channel.
    ///
    /// Called on every subscribe and publish; must be bounded and
    /// non-blocking, with no I/O and no locks held across the call.
    fn options(&self, path: &ChannelPath) -> ChannelOptions;

    /// Authorize a subscribe attempt.
    ///
    /// May emit telemetry but must not mutate shared resource state.
    ///
    /// # Errors
    ///
    /// `Unauthorized` when the identity is not entitled to observe the
    /// channel; `InvalidChannelId` when the suffix is malformed or names
    /// a nonexistent resource.
    async fn on_subscribe(
        &self,
        client: &ClientInfo,
        event: SubscribeEvent,
    ) -> Result<(), LiveError>;

    /// Authorize and optionally transform a publish attempt.
    ///
    /// Write entitlement is verified here independently of subscribe
    /// entitlement. `Ok(Some(bytes))` broadcasts exactly those bytes in
    /// place of the client's input; `Ok(None)` accepts the publish but
    /// broadcasts nothing.
    ///
    /// # Errors
    ///
    /// `Unauthorized` or `InvalidPayload`; any error prevents broadcast.
    async fn on_publish(
        &self,
        client: &ClientInfo,
        event: PublishEvent,
    ) -> Result<Option<Bytes>, LiveError>;

    /// Administrative HTTP entry point scoped to one channel.
    async fn handle_http(&self, req: &AdminRequest, channel: &ChannelPath) -> AdminResponse {
        let _ = (req, channel);
        AdminResponse::not_found("no administrative interface for this channel")
    }
}
