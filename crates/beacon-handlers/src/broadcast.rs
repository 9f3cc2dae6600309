//! Plain relay channel family.
//!
//! Owns the `broadcast/` namespace: open topics anyone may subscribe
//! to, with publishing gated on write entitlement for the topic. This
//! is the one family where the broadcast equals the client's input;
//! the payload is validated and then echoed explicitly.

use crate::access::AccessPolicy;
use async_trait::async_trait;
use beacon_core::{
    AdminRequest, AdminResponse, ChannelBus, ChannelHandler, ChannelOptions, ChannelPath,
    ClientInfo, LiveError, PublishEvent, SubscribeEvent,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;

/// Handler for `broadcast/<topic>` channels.
pub struct BroadcastHandler {
    access: Arc<dyn AccessPolicy>,
    bus: Arc<ChannelBus>,
}

impl BroadcastHandler {
    /// Create the broadcast handler.
    #[must_use]
    pub fn new(access: Arc<dyn AccessPolicy>, bus: Arc<ChannelBus>) -> Self {
        Self { access, bus }
    }

    fn validate(payload: &[u8]) -> Result<(), LiveError> {
        serde_json::from_slice::<Value>(payload)
            .map(|_| ())
            .map_err(|e| LiveError::InvalidPayload(e.to_string()))
    }
}

#[async_trait]
impl ChannelHandler for BroadcastHandler {
    fn options(&self, _path: &ChannelPath) -> ChannelOptions {
        ChannelOptions::default()
    }

    async fn on_subscribe(
        &self,
        _client: &ClientInfo,
        _event: SubscribeEvent,
    ) -> Result<(), LiveError> {
        // Broadcast topics are open to any authenticated session.
        Ok(())
    }

    async fn on_publish(
        &self,
        client: &ClientInfo,
        event: PublishEvent,
    ) -> Result<Option<Bytes>, LiveError> {
        if !self.access.can_write(client.user_id, event.channel.suffix()) {
            return Err(LiveError::Unauthorized);
        }
        Self::validate(&event.payload)?;
        // Echo the input as-is; relaying verbatim is this family's
        // explicit choice, not a default.
        Ok(Some(event.payload))
    }

    /// `GET` answers the topic's subscriber count; `POST` injects a
    /// server-originated message without an acting client.
    async fn handle_http(&self, req: &AdminRequest, channel: &ChannelPath) -> AdminResponse {
        match req.method.as_str() {
            "GET" => AdminResponse::ok(
                json!({
                    "channel": channel.as_str(),
                    "subscribers": self.bus.subscriber_count(channel.as_str()),
                })
                .to_string(),
            ),
            "POST" => match Self::validate(&req.body) {
                Ok(()) => {
                    let published = self.bus.publish(channel.as_str(), req.body.clone());
                    AdminResponse::ok(json!({ "published": published }).to_string())
                }
                Err(e) => AdminResponse::json_error(400, &e.to_string()),
            },
            _ => AdminResponse::method_not_allowed(),
        }
    }
}
