//! Live cursor position channel family.
//!
//! Owns the `cursor/` namespace: one channel per document
//! (`cursor/<doc>`). Everyone who can read the document may share and
//! observe cursor positions; sharing a cursor is not an edit, so read
//! entitlement is what gets re-verified on publish. Payloads are
//! normalized before broadcast: only the coordinates survive, stamped
//! with the sender.

use crate::access::AccessPolicy;
use async_trait::async_trait;
use beacon_core::{
    ChannelHandler, ChannelOptions, ChannelPath, ClientInfo, LiveError, PublishEvent,
    SubscribeEvent,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;

/// Handler for `cursor/<doc>` channels.
pub struct CursorHandler {
    access: Arc<dyn AccessPolicy>,
}

impl CursorHandler {
    /// Create the cursor handler.
    #[must_use]
    pub fn new(access: Arc<dyn AccessPolicy>) -> Self {
        Self { access }
    }

    fn doc<'a>(&self, channel: &'a ChannelPath) -> Result<&'a str, LiveError> {
        let doc = channel.suffix().split('/').next().unwrap_or_default();
        if doc.is_empty() {
            return Err(LiveError::InvalidChannelId(
                "cursor channel has no document".into(),
            ));
        }
        if !self.access.exists(doc) {
            return Err(LiveError::InvalidChannelId(format!(
                "unknown document: {doc}"
            )));
        }
        Ok(doc)
    }

    fn check_read(&self, client: &ClientInfo, doc: &str) -> Result<(), LiveError> {
        if self.access.can_read(client.user_id, doc) {
            Ok(())
        } else {
            Err(LiveError::Unauthorized)
        }
    }
}

#[async_trait]
impl ChannelHandler for CursorHandler {
    fn options(&self, _path: &ChannelPath) -> ChannelOptions {
        // Cursor positions are ephemeral; presence matters, history not.
        ChannelOptions::with_presence()
    }

    async fn on_subscribe(
        &self,
        client: &ClientInfo,
        event: SubscribeEvent,
    ) -> Result<(), LiveError> {
        let doc = self.doc(&event.channel)?;
        self.check_read(client, doc)
    }

    async fn on_publish(
        &self,
        client: &ClientInfo,
        event: PublishEvent,
    ) -> Result<Option<Bytes>, LiveError> {
        let doc = self.doc(&event.channel)?;
        self.check_read(client, doc)?;

        let value: Value = serde_json::from_slice(&event.payload)
            .map_err(|e| LiveError::InvalidPayload(e.to_string()))?;
        let (Some(x), Some(y)) = (
            value.get("x").and_then(Value::as_f64),
            value.get("y").and_then(Value::as_f64),
        ) else {
            return Err(LiveError::InvalidPayload(
                "cursor payload needs numeric x and y".into(),
            ));
        };

        let normalized = json!({
            "doc": doc,
            "x": x,
            "y": y,
            "user": client.user_id,
            "session": client.session.as_str(),
        });
        Ok(Some(Bytes::from(normalized.to_string())))
    }
}
