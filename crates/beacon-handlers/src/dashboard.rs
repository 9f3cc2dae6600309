//! Dashboard edits channel family.
//!
//! Owns the `dashboard/` namespace: one channel per dashboard uid
//! (`dashboard/<uid>`). Subscribing requires viewer entitlement on the
//! dashboard unless it is public; publishing requires editor
//! entitlement. The broadcast payload is always re-encoded with the uid
//! and the acting user stamped in; save and delete events additionally
//! advertise dashboard activity on the side channel.

use crate::access::AccessPolicy;
use async_trait::async_trait;
use beacon_core::activity::{notify_detached, ActivityAction, ActivityEvent, ActivityNotifier};
use beacon_core::{
    AdminRequest, AdminResponse, ChannelBus, ChannelHandler, ChannelOptions, ChannelPath,
    ClientInfo, LiveError, PublishEvent, SubscribeEvent,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Handler for `dashboard/<uid>` channels.
pub struct DashboardHandler {
    access: Arc<dyn AccessPolicy>,
    notifier: Arc<dyn ActivityNotifier>,
    bus: Arc<ChannelBus>,
}

impl DashboardHandler {
    /// Create the dashboard handler.
    #[must_use]
    pub fn new(
        access: Arc<dyn AccessPolicy>,
        notifier: Arc<dyn ActivityNotifier>,
        bus: Arc<ChannelBus>,
    ) -> Self {
        Self {
            access,
            notifier,
            bus,
        }
    }

    /// Extract the dashboard uid from the channel suffix.
    fn uid<'a>(&self, channel: &'a ChannelPath) -> Result<&'a str, LiveError> {
        let uid = channel
            .suffix()
            .split('/')
            .next()
            .unwrap_or_default();
        if uid.is_empty() {
            return Err(LiveError::InvalidChannelId(
                "dashboard channel has no uid".into(),
            ));
        }
        if !self.access.exists(uid) {
            return Err(LiveError::InvalidChannelId(format!(
                "unknown dashboard: {uid}"
            )));
        }
        Ok(uid)
    }

    /// Validate a dashboard event payload and re-encode it for
    /// broadcast with `uid` and `by` stamped in.
    fn transform(
        uid: &str,
        user_id: i64,
        payload: &[u8],
    ) -> Result<(Bytes, Option<ActivityAction>), LiveError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| LiveError::InvalidPayload(e.to_string()))?;
        let Value::Object(mut body) = value else {
            return Err(LiveError::InvalidPayload("expected a JSON object".into()));
        };

        let activity = match body.get("action").and_then(Value::as_str) {
            Some("saved") => Some(ActivityAction::Saved),
            Some("deleted") => Some(ActivityAction::Deleted),
            Some("editing") => None,
            Some(other) => {
                return Err(LiveError::InvalidPayload(format!(
                    "unknown action: {other}"
                )))
            }
            None => return Err(LiveError::InvalidPayload("missing action".into())),
        };

        body.insert("uid".to_string(), json!(uid));
        body.insert("by".to_string(), json!(user_id));
        let encoded = Value::Object(body).to_string();
        Ok((Bytes::from(encoded), activity))
    }

    fn channel_status(&self, channel: &ChannelPath, uid: &str) -> Value {
        json!({
            "uid": uid,
            "channel": channel.as_str(),
            "subscribers": self.bus.subscriber_count(channel.as_str()),
            "presence": self.bus.presence_snapshot(channel.as_str()),
        })
    }
}

#[async_trait]
impl ChannelHandler for DashboardHandler {
    fn options(&self, _path: &ChannelPath) -> ChannelOptions {
        ChannelOptions::with_presence()
    }

    async fn on_subscribe(
        &self,
        client: &ClientInfo,
        event: SubscribeEvent,
    ) -> Result<(), LiveError> {
        let uid = self.uid(&event.channel)?;
        if !self.access.can_read(client.user_id, uid) {
            return Err(LiveError::Unauthorized);
        }
        debug!(uid, user_id = client.user_id, "Dashboard subscribe accepted");
        Ok(())
    }

    async fn on_publish(
        &self,
        client: &ClientInfo,
        event: PublishEvent,
    ) -> Result<Option<Bytes>, LiveError> {
        let uid = self.uid(&event.channel)?;
        if !self.access.can_write(client.user_id, uid) {
            return Err(LiveError::Unauthorized);
        }

        let (payload, activity) = Self::transform(uid, client.user_id, &event.payload)?;
        if let Some(action) = activity {
            notify_detached(
                Arc::clone(&self.notifier),
                ActivityEvent {
                    uid: uid.to_string(),
                    user_id: client.user_id,
                    action,
                },
            );
        }
        Ok(Some(payload))
    }

    /// `GET` answers channel status; `POST` publishes a server-side
    /// event through the same validation as a client publish. The HTTP
    /// API layer has already authenticated the administrative caller.
    async fn handle_http(&self, req: &AdminRequest, channel: &ChannelPath) -> AdminResponse {
        let uid = match self.uid(channel) {
            Ok(uid) => uid,
            Err(e) => return AdminResponse::json_error(404, &e.to_string()),
        };
        match req.method.as_str() {
            "GET" => AdminResponse::ok(self.channel_status(channel, uid).to_string()),
            "POST" => match Self::transform(uid, 0, &req.body) {
                Ok((payload, activity)) => {
                    if let Some(action) = activity {
                        notify_detached(
                            Arc::clone(&self.notifier),
                            ActivityEvent {
                                uid: uid.to_string(),
                                user_id: 0,
                                action,
                            },
                        );
                    }
                    let published = self.bus.publish(channel.as_str(), payload);
                    AdminResponse::ok(json!({ "published": published }).to_string())
                }
                Err(e) => AdminResponse::json_error(400, &e.to_string()),
            },
            _ => AdminResponse::method_not_allowed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::MemoryAccess;
    use beacon_core::activity::{ChannelActivityRelay, ACTIVITY_CHANNEL};
    use beacon_core::{Publisher, SessionId};
    use std::time::Duration;

    fn setup() -> (Arc<MemoryAccess>, Arc<ChannelBus>, DashboardHandler) {
        let access = Arc::new(MemoryAccess::new());
        let bus = Arc::new(ChannelBus::new());
        let notifier = Arc::new(ChannelActivityRelay::new(Publisher::new(Arc::clone(&bus))));
        let handler = DashboardHandler::new(
            Arc::clone(&access) as Arc<dyn AccessPolicy>,
            notifier,
            Arc::clone(&bus),
        );
        (access, bus, handler)
    }

    fn path(s: &str) -> ChannelPath {
        ChannelPath::parse(s).unwrap()
    }

    #[test]
    fn test_options_are_stable() {
        let (_access, _bus, handler) = setup();
        let channel = path("dashboard/d1");
        let first = handler.options(&channel);
        assert_eq!(first, handler.options(&channel));
        assert!(first.presence);
    }

    #[tokio::test]
    async fn test_subscribe_requires_read_or_public() {
        let (access, _bus, handler) = setup();
        access.add_resource("d1");
        access.grant_read(7, "d1");

        let member = ClientInfo::new("s1", 7);
        let stranger = ClientInfo::new("s2", 9);
        let channel = path("dashboard/d1");

        handler
            .on_subscribe(&member, SubscribeEvent::new(channel.clone()))
            .await
            .unwrap();
        assert!(matches!(
            handler
                .on_subscribe(&stranger, SubscribeEvent::new(channel.clone()))
                .await,
            Err(LiveError::Unauthorized)
        ));

        access.set_public("d1", true);
        handler
            .on_subscribe(&stranger, SubscribeEvent::new(channel))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_rejects_unknown_or_malformed_uid() {
        let (_access, _bus, handler) = setup();
        let client = ClientInfo::new("s1", 7);

        assert!(matches!(
            handler
                .on_subscribe(&client, SubscribeEvent::new(path("dashboard/ghost")))
                .await,
            Err(LiveError::InvalidChannelId(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_requires_write() {
        let (access, _bus, handler) = setup();
        access.add_resource("d1");
        access.grant_read(7, "d1");

        // Read entitlement alone does not allow publishing.
        let viewer = ClientInfo::new("s1", 7);
        let event = PublishEvent::new(path("dashboard/d1"), &br#"{"action":"editing"}"#[..]);
        assert!(matches!(
            handler.on_publish(&viewer, event).await,
            Err(LiveError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_publish_enriches_payload() {
        let (access, _bus, handler) = setup();
        access.grant_write(7, "d1");

        let editor = ClientInfo::new("s1", 7);
        let event = PublishEvent::new(
            path("dashboard/d1"),
            &br#"{"action":"editing","panel":3}"#[..],
        );
        let payload = handler.on_publish(&editor, event).await.unwrap().unwrap();

        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["action"], "editing");
        assert_eq!(value["panel"], 3);
        assert_eq!(value["uid"], "d1");
        assert_eq!(value["by"], 7);
    }

    #[tokio::test]
    async fn test_publish_rejects_bad_payloads() {
        let (access, _bus, handler) = setup();
        access.grant_write(7, "d1");
        let editor = ClientInfo::new("s1", 7);

        for bad in [
            &b"not json"[..],
            &br#"["array"]"#[..],
            &br#"{"no":"action"}"#[..],
            &br#"{"action":"exploded"}"#[..],
        ] {
            let event = PublishEvent::new(path("dashboard/d1"), bad);
            assert!(matches!(
                handler.on_publish(&editor, event).await,
                Err(LiveError::InvalidPayload(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_save_advertises_activity() {
        let (access, bus, handler) = setup();
        access.grant_write(7, "d1");

        let mut activity_rx = bus
            .subscribe(&SessionId::new("observer"), &path(ACTIVITY_CHANNEL))
            .unwrap();

        let editor = ClientInfo::new("s1", 7);
        let event = PublishEvent::new(path("dashboard/d1"), &br#"{"action":"saved"}"#[..]);
        let payload = handler.on_publish(&editor, event).await.unwrap();
        assert!(payload.is_some());

        // Delivery is detached from the publish path.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let envelope = activity_rx.try_recv().unwrap();
        let activity: ActivityEvent = serde_json::from_slice(&envelope.payload).unwrap();
        assert_eq!(activity.uid, "d1");
        assert_eq!(activity.user_id, 7);
        assert_eq!(activity.action, ActivityAction::Saved);
    }

    #[tokio::test]
    async fn test_editing_does_not_advertise_activity() {
        let (access, bus, handler) = setup();
        access.grant_write(7, "d1");

        let mut activity_rx = bus
            .subscribe(&SessionId::new("observer"), &path(ACTIVITY_CHANNEL))
            .unwrap();

        let editor = ClientInfo::new("s1", 7);
        let event = PublishEvent::new(path("dashboard/d1"), &br#"{"action":"editing"}"#[..]);
        handler.on_publish(&editor, event).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(activity_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_admin_http_status_and_publish() {
        let (access, bus, handler) = setup();
        access.add_resource("d1");
        let channel = path("dashboard/d1");

        let mut rx = bus.subscribe(&SessionId::new("s1"), &channel).unwrap();

        let req = AdminRequest::new("GET", "dashboard/d1", Bytes::new());
        let resp = handler.handle_http(&req, &channel).await;
        assert_eq!(resp.status, 200);
        let status: Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(status["uid"], "d1");
        assert_eq!(status["subscribers"], 1);

        let req = AdminRequest::new("POST", "dashboard/d1", &br#"{"action":"saved"}"#[..]);
        let resp = handler.handle_http(&req, &channel).await;
        assert_eq!(resp.status, 200);
        let envelope = rx.try_recv().unwrap();
        let value: Value = serde_json::from_slice(&envelope.payload).unwrap();
        assert_eq!(value["by"], 0);

        let req = AdminRequest::new("DELETE", "dashboard/d1", Bytes::new());
        assert_eq!(handler.handle_http(&req, &channel).await.status, 405);

        let req = AdminRequest::new("GET", "dashboard/ghost", Bytes::new());
        assert_eq!(
            handler.handle_http(&req, &path("dashboard/ghost")).await.status,
            404
        );
    }
}
