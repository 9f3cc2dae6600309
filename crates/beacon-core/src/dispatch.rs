//! The dispatch core: routing and authorization for every event.
//!
//! For each subscribe or publish the dispatcher resolves the owning
//! handler exactly once, lets the handler rule, and relays the verdict
//! to the bus. Handlers are never re-resolved mid-event; a registration
//! swap only affects events dispatched after it.
//!
//! Cancellation: the dispatcher never aborts an in-flight call. When
//! the requesting session disconnects mid-authorization the caller
//! discards the result; side effects the handler already fired (e.g.
//! an activity notification) stay consistent.

use crate::bus::ChannelBus;
use crate::error::LiveError;
use crate::event::{ClientInfo, Envelope, PublishEvent, SubscribeEvent};
use crate::options::ChannelOptions;
use crate::path::ChannelPath;
use crate::registry::NamespaceRegistry;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Result of an accepted subscribe.
#[derive(Debug)]
pub struct Subscription {
    /// Options of the channel, for protocol-level behavior.
    pub options: ChannelOptions,
    /// Receiver for envelopes broadcast on the channel.
    pub receiver: broadcast::Receiver<Arc<Envelope>>,
}

/// Result of an accepted publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Whether a payload was broadcast.
    pub broadcast: bool,
    /// Number of subscribers the broadcast reached.
    pub recipients: usize,
}

impl PublishOutcome {
    fn swallowed() -> Self {
        Self {
            broadcast: false,
            recipients: 0,
        }
    }
}

/// Routes events to their owning handlers and relays verdicts to the bus.
pub struct Dispatcher {
    registry: Arc<NamespaceRegistry>,
    bus: Arc<ChannelBus>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry and a bus.
    #[must_use]
    pub fn new(registry: Arc<NamespaceRegistry>, bus: Arc<ChannelBus>) -> Self {
        Self { registry, bus }
    }

    /// The registry this dispatcher resolves against.
    #[must_use]
    pub fn registry(&self) -> &Arc<NamespaceRegistry> {
        &self.registry
    }

    /// The bus this dispatcher relays into.
    #[must_use]
    pub fn bus(&self) -> &Arc<ChannelBus> {
        &self.bus
    }

    /// Dispatch a subscribe event.
    ///
    /// The session joins the subscriber set only after the handler
    /// accepted; a rejection leaves the channel untouched.
    ///
    /// # Errors
    ///
    /// `NoHandlerForPath` on a routing miss, plus whatever the handler
    /// rules (`Unauthorized`, `InvalidChannelId`), plus bus limits.
    pub async fn handle_subscribe(
        &self,
        client: &ClientInfo,
        event: SubscribeEvent,
    ) -> Result<Subscription, LiveError> {
        let channel = event.channel.clone();
        let handler = self.registry.handler_for_path(&channel)?;
        let options = handler.options(&channel);

        handler.on_subscribe(client, event).await?;

        let receiver = self.bus.subscribe(&client.session, &channel)?;
        if options.presence {
            self.bus
                .presence_join(&client.session, channel.as_str(), client.user_id);
        }
        debug!(channel = %channel, session = %client.session, "Subscribe accepted");
        Ok(Subscription { options, receiver })
    }

    /// Dispatch a publish event.
    ///
    /// On acceptance the handler's returned payload is broadcast exactly
    /// as returned, never the client's raw input. An empty verdict means
    /// the publish was accepted with nothing to relay.
    ///
    /// # Errors
    ///
    /// `NoHandlerForPath` on a routing miss, plus whatever the handler
    /// rules (`Unauthorized`, `InvalidPayload`). Any error means no
    /// broadcast happened.
    pub async fn handle_publish(
        &self,
        client: &ClientInfo,
        event: PublishEvent,
    ) -> Result<PublishOutcome, LiveError> {
        let channel = event.channel.clone();
        let handler = self.registry.handler_for_path(&channel)?;

        let verdict = handler.on_publish(client, event).await?;
        match verdict {
            Some(payload) if !payload.is_empty() => {
                let recipients = self.bus.publish(channel.as_str(), payload);
                debug!(channel = %channel, recipients, "Publish broadcast");
                Ok(PublishOutcome {
                    broadcast: true,
                    recipients,
                })
            }
            _ => {
                debug!(channel = %channel, "Publish accepted, nothing to broadcast");
                Ok(PublishOutcome::swallowed())
            }
        }
    }

    /// Remove a session from a channel.
    ///
    /// # Errors
    ///
    /// Fails when the session was not subscribed.
    pub fn handle_unsubscribe(
        &self,
        client: &ClientInfo,
        channel: &ChannelPath,
    ) -> Result<(), LiveError> {
        self.bus.unsubscribe(&client.session, channel)
    }

    /// Drop every subscription a session holds, on disconnect.
    pub fn session_closed(&self, client: &ClientInfo) {
        self.bus.unsubscribe_all(&client.session);
    }

    /// Log a rejection with severity matched to the error class.
    pub fn log_rejection(channel: &str, err: &LiveError) {
        if err.is_client_fault() {
            debug!(channel = %channel, error = %err, "Event rejected");
        } else {
            warn!(channel = %channel, error = %err, "Event failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ChannelHandler;
    use crate::registry::NamespaceRegistry;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Team edits: members may subscribe, members may publish, and the
    /// broadcast payload is the input enriched with the author.
    struct TeamHandler {
        members: HashSet<i64>,
        calls: AtomicUsize,
    }

    impl TeamHandler {
        fn new(members: impl IntoIterator<Item = i64>) -> Self {
            Self {
                members: members.into_iter().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChannelHandler for TeamHandler {
        fn options(&self, _path: &ChannelPath) -> ChannelOptions {
            ChannelOptions::with_presence()
        }

        async fn on_subscribe(
            &self,
            client: &ClientInfo,
            _event: SubscribeEvent,
        ) -> Result<(), LiveError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.members.contains(&client.user_id) {
                Ok(())
            } else {
                Err(LiveError::Unauthorized)
            }
        }

        async fn on_publish(
            &self,
            client: &ClientInfo,
            event: PublishEvent,
        ) -> Result<Option<Bytes>, LiveError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if !self.members.contains(&client.user_id) {
                return Err(LiveError::Unauthorized);
            }
            let mut value: serde_json::Value = serde_json::from_slice(&event.payload)
                .map_err(|e| LiveError::InvalidPayload(e.to_string()))?;
            value["by"] = serde_json::json!(format!("user{}", client.user_id));
            Ok(Some(Bytes::from(value.to_string())))
        }
    }

    /// Swallows every publish; used to check that nothing is broadcast.
    struct SilentHandler;

    #[async_trait]
    impl ChannelHandler for SilentHandler {
        fn options(&self, _path: &ChannelPath) -> ChannelOptions {
            ChannelOptions::default()
        }

        async fn on_subscribe(
            &self,
            _client: &ClientInfo,
            _event: SubscribeEvent,
        ) -> Result<(), LiveError> {
            Ok(())
        }

        async fn on_publish(
            &self,
            _client: &ClientInfo,
            _event: PublishEvent,
        ) -> Result<Option<Bytes>, LiveError> {
            Ok(None)
        }
    }

    fn dispatcher_with(handler: Arc<TeamHandler>) -> Dispatcher {
        let registry = NamespaceRegistry::builder()
            .register("team/", handler)
            .register("quiet/", Arc::new(SilentHandler))
            .build();
        Dispatcher::new(Arc::new(registry), Arc::new(ChannelBus::new()))
    }

    fn path(s: &str) -> ChannelPath {
        ChannelPath::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_member_subscribes_non_member_rejected() {
        let handler = Arc::new(TeamHandler::new([7]));
        let dispatcher = dispatcher_with(Arc::clone(&handler));

        let member = ClientInfo::new("s-member", 7);
        let outsider = ClientInfo::new("s-outsider", 9);
        let channel = path("team/42/edits");

        let sub = dispatcher
            .handle_subscribe(&member, SubscribeEvent::new(channel.clone()))
            .await
            .unwrap();
        assert!(sub.options.presence);
        assert!(dispatcher.bus().is_subscribed(&member.session, "team/42/edits"));

        let err = dispatcher
            .handle_subscribe(&outsider, SubscribeEvent::new(channel))
            .await
            .unwrap_err();
        assert!(matches!(err, LiveError::Unauthorized));
        // A rejected subscriber never enters the subscriber set.
        assert!(!dispatcher.bus().is_subscribed(&outsider.session, "team/42/edits"));
    }

    #[tokio::test]
    async fn test_broadcast_is_the_transformed_payload() {
        let handler = Arc::new(TeamHandler::new([7, 8]));
        let dispatcher = dispatcher_with(Arc::clone(&handler));

        let author = ClientInfo::new("s-author", 7);
        let reader = ClientInfo::new("s-reader", 8);
        let channel = path("team/42/edits");

        let mut sub = dispatcher
            .handle_subscribe(&reader, SubscribeEvent::new(channel.clone()))
            .await
            .unwrap();

        let outcome = dispatcher
            .handle_publish(&author, PublishEvent::new(channel, &br#"{"x":1}"#[..]))
            .await
            .unwrap();
        assert!(outcome.broadcast);
        assert_eq!(outcome.recipients, 1);

        let envelope = sub.receiver.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&envelope.payload).unwrap();
        assert_eq!(value, serde_json::json!({"x": 1, "by": "user7"}));
    }

    #[tokio::test]
    async fn test_empty_verdict_broadcasts_nothing() {
        let dispatcher = dispatcher_with(Arc::new(TeamHandler::new([7])));
        let client = ClientInfo::new("s1", 7);
        let channel = path("quiet/log");

        let mut sub = dispatcher
            .handle_subscribe(&client, SubscribeEvent::new(channel.clone()))
            .await
            .unwrap();

        let outcome = dispatcher
            .handle_publish(&client, PublishEvent::new(channel, &b"ignored"[..]))
            .await
            .unwrap();
        assert!(!outcome.broadcast);
        assert_eq!(outcome.recipients, 0);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_publish_broadcasts_nothing() {
        let handler = Arc::new(TeamHandler::new([7]));
        let dispatcher = dispatcher_with(Arc::clone(&handler));

        let member = ClientInfo::new("s-member", 7);
        let outsider = ClientInfo::new("s-outsider", 9);
        let channel = path("team/42/edits");

        let mut sub = dispatcher
            .handle_subscribe(&member, SubscribeEvent::new(channel.clone()))
            .await
            .unwrap();

        let err = dispatcher
            .handle_publish(&outsider, PublishEvent::new(channel.clone(), &br#"{"x":1}"#[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, LiveError::Unauthorized));

        let err = dispatcher
            .handle_publish(&member, PublishEvent::new(channel, &b"not json"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, LiveError::InvalidPayload(_)));

        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_routing_miss_invokes_no_handler() {
        let handler = Arc::new(TeamHandler::new([7]));
        let dispatcher = dispatcher_with(Arc::clone(&handler));
        let client = ClientInfo::new("s1", 7);

        let err = dispatcher
            .handle_subscribe(&client, SubscribeEvent::new(path("nowhere/1")))
            .await
            .unwrap_err();
        assert!(matches!(err, LiveError::NoHandlerForPath(_)));

        let err = dispatcher
            .handle_publish(&client, PublishEvent::new(path("nowhere/1"), Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, LiveError::NoHandlerForPath(_)));

        assert_eq!(handler.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_session_close() {
        let dispatcher = dispatcher_with(Arc::new(TeamHandler::new([7])));
        let client = ClientInfo::new("s1", 7);
        let channel = path("team/42/edits");

        let _sub = dispatcher
            .handle_subscribe(&client, SubscribeEvent::new(channel.clone()))
            .await
            .unwrap();
        dispatcher.handle_unsubscribe(&client, &channel).unwrap();
        assert!(matches!(
            dispatcher.handle_unsubscribe(&client, &channel),
            Err(LiveError::NotSubscribed(_))
        ));

        let _sub = dispatcher
            .handle_subscribe(&client, SubscribeEvent::new(channel))
            .await
            .unwrap();
        dispatcher.session_closed(&client);
        assert_eq!(dispatcher.bus().stats().total_subscriptions, 0);
    }

    #[tokio::test]
    async fn test_presence_joined_on_presence_channels() {
        let dispatcher = dispatcher_with(Arc::new(TeamHandler::new([7])));
        let client = ClientInfo::new("s1", 7);

        let _sub = dispatcher
            .handle_subscribe(&client, SubscribeEvent::new(path("team/42/edits")))
            .await
            .unwrap();
        let snapshot = dispatcher.bus().presence_snapshot("team/42/edits");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].user_id, 7);
    }
}
