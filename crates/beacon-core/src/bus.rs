//! Subscriber bookkeeping and broadcast fan-out.
//!
//! The bus is the substrate under the dispatch core: it tracks which
//! sessions are subscribed where, fans published payloads out through
//! per-channel broadcast senders, and keeps presence for channels that
//! opted in. Authorization never happens here; by the time a call
//! reaches the bus the owning handler has already ruled.

use crate::error::LiveError;
use crate::event::{Envelope, SessionId};
use crate::path::ChannelPath;
use crate::presence::{Presence, PresenceEntry};
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Maximum subscriptions per session.
    pub max_subscriptions_per_session: usize,
    /// Broadcast capacity per channel.
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_subscriptions_per_session: 100,
            channel_capacity: 1024,
        }
    }
}

struct ChannelEntry {
    sender: broadcast::Sender<Arc<Envelope>>,
    subscribers: DashSet<SessionId>,
    presence: Presence,
}

impl ChannelEntry {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscribers: DashSet::new(),
            presence: Presence::new(),
        }
    }
}

/// Subscriber sets and broadcast senders, keyed by channel path.
///
/// Channels are created on first subscribe and dropped when the last
/// subscriber leaves.
pub struct ChannelBus {
    channels: DashMap<String, ChannelEntry>,
    subscriptions: DashMap<SessionId, DashSet<String>>,
    config: BusConfig,
}

impl ChannelBus {
    /// Create a bus with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with custom configuration.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            channels: DashMap::new(),
            subscriptions: DashMap::new(),
            config,
        }
    }

    /// Add a session to a channel's subscriber set.
    ///
    /// Returns a receiver for envelopes broadcast on the channel.
    ///
    /// # Errors
    ///
    /// Fails when the session hit its subscription cap or is already
    /// subscribed.
    pub fn subscribe(
        &self,
        session: &SessionId,
        channel: &ChannelPath,
    ) -> Result<broadcast::Receiver<Arc<Envelope>>, LiveError> {
        let subs = self.subscriptions.entry(session.clone()).or_default();
        if subs.len() >= self.config.max_subscriptions_per_session {
            return Err(LiveError::MaxSubscriptionsReached);
        }
        if subs.contains(channel.as_str()) {
            return Err(LiveError::AlreadySubscribed(channel.as_str().to_string()));
        }

        let entry = self
            .channels
            .entry(channel.as_str().to_string())
            .or_insert_with(|| {
                debug!(channel = %channel, "Creating channel");
                ChannelEntry::new(self.config.channel_capacity)
            });
        entry.subscribers.insert(session.clone());
        let receiver = entry.sender.subscribe();
        drop(entry);

        subs.insert(channel.as_str().to_string());
        debug!(channel = %channel, session = %session, "Subscribed");
        Ok(receiver)
    }

    /// Remove a session from a channel's subscriber set.
    ///
    /// # Errors
    ///
    /// Fails when the session is not subscribed to the channel.
    pub fn unsubscribe(&self, session: &SessionId, channel: &ChannelPath) -> Result<(), LiveError> {
        let removed = self
            .subscriptions
            .get(session)
            .map_or(false, |subs| subs.remove(channel.as_str()).is_some());
        if !removed {
            return Err(LiveError::NotSubscribed(channel.as_str().to_string()));
        }
        self.detach(session, channel.as_str());
        debug!(channel = %channel, session = %session, "Unsubscribed");
        Ok(())
    }

    /// Remove a session from every channel it is subscribed to.
    pub fn unsubscribe_all(&self, session: &SessionId) {
        if let Some((_, channels)) = self.subscriptions.remove(session) {
            for channel in channels.iter() {
                self.detach(session, channel.as_str());
            }
        }
        debug!(session = %session, "Unsubscribed from all channels");
    }

    fn detach(&self, session: &SessionId, channel: &str) {
        if let Some(mut entry) = self.channels.get_mut(channel) {
            entry.subscribers.remove(session);
            entry.presence.leave(session);
            if entry.subscribers.is_empty() {
                drop(entry);
                self.channels.remove(channel);
                debug!(channel = %channel, "Dropped empty channel");
            }
        }
    }

    /// Fan a payload out to all subscribers of a channel.
    ///
    /// Returns the number of receivers the envelope reached; publishing
    /// to a channel nobody subscribed to reaches zero.
    pub fn publish(&self, channel: &str, payload: Bytes) -> usize {
        match self.channels.get(channel) {
            Some(entry) => {
                let envelope = Arc::new(Envelope::new(channel, payload));
                let count = entry.sender.send(envelope).unwrap_or_default();
                trace!(channel = %channel, recipients = count, "Broadcast");
                count
            }
            None => {
                trace!(channel = %channel, "Broadcast on channel with no subscribers");
                0
            }
        }
    }

    /// Whether a session is in the channel's subscriber set.
    #[must_use]
    pub fn is_subscribed(&self, session: &SessionId, channel: &str) -> bool {
        self.subscriptions
            .get(session)
            .is_some_and(|subs| subs.contains(channel))
    }

    /// Subscriber count for a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |entry| entry.subscribers.len())
    }

    /// Record a presence join on a channel.
    pub fn presence_join(&self, session: &SessionId, channel: &str, user_id: i64) -> bool {
        match self.channels.get_mut(channel) {
            Some(mut entry) => entry.presence.join(session, user_id),
            None => false,
        }
    }

    /// Record a presence leave on a channel.
    pub fn presence_leave(&self, session: &SessionId, channel: &str) -> Option<PresenceEntry> {
        self.channels
            .get_mut(channel)
            .and_then(|mut entry| entry.presence.leave(session))
    }

    /// Presence snapshot for a channel.
    #[must_use]
    pub fn presence_snapshot(&self, channel: &str) -> Vec<PresenceEntry> {
        self.channels
            .get(channel)
            .map(|entry| entry.presence.snapshot())
            .unwrap_or_default()
    }

    /// Bus statistics.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        BusStats {
            channel_count: self.channels.len(),
            session_count: self.subscriptions.len(),
            total_subscriptions: self.subscriptions.iter().map(|s| s.len()).sum(),
        }
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus statistics.
#[derive(Debug, Clone)]
pub struct BusStats {
    /// Channels with at least one subscriber.
    pub channel_count: usize,
    /// Sessions holding subscriptions.
    pub session_count: usize,
    /// Subscriptions across all sessions.
    pub total_subscriptions: usize,
}

/// Cloneable write primitive into the channel bus.
///
/// Used by components that inject messages outside the client publish
/// path, e.g. server-originated broadcasts and the activity relay.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<ChannelBus>,
}

impl Publisher {
    /// Create a publisher over a bus.
    #[must_use]
    pub fn new(bus: Arc<ChannelBus>) -> Self {
        Self { bus }
    }

    /// Publish a payload directly onto a channel.
    ///
    /// # Errors
    ///
    /// Fails when the channel path is malformed.
    pub fn publish(&self, channel: &str, payload: Bytes) -> Result<usize, LiveError> {
        let path = ChannelPath::parse(channel)?;
        Ok(self.bus.publish(path.as_str(), payload))
    }
}
