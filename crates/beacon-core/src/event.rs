//! Events and client identity.
//!
//! Subscribe and publish events are immutable, single-use inputs handed
//! over by the transport layer. The broadcast side carries `Envelope`
//! values with the payload behind `Bytes` for zero-copy fan-out.

use crate::path::ChannelPath;
use bytes::Bytes;
use std::fmt;

/// Unique identifier for a client session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new session ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a session ID from the current time.
    #[must_use]
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        Self(format!("sess_{timestamp:x}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity of the requesting client, as established by the transport
/// layer. Token verification happens upstream; the core trusts this.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Session the request arrived on.
    pub session: SessionId,
    /// Authenticated user, 0 for anonymous.
    pub user_id: i64,
}

impl ClientInfo {
    /// Create a client identity.
    #[must_use]
    pub fn new(session: impl Into<SessionId>, user_id: i64) -> Self {
        Self {
            session: session.into(),
            user_id,
        }
    }
}

/// A client's request to subscribe to a channel.
#[derive(Debug, Clone)]
pub struct SubscribeEvent {
    /// Target channel.
    pub channel: ChannelPath,
}

impl SubscribeEvent {
    /// Create a subscribe event.
    #[must_use]
    pub fn new(channel: ChannelPath) -> Self {
        Self { channel }
    }
}

/// A client's request to publish on a channel.
#[derive(Debug, Clone)]
pub struct PublishEvent {
    /// Target channel.
    pub channel: ChannelPath,
    /// Raw payload as submitted by the client.
    pub payload: Bytes,
}

impl PublishEvent {
    /// Create a publish event.
    #[must_use]
    pub fn new(channel: ChannelPath, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }
}

/// A message fanned out to channel subscribers.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Channel the message was published on.
    pub channel: String,
    /// Broadcast payload (shared across all receivers).
    pub payload: Bytes,
}

impl Envelope {
    /// Create an envelope.
    #[must_use]
    pub fn new(channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}
