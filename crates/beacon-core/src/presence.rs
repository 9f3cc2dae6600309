//! Presence tracking for channels that opt into it.
//!
//! Kept deliberately narrow: who is on the channel and since when. The
//! bus maintains one tracker per channel whose options enable presence.

use crate::event::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Presence state for a single member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// Session the member is connected on.
    pub session: String,
    /// Authenticated user behind the session.
    pub user_id: i64,
    /// When the member joined, unix millis.
    pub joined_at: u64,
}

/// Presence tracker for one channel.
#[derive(Debug, Default)]
pub struct Presence {
    members: HashMap<SessionId, PresenceEntry>,
}

impl Presence {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of present members.
    #[must_use]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Add a member.
    ///
    /// Returns `true` for a new member, `false` when the session was
    /// already present.
    pub fn join(&mut self, session: &SessionId, user_id: i64) -> bool {
        let is_new = !self.members.contains_key(session);
        self.members.insert(
            session.clone(),
            PresenceEntry {
                session: session.as_str().to_string(),
                user_id,
                joined_at: now_millis(),
            },
        );
        if is_new {
            debug!(session = %session, user_id, "Presence: member joined");
        }
        is_new
    }

    /// Remove a member.
    pub fn leave(&mut self, session: &SessionId) -> Option<PresenceEntry> {
        let entry = self.members.remove(session);
        if entry.is_some() {
            debug!(session = %session, "Presence: member left");
        }
        entry
    }

    /// Whether a session is present.
    #[must_use]
    pub fn is_present(&self, session: &SessionId) -> bool {
        self.members.contains_key(session)
    }

    /// Serializable snapshot of all members.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        self.members.values().cloned().collect()
    }

    /// Whether nobody is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
