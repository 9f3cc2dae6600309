//! Activity notification for tracked resources.
//!
//! Channel handlers report save/delete events here instead of talking to
//! whatever system displays "who is doing what". Delivery is best-effort
//! and fire-and-forget: a slow or failing notifier never delays or fails
//! the publish that triggered it.

use crate::bus::Publisher;
use crate::error::LiveError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Channel on which the relay advertises dashboard activity.
pub const ACTIVITY_CHANNEL: &str = "dashboard/activity";

/// What happened to the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityAction {
    Saved,
    Deleted,
}

/// A record of a resource being saved or deleted by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Resource identifier.
    pub uid: String,
    /// Acting user.
    pub user_id: i64,
    /// What happened.
    pub action: ActivityAction,
}

/// Sink for dashboard activity.
///
/// No ordering guarantee between calls; each notification stands alone.
/// The returned error exists for logging and telemetry only and must
/// never unwind into the publish that triggered the notification.
#[async_trait]
pub trait ActivityNotifier: Send + Sync {
    /// A dashboard was saved.
    ///
    /// # Errors
    ///
    /// Delivery failure, for the caller to log.
    async fn dashboard_saved(&self, uid: &str, user_id: i64) -> Result<(), LiveError>;

    /// A dashboard was deleted.
    ///
    /// # Errors
    ///
    /// Delivery failure, for the caller to log.
    async fn dashboard_deleted(&self, uid: &str, user_id: i64) -> Result<(), LiveError>;
}

/// Notifier that advertises activity on the live bus itself.
///
/// Events are serialized as JSON and published on
/// [`ACTIVITY_CHANNEL`]; downstream consumers subscribe like any other
/// client.
pub struct ChannelActivityRelay {
    publisher: Publisher,
}

impl ChannelActivityRelay {
    /// Create a relay over a publisher.
    #[must_use]
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }

    fn relay(&self, event: &ActivityEvent) -> Result<(), LiveError> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| LiveError::NotificationFailed(e.to_string()))?;
        self.publisher
            .publish(ACTIVITY_CHANNEL, Bytes::from(payload))
            .map_err(|e| LiveError::NotificationFailed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ActivityNotifier for ChannelActivityRelay {
    async fn dashboard_saved(&self, uid: &str, user_id: i64) -> Result<(), LiveError> {
        self.relay(&ActivityEvent {
            uid: uid.to_string(),
            user_id,
            action: ActivityAction::Saved,
        })
    }

    async fn dashboard_deleted(&self, uid: &str, user_id: i64) -> Result<(), LiveError> {
        self.relay(&ActivityEvent {
            uid: uid.to_string(),
            user_id,
            action: ActivityAction::Deleted,
        })
    }
}

/// Deliver a notification on a detached task.
///
/// The spawned task logs delivery failure and drops it; the caller's
/// publish path continues regardless of the outcome.
pub fn notify_detached(notifier: Arc<dyn ActivityNotifier>, event: ActivityEvent) {
    tokio::spawn(async move {
        let result = match event.action {
            ActivityAction::Saved => notifier.dashboard_saved(&event.uid, event.user_id).await,
            ActivityAction::Deleted => notifier.dashboard_deleted(&event.uid, event.user_id).await,
        };
        if let Err(e) = result {
            warn!(uid = %event.uid, user_id = event.user_id, error = %e, "Activity notification failed");
        }
    });
}
