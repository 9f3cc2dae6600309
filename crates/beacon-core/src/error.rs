//! Error taxonomy for the live core.
//!
//! Every failure class carries a stable numeric code that may be surfaced
//! to clients; internal detail stays in the message and is only logged.

use thiserror::Error;

/// Errors produced by routing, authorization, and activity delivery.
#[derive(Debug, Error)]
pub enum LiveError {
    /// No registered namespace matches the channel path.
    #[error("no handler for path: {0}")]
    NoHandlerForPath(String),

    /// The requesting identity is not entitled to the operation.
    #[error("unauthorized")]
    Unauthorized,

    /// The channel id is malformed or names a nonexistent resource.
    #[error("invalid channel id: {0}")]
    InvalidChannelId(String),

    /// The publish payload failed validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Activity notification delivery failed.
    ///
    /// Absorbed at the notifier boundary; never propagated into the
    /// outcome of the subscribe/publish that triggered it.
    #[error("notification delivery failed: {0}")]
    NotificationFailed(String),

    /// Subscription limit for the session reached.
    #[error("maximum subscriptions reached")]
    MaxSubscriptionsReached,

    /// Already subscribed to the channel.
    #[error("already subscribed to channel: {0}")]
    AlreadySubscribed(String),

    /// Not subscribed to the channel.
    #[error("not subscribed to channel: {0}")]
    NotSubscribed(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LiveError {
    /// Stable code sent to clients in rejection frames.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            LiveError::NoHandlerForPath(_) => 1001,
            LiveError::Unauthorized => 1002,
            LiveError::InvalidChannelId(_) => 1003,
            LiveError::InvalidPayload(_) => 1004,
            LiveError::NotificationFailed(_) => 1005,
            LiveError::MaxSubscriptionsReached => 1006,
            LiveError::AlreadySubscribed(_) => 1007,
            LiveError::NotSubscribed(_) => 1008,
            LiveError::Internal(_) => 1000,
        }
    }

    /// Whether the error is expected in normal operation (client fault)
    /// rather than a server-side problem.
    #[must_use]
    pub fn is_client_fault(&self) -> bool {
        !matches!(
            self,
            LiveError::Internal(_) | LiveError::NotificationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            LiveError::NoHandlerForPath("x".into()),
            LiveError::Unauthorized,
            LiveError::InvalidChannelId("x".into()),
            LiveError::InvalidPayload("x".into()),
            LiveError::NotificationFailed("x".into()),
            LiveError::MaxSubscriptionsReached,
            LiveError::AlreadySubscribed("x".into()),
            LiveError::NotSubscribed("x".into()),
            LiveError::Internal("x".into()),
        ];
        let mut codes: Vec<u16> = errors.iter().map(LiveError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_client_fault_classification() {
        assert!(LiveError::Unauthorized.is_client_fault());
        assert!(LiveError::NoHandlerForPath("a/b".into()).is_client_fault());
        assert!(!LiveError::Internal("boom".into()).is_client_fault());
        assert!(!LiveError::NotificationFailed("down".into()).is_client_fault());
    }
}
