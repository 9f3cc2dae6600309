//! Channel path parsing and validation.
//!
//! A channel path is an opaque string of the form `namespace/suffix`,
//! e.g. `dashboard/fx93k` or `cursor/doc-12/main`. The namespace prefix
//! selects the owning handler; the suffix is handler-specific.

use crate::error::LiveError;
use std::fmt;

/// Maximum channel path length in bytes.
pub const MAX_PATH_LENGTH: usize = 256;

/// A validated, immutable channel path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelPath(String);

impl ChannelPath {
    /// Parse and validate a channel path.
    ///
    /// # Errors
    ///
    /// Returns `LiveError::InvalidChannelId` if the path is empty, too
    /// long, contains non-printable or non-ASCII characters, starts with
    /// the reserved `$` prefix, or has no namespace segment.
    pub fn parse(path: impl Into<String>) -> Result<Self, LiveError> {
        let path = path.into();
        if path.is_empty() {
            return Err(LiveError::InvalidChannelId("empty path".into()));
        }
        if path.len() > MAX_PATH_LENGTH {
            return Err(LiveError::InvalidChannelId("path too long".into()));
        }
        if path.starts_with('$') {
            return Err(LiveError::InvalidChannelId(
                "paths starting with '$' are reserved".into(),
            ));
        }
        if !path.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
            return Err(LiveError::InvalidChannelId(
                "path contains invalid characters".into(),
            ));
        }
        match path.split_once('/') {
            Some((ns, _)) if !ns.is_empty() => Ok(Self(path)),
            _ => Err(LiveError::InvalidChannelId(
                "path has no namespace segment".into(),
            )),
        }
    }

    /// The full path string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace segment, without the trailing slash.
    #[must_use]
    pub fn namespace(&self) -> &str {
        // Validated at construction: a '/' is always present.
        self.0.split_once('/').map_or("", |(ns, _)| ns)
    }

    /// Everything after the namespace segment.
    #[must_use]
    pub fn suffix(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, rest)| rest)
    }
}

impl fmt::Display for ChannelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ChannelPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let path = ChannelPath::parse("dashboard/fx93k").unwrap();
        assert_eq!(path.as_str(), "dashboard/fx93k");
        assert_eq!(path.namespace(), "dashboard");
        assert_eq!(path.suffix(), "fx93k");
    }

    #[test]
    fn test_parse_nested_suffix() {
        let path = ChannelPath::parse("cursor/doc-12/main").unwrap();
        assert_eq!(path.namespace(), "cursor");
        assert_eq!(path.suffix(), "doc-12/main");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ChannelPath::parse("").is_err());
        assert!(ChannelPath::parse("no-namespace").is_err());
        assert!(ChannelPath::parse("/leading-slash").is_err());
        assert!(ChannelPath::parse("$system/x").is_err());
        assert!(ChannelPath::parse("bad\u{7}control/x").is_err());

        let long = format!("ns/{}", "a".repeat(MAX_PATH_LENGTH));
        assert!(ChannelPath::parse(long).is_err());
    }
}
