//! Namespace routing: channel path to handler resolution.
//!
//! Resolution runs on the hot path of every subscribe and publish, so
//! the match table is an immutable snapshot behind an atomically swapped
//! reference. Lookups never lock; re-registration builds a new table and
//! swaps it in whole.
//!
//! Matching is longest-prefix over the registered namespace prefixes.
//! When two registrations share a prefix of equal length (a duplicate),
//! the first one registered wins.

use crate::error::LiveError;
use crate::handler::{AdminRequest, AdminResponse, ChannelHandler};
use crate::path::ChannelPath;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;

/// One namespace registration: a path prefix and its owning handler.
struct Registration {
    prefix: String,
    handler: Arc<dyn ChannelHandler>,
}

/// Immutable match table, rebuilt on every registration change.
#[derive(Default)]
struct MatchTable {
    // Registration order is preserved; it is the documented tie-break.
    entries: Vec<Registration>,
}

impl MatchTable {
    fn resolve(&self, path: &str) -> Option<&Registration> {
        let mut best: Option<&Registration> = None;
        for entry in &self.entries {
            if path.starts_with(&entry.prefix) {
                // Strictly longer wins; equal length keeps the earlier
                // registration.
                match best {
                    Some(b) if entry.prefix.len() <= b.prefix.len() => {}
                    _ => best = Some(entry),
                }
            }
        }
        best
    }
}

/// Ordered collection of namespace registrations, built before the
/// registry goes live.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Registration>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a namespace prefix.
    ///
    /// Prefixes are matched verbatim against channel paths; register
    /// `dashboard/` (with the trailing slash) to own that namespace.
    #[must_use]
    pub fn register(mut self, prefix: impl Into<String>, handler: Arc<dyn ChannelHandler>) -> Self {
        self.entries.push(Registration {
            prefix: prefix.into(),
            handler,
        });
        self
    }

    /// Build the registry.
    #[must_use]
    pub fn build(self) -> NamespaceRegistry {
        NamespaceRegistry {
            table: ArcSwap::from_pointee(MatchTable {
                entries: self.entries,
            }),
        }
    }
}

/// Resolves channel paths to their owning handlers.
///
/// Safe to share across any number of concurrent sessions; lookups read
/// a lock-free snapshot of the match table.
pub struct NamespaceRegistry {
    table: ArcSwap<MatchTable>,
}

impl NamespaceRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Resolve the handler owning a channel path.
    ///
    /// Longest-prefix match; ties go to the first-registered entry.
    ///
    /// # Errors
    ///
    /// Returns `LiveError::NoHandlerForPath` when no registered prefix
    /// matches. The caller must treat this as a rejection, never as a
    /// silent no-op.
    pub fn handler_for_path(&self, path: &ChannelPath) -> Result<Arc<dyn ChannelHandler>, LiveError> {
        let table = self.table.load();
        match table.resolve(path.as_str()) {
            Some(entry) => Ok(Arc::clone(&entry.handler)),
            None => {
                debug!(path = %path, "No handler registered for path");
                Err(LiveError::NoHandlerForPath(path.as_str().to_string()))
            }
        }
    }

    /// Replace the whole registration set.
    ///
    /// Builds a fresh table from the builder and swaps it in atomically;
    /// in-flight lookups keep the snapshot they already loaded.
    pub fn install(&self, builder: RegistryBuilder) {
        self.table.store(Arc::new(MatchTable {
            entries: builder.entries,
        }));
        debug!("Namespace registrations swapped");
    }

    /// Registered namespace prefixes, in registration order.
    #[must_use]
    pub fn prefixes(&self) -> Vec<String> {
        self.table
            .load()
            .entries
            .iter()
            .map(|e| e.prefix.clone())
            .collect()
    }

    /// Administrative HTTP entry point at namespace granularity.
    ///
    /// Resolves the request path and delegates to the owning handler's
    /// channel-scoped entry point, else answers 404.
    pub async fn handle_namespace_http(&self, req: &AdminRequest) -> AdminResponse {
        let channel = match ChannelPath::parse(req.path.clone()) {
            Ok(channel) => channel,
            Err(e) => return AdminResponse::json_error(400, &e.to_string()),
        };
        match self.handler_for_path(&channel) {
            Ok(handler) => handler.handle_http(req, &channel).await,
            Err(_) => AdminResponse::not_found("no handler for channel"),
        }
    }
}
