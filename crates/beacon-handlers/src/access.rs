//! Entitlement checks behind the channel handlers.
//!
//! Handlers consult an `AccessPolicy` on every subscribe and publish.
//! The calls are synchronous and bounded: whatever store backs the
//! policy must answer from memory (a cache fed by the collaborator that
//! owns the data), never from I/O on the event path.

use dashmap::DashMap;
use std::collections::HashSet;

/// Read/write entitlement for named resources.
pub trait AccessPolicy: Send + Sync {
    /// Whether the resource is known at all.
    fn exists(&self, resource: &str) -> bool;

    /// Whether the user may observe the resource.
    fn can_read(&self, user_id: i64, resource: &str) -> bool;

    /// Whether the user may write to the resource.
    ///
    /// Independent of `can_read`; read entitlement never implies write.
    fn can_write(&self, user_id: i64, resource: &str) -> bool;
}

#[derive(Debug, Default)]
struct ResourceAcl {
    public: bool,
    readers: HashSet<i64>,
    writers: HashSet<i64>,
}

/// In-memory access policy.
///
/// Backs the server wiring and tests; a deployment would feed this from
/// its own permission store.
#[derive(Debug, Default)]
pub struct MemoryAccess {
    resources: DashMap<String, ResourceAcl>,
}

impl MemoryAccess {
    /// Create an empty policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource with no entitlements yet.
    pub fn add_resource(&self, resource: impl Into<String>) {
        self.resources.entry(resource.into()).or_default();
    }

    /// Mark a resource readable by everyone.
    pub fn set_public(&self, resource: &str, public: bool) {
        self.resources.entry(resource.to_string()).or_default().public = public;
    }

    /// Grant read entitlement.
    pub fn grant_read(&self, user_id: i64, resource: &str) {
        self.resources
            .entry(resource.to_string())
            .or_default()
            .readers
            .insert(user_id);
    }

    /// Grant write entitlement (and read along with it).
    pub fn grant_write(&self, user_id: i64, resource: &str) {
        let mut acl = self.resources.entry(resource.to_string()).or_default();
        acl.readers.insert(user_id);
        acl.writers.insert(user_id);
    }

    /// Drop all entitlements a user holds on a resource.
    pub fn revoke(&self, user_id: i64, resource: &str) {
        if let Some(mut acl) = self.resources.get_mut(resource) {
            acl.readers.remove(&user_id);
            acl.writers.remove(&user_id);
        }
    }
}

impl AccessPolicy for MemoryAccess {
    fn exists(&self, resource: &str) -> bool {
        self.resources.contains_key(resource)
    }

    fn can_read(&self, user_id: i64, resource: &str) -> bool {
        self.resources
            .get(resource)
            .is_some_and(|acl| acl.public || acl.readers.contains(&user_id))
    }

    fn can_write(&self, user_id: i64, resource: &str) -> bool {
        self.resources
            .get(resource)
            .is_some_and(|acl| acl.writers.contains(&user_id))
    }
}
