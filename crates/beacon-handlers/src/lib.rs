//! # beacon-handlers
//!
//! Concrete channel families for the Beacon realtime layer:
//!
//! - **DashboardHandler** - `dashboard/<uid>` edit channels with
//!   entitlement checks, payload enrichment, and activity advertisement
//! - **CursorHandler** - `cursor/<doc>` live cursor positions
//! - **BroadcastHandler** - `broadcast/<topic>` plain relay topics
//!
//! All handlers rule through an [`AccessPolicy`], the entitlement seam
//! whose backing store lives outside this crate.

pub mod access;
pub mod broadcast;
pub mod cursor;
pub mod dashboard;

pub use access::{AccessPolicy, MemoryAccess};
pub use broadcast::BroadcastHandler;
pub use cursor::CursorHandler;
pub use dashboard::DashboardHandler;
