//! # beacon-core
//!
//! Channel routing and authorization core for the Beacon realtime layer.
//!
//! This crate decides, for every subscribe or publish on a named
//! channel, which handler owns that channel, whether the request is
//! permitted, and what (if anything) is broadcast:
//!
//! - **ChannelPath** - validated `namespace/suffix` channel addresses
//! - **NamespaceRegistry** - longest-prefix routing to channel handlers
//! - **ChannelHandler** - the per-namespace subscribe/publish contract
//! - **Dispatcher** - per-event orchestration of routing and verdicts
//! - **ChannelBus** - subscriber sets, broadcast fan-out, presence
//! - **ActivityNotifier** - best-effort save/delete advertisement
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌────────────┐     ┌─────────────────┐
//! │ Transport │────▶│ Dispatcher │────▶│ NamespaceRegistry│
//! └───────────┘     └────────────┘     └─────────────────┘
//!                          │                    │
//!                          ▼                    ▼
//!                   ┌────────────┐     ┌────────────────┐
//!                   │ ChannelBus │     │ ChannelHandler │
//!                   └────────────┘     └────────────────┘
//!                                              │
//!                                              ▼
//!                                      ┌──────────────────┐
//!                                      │ ActivityNotifier │
//!                                      └──────────────────┘
//! ```
//!
//! Routing lookups sit on the hot path of every event and read an
//! immutable snapshot behind an atomically swapped reference; handler
//! instances live for the process and must be internally synchronized.

pub mod activity;
pub mod bus;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handler;
pub mod options;
pub mod path;
pub mod presence;
pub mod registry;

pub use activity::{ActivityAction, ActivityEvent, ActivityNotifier, ChannelActivityRelay};
pub use bus::{BusConfig, BusStats, ChannelBus, Publisher};
pub use dispatch::{Dispatcher, PublishOutcome, Subscription};
pub use error::LiveError;
pub use event::{ClientInfo, Envelope, PublishEvent, SessionId, SubscribeEvent};
pub use handler::{AdminRequest, AdminResponse, ChannelHandler};
pub use options::ChannelOptions;
pub use path::ChannelPath;
pub use presence::{Presence, PresenceEntry};
pub use registry::{NamespaceRegistry, RegistryBuilder};
