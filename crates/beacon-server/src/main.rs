//! # Beacon Server
//!
//! Realtime channel routing and authorization server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! beacon
//!
//! # Run with custom config
//! beacon  # reads beacon.toml from cwd, /etc/beacon/, ~/.config/beacon/
//!
//! # Run with environment variables
//! BEACON_PORT=8080 BEACON_HOST=0.0.0.0 beacon
//! ```

mod config;
mod http;
mod metrics;
mod session;

use anyhow::Result;
use beacon_core::{
    BusConfig, ChannelActivityRelay, ChannelBus, Dispatcher, NamespaceRegistry, Publisher,
};
use beacon_handlers::{
    AccessPolicy, BroadcastHandler, CursorHandler, DashboardHandler, MemoryAccess,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Beacon server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Wire the core: bus, entitlements, handlers, registry, dispatcher.
    let bus = Arc::new(ChannelBus::with_config(BusConfig {
        max_subscriptions_per_session: config.limits.max_subscriptions_per_session,
        channel_capacity: config.limits.channel_capacity,
    }));
    let memory_access = MemoryAccess::new();
    for resource in &config.access {
        memory_access.add_resource(&resource.uid);
        memory_access.set_public(&resource.uid, resource.public);
        for user in &resource.viewers {
            memory_access.grant_read(*user, &resource.uid);
        }
        for user in &resource.editors {
            memory_access.grant_write(*user, &resource.uid);
        }
    }
    let access: Arc<dyn AccessPolicy> = Arc::new(memory_access);
    let notifier = Arc::new(ChannelActivityRelay::new(Publisher::new(Arc::clone(&bus))));

    let registry = NamespaceRegistry::builder()
        .register(
            "dashboard/",
            Arc::new(DashboardHandler::new(
                Arc::clone(&access),
                notifier,
                Arc::clone(&bus),
            )),
        )
        .register("cursor/", Arc::new(CursorHandler::new(Arc::clone(&access))))
        .register(
            "broadcast/",
            Arc::new(BroadcastHandler::new(Arc::clone(&access), Arc::clone(&bus))),
        )
        .build();

    let dispatcher = Dispatcher::new(Arc::new(registry), bus);

    // Start the server
    http::run_server(config, dispatcher).await?;

    Ok(())
}
