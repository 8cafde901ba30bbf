//! Application state management

use cecd_core::LogicalAddress;
use cecd_discovery::{DeviceHost, DiscoveryService};
use cecd_monitor::{ActiveSource, Monitor};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::store::DeviceStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    /// Adapter session
    pub monitor: Arc<Monitor>,
    /// Device registry driven by bus traffic
    pub discovery: Arc<DiscoveryService>,
    /// Host-side device view
    pub store: Arc<DeviceStore>,
    pub started: DateTime<Utc>,
}

/// Daemon and adapter summary
#[derive(Debug, Serialize)]
pub struct Status {
    pub version: &'static str,
    pub ready: bool,
    pub own_address: LogicalAddress,
    pub active_source: Option<ActiveSource>,
    pub pending_commands: usize,
    pub devices: usize,
    /// Devices seen on the bus since startup
    pub registered: usize,
    pub pending_devices: usize,
    pub started: DateTime<Utc>,
}

impl AppState {
    /// Wire up monitor, store and discovery; nothing is started yet
    pub fn new(config: Config) -> Arc<Self> {
        let monitor = Monitor::new(config.to_monitor_config());
        let store = Arc::new(DeviceStore::new(config.known_devices()));
        let discovery = DiscoveryService::new(
            Arc::clone(&monitor),
            Arc::clone(&store) as Arc<dyn DeviceHost>,
            config.to_discovery_config(),
        );

        info!(
            program = %config.adapter.program,
            known = config.known_devices.len(),
            "Application state created"
        );

        Arc::new(Self {
            config,
            monitor,
            discovery,
            store,
            started: Utc::now(),
        })
    }

    pub async fn status(&self) -> Status {
        Status {
            version: env!("CARGO_PKG_VERSION"),
            ready: self.monitor.is_ready(),
            own_address: self.monitor.own_address().await,
            active_source: self.monitor.active_source().await,
            pending_commands: self.monitor.pending_commands(),
            devices: self.discovery.devices().await.len(),
            registered: self.store.registered_count(),
            pending_devices: self.discovery.pending_count().await,
            started: self.started,
        }
    }
}
