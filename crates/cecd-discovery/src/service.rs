//! Discovery service: drives the registry from the monitor bus

use cecd_core::{LogicalAddress, PhysicalAddress};
use cecd_monitor::{Message, Monitor, MonitorEvent};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::attribute::{Attribute, AttributeValue};
use crate::host::DeviceHost;
use crate::registry::{DeviceRecord, DeviceRegistry, RegistryAction, RegistryConfig};

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub registry: RegistryConfig,
    /// Retry scheduler period
    pub tick_interval: Duration,
    /// Ask the adapter to scan the bus once it is ready
    pub scan_on_ready: bool,
    pub scan_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            tick_interval: Duration::from_secs(1),
            scan_on_ready: true,
            scan_delay: Duration::from_secs(1),
        }
    }
}

/// Registry changes for real-time consumers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    DeviceRegistered {
        name: String,
    },
    DeviceActive {
        name: String,
        logical_address: LogicalAddress,
    },
    DeviceInactive {
        name: String,
        logical_address: LogicalAddress,
    },
    AttributeChanged {
        device: String,
        attribute: Attribute,
        value: AttributeValue,
    },
}

pub struct DiscoveryService {
    monitor: Arc<Monitor>,
    host: Arc<dyn DeviceHost>,
    registry: RwLock<DeviceRegistry>,
    config: DiscoveryConfig,
    event_tx: broadcast::Sender<DiscoveryEvent>,
}

impl DiscoveryService {
    /// Create the service and seed the registry with the host's known devices
    pub fn new(monitor: Arc<Monitor>, host: Arc<dyn DeviceHost>, config: DiscoveryConfig) -> Arc<Self> {
        let mut registry = DeviceRegistry::new(config.registry.clone());
        let known = host.known_devices();
        info!(count = known.len(), "Seeding registry with known devices");
        for device in known {
            registry.seed(device);
        }

        let (event_tx, _) = broadcast::channel(100);
        Arc::new(Self {
            monitor,
            host,
            registry: RwLock::new(registry),
            config,
            event_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_tx.subscribe()
    }

    pub async fn devices(&self) -> Vec<DeviceRecord> {
        self.registry.read().await.devices().cloned().collect()
    }

    pub async fn device(&self, name: &str) -> Option<DeviceRecord> {
        self.registry.read().await.device(name).cloned()
    }

    pub async fn device_at(&self, logical: LogicalAddress) -> Option<DeviceRecord> {
        self.registry.read().await.device_at(logical).cloned()
    }

    pub async fn find_by_physical(&self, physical: PhysicalAddress) -> Option<DeviceRecord> {
        self.registry.read().await.find_by_physical(physical).cloned()
    }

    /// Logical addresses still being identified
    pub async fn pending_count(&self) -> usize {
        self.registry.read().await.pending_devices().count()
    }

    /// Subscribe to the monitor and run in the background
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let events = self.monitor.subscribe();
        let service = Arc::clone(self);
        tokio::spawn(async move { service.run(events).await })
    }

    async fn run(&self, mut events: broadcast::Receiver<MonitorEvent>) {
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ready = self.monitor.is_ready();
        self.registry.write().await.set_bus_ready(ready);
        let mut scan_at = self.schedule_scan(ready);

        info!("Discovery service started");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(MonitorEvent::Decoded(event)) => {
                        let actions = self.registry.write().await.handle_event(&event, Instant::now());
                        self.execute(actions).await;
                    }
                    Ok(MonitorEvent::Ready) => {
                        self.registry.write().await.set_bus_ready(true);
                        scan_at = self.schedule_scan(true);
                    }
                    Ok(MonitorEvent::Restarting { .. }) | Ok(MonitorEvent::Stopped { .. }) => {
                        debug!("Adapter unavailable, pausing discovery queries");
                        self.registry.write().await.set_bus_ready(false);
                        scan_at = None;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Discovery fell behind the bus");
                    }
                    Err(RecvError::Closed) => {
                        info!("Monitor bus closed, discovery service exiting");
                        return;
                    }
                },
                _ = ticker.tick() => {
                    let actions = self.registry.write().await.tick(Instant::now());
                    self.execute(actions).await;
                }
                _ = scan_due(scan_at) => {
                    scan_at = None;
                    info!("Scanning bus");
                    if let Err(e) = self.monitor.write_raw("scan").await {
                        warn!("Bus scan failed: {}", e);
                    }
                }
            }
        }
    }

    fn schedule_scan(&self, ready: bool) -> Option<Instant> {
        (ready && self.config.scan_on_ready).then(|| Instant::now() + self.config.scan_delay)
    }

    async fn execute(&self, actions: Vec<RegistryAction>) {
        for action in actions {
            match action {
                RegistryAction::Register { name } => {
                    self.host.register_device(&name);
                    let _ = self.event_tx.send(DiscoveryEvent::DeviceRegistered { name });
                }
                RegistryAction::SetAttribute {
                    device,
                    attribute,
                    value,
                    fresh,
                } => {
                    self.host
                        .set_device_attribute(&device, attribute, value.clone(), fresh);
                    let _ = self.event_tx.send(DiscoveryEvent::AttributeChanged {
                        device,
                        attribute,
                        value,
                    });
                }
                RegistryAction::SetActive {
                    device,
                    active,
                    logical,
                } => {
                    self.host.set_device_active(&device, active, logical);
                    let event = if active {
                        DiscoveryEvent::DeviceActive {
                            name: device,
                            logical_address: logical,
                        }
                    } else {
                        DiscoveryEvent::DeviceInactive {
                            name: device,
                            logical_address: logical,
                        }
                    };
                    let _ = self.event_tx.send(event);
                }
                RegistryAction::Query { target, opcode } => {
                    if let Err(e) = self.monitor.send_message(&Message::new(target, opcode)).await {
                        debug!(target = %target, opcode = %opcode, "Discovery query not sent: {}", e);
                    }
                }
            }
        }
    }
}

async fn scan_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::KnownDevice;
    use cecd_monitor::{MonitorConfig, SessionEnd};
    use std::sync::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

    #[derive(Default)]
    struct RecordingHost {
        calls: Mutex<Vec<String>>,
        known: Vec<KnownDevice>,
    }

    impl DeviceHost for RecordingHost {
        fn register_device(&self, name: &str) {
            self.calls.lock().unwrap().push(format!("register {}", name));
        }

        fn set_device_attribute(&self, device: &str, attribute: Attribute, value: AttributeValue, _fresh: bool) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}.{} = {}", device, attribute, value));
        }

        fn set_device_active(&self, device: &str, active: bool, logical: LogicalAddress) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} active={} at {}", device, active, logical));
        }

        fn known_devices(&self) -> Vec<KnownDevice> {
            self.known.clone()
        }
    }

    struct Adapter {
        output: DuplexStream,
        input: Lines<BufReader<DuplexStream>>,
        _session: JoinHandle<SessionEnd>,
    }

    impl Adapter {
        fn start(monitor: &Arc<Monitor>) -> Self {
            let (output, adapter_stdout) = tokio::io::duplex(4096);
            let (adapter_stdin, input) = tokio::io::duplex(4096);
            let session_monitor = Arc::clone(monitor);
            let session = tokio::spawn(async move {
                session_monitor
                    .run_session(adapter_stdout, adapter_stdin)
                    .await
            });
            Self {
                output,
                input: BufReader::new(input).lines(),
                _session: session,
            }
        }

        async fn say(&mut self, line: &str) {
            self.output
                .write_all(format!("{}\n", line).as_bytes())
                .await
                .unwrap();
        }

        async fn next_command(&mut self) -> String {
            self.input.next_line().await.unwrap().unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_after_ready() {
        let monitor = Monitor::new(MonitorConfig::default());
        let host = Arc::new(RecordingHost::default());
        let service = DiscoveryService::new(Arc::clone(&monitor), host, DiscoveryConfig::default());
        let mut adapter = Adapter::start(&monitor);
        service.spawn();

        let started = Instant::now();
        adapter.say("waiting for input").await;
        assert_eq!(adapter.next_command().await, "scan");
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_device_is_queried_for_its_name() {
        let monitor = Monitor::new(MonitorConfig::default());
        let host = Arc::new(RecordingHost::default());
        let service = DiscoveryService::new(Arc::clone(&monitor), host, DiscoveryConfig::default());
        let mut adapter = Adapter::start(&monitor);
        service.spawn();

        adapter.say("waiting for input").await;
        adapter.say("TRAFFIC: [  120]\t>> 8f:36").await;

        let commands = vec![adapter.next_command().await, adapter.next_command().await];
        assert!(commands.contains(&"tx 18:46".to_string()));
        assert!(commands.contains(&"scan".to_string()));
    }

    #[tokio::test]
    async fn test_named_device_reaches_host() {
        let monitor = Monitor::new(MonitorConfig::default());
        let host = Arc::new(RecordingHost::default());
        let service = DiscoveryService::new(
            Arc::clone(&monitor),
            Arc::clone(&host) as Arc<dyn DeviceHost>,
            DiscoveryConfig::default(),
        );
        let mut events = service.subscribe();
        let mut adapter = Adapter::start(&monitor);
        service.spawn();

        adapter.say("waiting for input").await;
        adapter.say("TRAFFIC: [  121]\t>> 40:47:4b:6f:64:69").await;

        loop {
            if let DiscoveryEvent::DeviceActive { name, .. } = events.recv().await.unwrap() {
                assert_eq!(name, "Kodi");
                break;
            }
        }

        let calls = host.calls.lock().unwrap().clone();
        assert_eq!(calls[0], "register Kodi");
        assert_eq!(calls[1], "Kodi active=true at 4");
        assert!(service.device("Kodi").await.unwrap().active);
        assert_eq!(service.device_at(LogicalAddress::PLAYBACK_1).await.unwrap().name, "Kodi");
    }

    #[tokio::test]
    async fn test_known_devices_are_seeded() {
        let monitor = Monitor::new(MonitorConfig::default());
        let host = Arc::new(RecordingHost {
            known: vec![KnownDevice::new("Living Room TV").with_physical_address(PhysicalAddress::ROOT)],
            ..Default::default()
        });
        let service = DiscoveryService::new(monitor, host, DiscoveryConfig::default());

        let device = service.device("Living_Room_TV").await.unwrap();
        assert!(!device.active);
        assert_eq!(
            service.find_by_physical(PhysicalAddress::ROOT).await.unwrap().name,
            "Living_Room_TV"
        );
    }
}
