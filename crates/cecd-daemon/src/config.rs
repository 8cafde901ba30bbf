//! Configuration loading

use anyhow::{Context, Result};
use cecd_core::protocol::DeviceType;
use cecd_core::PhysicalAddress;
use cecd_discovery::{Attribute, DiscoveryConfig, KnownDevice, RegistryConfig, RetryPolicy};
use cecd_monitor::{AdapterParams, MonitorConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// `cec-client` log mask without debug lines: error, warning, notice, traffic
const LOG_MASK_DEFAULT: u8 = 0x0F;
/// Same plus debug lines
const LOG_MASK_DEBUG: u8 = 0x1F;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default, rename = "known_device")]
    pub known_devices: Vec<KnownDeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the web server
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8085".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default = "default_osd_name")]
    pub osd_name: String,
    #[serde(default = "default_hdmi_port")]
    pub hdmi_port: u8,
    /// Autodetected when absent
    #[serde(default)]
    pub com_port: Option<String>,
    /// Include adapter debug lines
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_true")]
    pub auto_restart: bool,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_restart_delay")]
    pub restart_delay_secs: u64,
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    #[serde(default = "default_hold_interval")]
    pub user_control_hold_interval_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            device_type: DeviceType::default(),
            osd_name: default_osd_name(),
            hdmi_port: default_hdmi_port(),
            com_port: None,
            debug: false,
            auto_restart: true,
            command_timeout_secs: default_command_timeout(),
            restart_delay_secs: default_restart_delay(),
            ready_timeout_secs: default_ready_timeout(),
            user_control_hold_interval_ms: default_hold_interval(),
        }
    }
}

fn default_program() -> String {
    "cec-client".to_string()
}

fn default_osd_name() -> String {
    "cecd".to_string()
}

fn default_hdmi_port() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

fn default_command_timeout() -> u64 {
    3
}

fn default_restart_delay() -> u64 {
    15
}

fn default_ready_timeout() -> u64 {
    60
}

fn default_hold_interval() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySection {
    /// Drop devices that never report a name instead of naming them `Unknown_<X>`
    #[serde(default)]
    pub ignore_unnamed: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_name_retry")]
    pub name_retry_secs: u64,
    #[serde(default = "default_address_retry")]
    pub address_retry_secs: u64,
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
    #[serde(default = "default_true")]
    pub scan_on_ready: bool,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            ignore_unnamed: false,
            max_attempts: default_max_attempts(),
            name_retry_secs: default_name_retry(),
            address_retry_secs: default_address_retry(),
            tick_ms: default_tick(),
            scan_on_ready: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    11
}

fn default_name_retry() -> u64 {
    3
}

fn default_address_retry() -> u64 {
    60
}

fn default_tick() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Periodically ask the TV for its power status
    #[serde(default)]
    pub power_states: bool,
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            power_states: false,
            interval_secs: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

/// Device remembered across restarts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownDeviceConfig {
    pub name: String,
    #[serde(default)]
    pub physical_address: Option<PhysicalAddress>,
    #[serde(default)]
    pub vendor: Option<String>,
}

impl Config {
    pub fn to_monitor_config(&self) -> MonitorConfig {
        let adapter = &self.adapter;
        MonitorConfig {
            adapter: AdapterParams {
                program: adapter.program.clone(),
                device_type: adapter.device_type,
                osd_name: adapter.osd_name.clone(),
                hdmi_port: adapter.hdmi_port,
                com_port: adapter.com_port.clone(),
                log_mask: if adapter.debug {
                    LOG_MASK_DEBUG
                } else {
                    LOG_MASK_DEFAULT
                },
            },
            auto_restart: adapter.auto_restart,
            restart_delay: Duration::from_secs(adapter.restart_delay_secs),
            command_timeout: Duration::from_secs(adapter.command_timeout_secs),
            user_control_hold_interval: Duration::from_millis(
                adapter.user_control_hold_interval_ms,
            ),
        }
    }

    pub fn to_discovery_config(&self) -> DiscoveryConfig {
        let discovery = &self.discovery;
        DiscoveryConfig {
            registry: RegistryConfig {
                ignore_unnamed: discovery.ignore_unnamed,
                name_retry: RetryPolicy::new(
                    discovery.max_attempts,
                    Duration::from_secs(discovery.name_retry_secs),
                ),
                address_retry: RetryPolicy::new(
                    discovery.max_attempts,
                    Duration::from_secs(discovery.address_retry_secs),
                ),
            },
            tick_interval: Duration::from_millis(discovery.tick_ms.max(1)),
            scan_on_ready: discovery.scan_on_ready,
            ..DiscoveryConfig::default()
        }
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter.ready_timeout_secs)
    }

    pub fn known_devices(&self) -> Vec<KnownDevice> {
        self.known_devices
            .iter()
            .map(|entry| {
                let mut device = KnownDevice::new(entry.name.clone());
                if let Some(address) = entry.physical_address {
                    device = device.with_physical_address(address);
                }
                if let Some(vendor) = &entry.vendor {
                    device = device.with_attribute(Attribute::Vendor, vendor.as_str());
                }
                device
            })
            .collect()
    }
}

/// Load configuration from file, falling back to defaults when it is missing
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
