//! Device registry and discovery state machine
//!
//! The registry turns bus traffic into device identities. It performs no I/O:
//! every effect (host updates, queries to send) is returned as a
//! [`RegistryAction`] for the caller to carry out.
//!
//! An unrecognized logical address gets a [`PendingDevice`] that walks
//! `Unknown -> AwaitingName -> AwaitingPhysicalAddress` until a name is known.
//! Resolution attaches it to a [`DeviceRecord`] keyed by the cleaned name.

use cecd_core::{DecodedEvent, LogicalAddress, Opcode, PhysicalAddress};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::attribute::{clean_name, Attribute, AttributeValue};
use crate::host::KnownDevice;
use crate::retry::{RetryDecision, RetryPolicy, RetryState};

const TV_NAME: &str = "TV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    Unknown,
    AwaitingName,
    AwaitingPhysicalAddress,
    Resolved,
    Active,
    Ignored,
}

/// Effect requested by the registry
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryAction {
    Register {
        name: String,
    },
    SetAttribute {
        device: String,
        attribute: Attribute,
        value: AttributeValue,
        fresh: bool,
    },
    SetActive {
        device: String,
        active: bool,
        logical: LogicalAddress,
    },
    Query {
        target: LogicalAddress,
        opcode: Opcode,
    },
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Give up on devices that never report a name instead of synthesizing one
    pub ignore_unnamed: bool,
    pub name_retry: RetryPolicy,
    pub address_retry: RetryPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ignore_unnamed: false,
            name_retry: RetryPolicy::new(11, Duration::from_secs(3)),
            address_retry: RetryPolicy::new(11, Duration::from_secs(60)),
        }
    }
}

/// A logical address seen on the bus whose identity is not resolved yet
#[derive(Debug, Clone)]
pub struct PendingDevice {
    pub logical_address: LogicalAddress,
    /// Raw name, once reported
    pub name: Option<String>,
    pub physical_address: Option<PhysicalAddress>,
    pub state: DiscoveryState,
    pub name_retry: RetryState,
    pub address_retry: RetryState,
    pub attributes: BTreeMap<Attribute, AttributeValue>,
}

impl PendingDevice {
    fn new(logical_address: LogicalAddress) -> Self {
        Self {
            logical_address,
            name: None,
            physical_address: None,
            state: DiscoveryState::Unknown,
            name_retry: RetryState::default(),
            address_retry: RetryState::default(),
            attributes: BTreeMap::new(),
        }
    }

    fn absorb(&mut self, event: &DecodedEvent) {
        match event.opcode() {
            Some(Opcode::SetOsdName) => {
                if let Some(text) = event.data.text().filter(|t| !clean_name(t).is_empty()) {
                    self.name = Some(text.to_string());
                }
            }
            Some(Opcode::ReportPhysicalAddress) => {
                self.physical_address = event.data.physical_address();
            }
            _ => {}
        }
        if let Some(attribute) = Attribute::for_event(event.kind).filter(|a| !is_identity(*a)) {
            if let Some(value) = attribute.value_from(event) {
                self.attributes.insert(attribute, value);
            }
        }
    }

    pub fn name_attempts(&self) -> u32 {
        self.name_retry.attempts()
    }

    pub fn address_attempts(&self) -> u32 {
        self.address_retry.attempts()
    }
}

/// A resolved device identity
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRecord {
    pub name: String,
    /// Last logical address the device used; meaningful while active
    pub logical_address: Option<LogicalAddress>,
    pub physical_address: Option<PhysicalAddress>,
    pub state: DiscoveryState,
    pub active: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub attributes: BTreeMap<Attribute, AttributeValue>,
    /// Set while a physical address disagreement is being re-verified
    #[serde(skip)]
    pub reverify_address: bool,
}

impl DeviceRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            logical_address: None,
            physical_address: None,
            state: DiscoveryState::Resolved,
            active: false,
            last_seen: None,
            attributes: BTreeMap::new(),
            reverify_address: false,
        }
    }

    /// Every known field as host updates
    fn replay(&self, fresh: bool) -> Vec<RegistryAction> {
        let set = |attribute: Attribute, value: AttributeValue| RegistryAction::SetAttribute {
            device: self.name.clone(),
            attribute,
            value,
            fresh,
        };

        let mut actions = vec![set(Attribute::Name, self.name.clone().into())];
        if let Some(logical) = self.logical_address {
            actions.push(set(
                Attribute::LogicalAddress,
                AttributeValue::Number(logical.value() as u32),
            ));
        }
        if let Some(physical) = self.physical_address {
            actions.push(set(Attribute::PhysicalAddress, physical.to_string().into()));
        }
        actions.push(set(Attribute::Active, self.active.into()));
        if let Some(seen) = self.last_seen {
            actions.push(set(Attribute::LastSeen, seen.to_rfc3339().into()));
        }
        for (attribute, value) in &self.attributes {
            actions.push(set(*attribute, value.clone()));
        }
        actions
    }
}

/// Attributes kept as dedicated record fields
fn is_identity(attribute: Attribute) -> bool {
    matches!(
        attribute,
        Attribute::Name
            | Attribute::PhysicalAddress
            | Attribute::LogicalAddress
            | Attribute::Active
            | Attribute::LastSeen
    )
}

pub struct DeviceRegistry {
    config: RegistryConfig,
    devices: BTreeMap<String, DeviceRecord>,
    pending: BTreeMap<LogicalAddress, PendingDevice>,
    by_logical: BTreeMap<LogicalAddress, String>,
    bus_ready: bool,
}

impl DeviceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            devices: BTreeMap::new(),
            pending: BTreeMap::new(),
            by_logical: BTreeMap::new(),
            bus_ready: false,
        }
    }

    /// Remember a device from an earlier run; it stays inactive until seen
    pub fn seed(&mut self, known: KnownDevice) {
        let name = clean_name(&known.name);
        if name.is_empty() {
            return;
        }
        let device = self
            .devices
            .entry(name.clone())
            .or_insert_with(|| DeviceRecord::new(&name));
        device.physical_address = known.physical_address.or(device.physical_address);
        device.attributes.extend(
            known
                .attributes
                .into_iter()
                .filter(|(attribute, _)| !is_identity(*attribute)),
        );
        debug!(device = %name, "Seeded known device");
    }

    /// Queries are only issued while the adapter accepts input
    pub fn set_bus_ready(&mut self, ready: bool) {
        self.bus_ready = ready;
    }

    pub fn device(&self, name: &str) -> Option<&DeviceRecord> {
        self.devices.get(name)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    /// Active device currently using `logical`
    pub fn device_at(&self, logical: LogicalAddress) -> Option<&DeviceRecord> {
        self.by_logical
            .get(&logical)
            .and_then(|name| self.devices.get(name))
    }

    pub fn pending(&self, logical: LogicalAddress) -> Option<&PendingDevice> {
        self.pending.get(&logical)
    }

    pub fn pending_devices(&self) -> impl Iterator<Item = &PendingDevice> {
        self.pending.values()
    }

    /// Device with this physical address, falling back to the first nibble (HDMI input)
    pub fn find_by_physical(&self, physical: PhysicalAddress) -> Option<&DeviceRecord> {
        self.devices
            .values()
            .find(|d| d.physical_address == Some(physical))
            .or_else(|| {
                self.devices.values().find(|d| {
                    d.physical_address
                        .is_some_and(|p| p.nibbles()[0] == physical.nibbles()[0])
                })
            })
    }

    /// Feed one decoded bus event
    pub fn handle_event(&mut self, event: &DecodedEvent, now: Instant) -> Vec<RegistryAction> {
        let mut actions = Vec::new();
        let source = event.packet.source;
        if !event.packet.is_inbound() || source.is_broadcast() {
            return actions;
        }
        self.process(event, now, &mut actions);
        actions
    }

    /// Advance retries of every unresolved logical address
    pub fn tick(&mut self, now: Instant) -> Vec<RegistryAction> {
        let mut actions = Vec::new();
        let logicals: Vec<LogicalAddress> = self.pending.keys().copied().collect();
        for logical in logicals {
            self.advance(logical, now, &mut actions);
        }
        actions
    }

    fn process(&mut self, event: &DecodedEvent, now: Instant, actions: &mut Vec<RegistryAction>) {
        let source = event.packet.source;

        if let Some(name) = self.by_logical.get(&source).cloned() {
            if !self.identity_conflict(&name, event, now, actions) {
                self.update_device(&name, event, actions);
            }
            return;
        }

        self.pending
            .entry(source)
            .or_insert_with(|| {
                debug!(logical = %source, "New logical address on the bus");
                PendingDevice::new(source)
            })
            .absorb(event);
        self.advance(source, now, actions);
    }

    fn advance(&mut self, logical: LogicalAddress, now: Instant, actions: &mut Vec<RegistryAction>) {
        let Some(record) = self.pending.get_mut(&logical) else {
            return;
        };

        if record.name.is_none() && logical == LogicalAddress::TV {
            record.name = Some(TV_NAME.to_string());
        }
        if let Some(name) = record.name.clone() {
            self.resolve(logical, &name, actions);
            return;
        }
        if record.state == DiscoveryState::Ignored || !self.bus_ready {
            return;
        }

        if matches!(
            record.state,
            DiscoveryState::Unknown | DiscoveryState::AwaitingName
        ) {
            record.state = DiscoveryState::AwaitingName;
            match record.name_retry.poll(&self.config.name_retry, now) {
                RetryDecision::Attempt => {
                    debug!(logical = %logical, attempt = record.name_retry.attempts(), "Requesting OSD name");
                    actions.push(RegistryAction::Query {
                        target: logical,
                        opcode: Opcode::GiveOsdName,
                    });
                    return;
                }
                RetryDecision::Wait => return,
                RetryDecision::Exhausted if self.config.ignore_unnamed => {
                    info!(logical = %logical, "Device never reported a name, ignoring it");
                    record.state = DiscoveryState::Ignored;
                    return;
                }
                RetryDecision::Exhausted => {
                    debug!(logical = %logical, "No name reported, falling back to physical address");
                    record.state = DiscoveryState::AwaitingPhysicalAddress;
                }
            }
        }

        let name = match record.physical_address {
            Some(physical) => physical.compact(),
            None => match record.address_retry.poll(&self.config.address_retry, now) {
                RetryDecision::Attempt => {
                    debug!(logical = %logical, attempt = record.address_retry.attempts(), "Requesting physical address");
                    actions.push(RegistryAction::Query {
                        target: logical,
                        opcode: Opcode::GivePhysicalAddress,
                    });
                    return;
                }
                RetryDecision::Wait => return,
                RetryDecision::Exhausted => {
                    warn!(logical = %logical, "Could not find a name for device");
                    format!("Unknown {}", logical.hex())
                }
            },
        };
        self.resolve(logical, &name, actions);
    }

    fn resolve(&mut self, logical: LogicalAddress, raw_name: &str, actions: &mut Vec<RegistryAction>) {
        let name = clean_name(raw_name);
        let pending = self.pending.remove(&logical);

        if let Some(previous) = self.by_logical.remove(&logical) {
            if previous != name {
                self.deactivate(&previous, actions);
            }
        }

        if self.devices.contains_key(&name) {
            info!(device = %name, logical = %logical, "Known device seen again");
        } else {
            info!(device = %name, logical = %logical, "New device");
            actions.push(RegistryAction::Register { name: name.clone() });
            self.devices.insert(name.clone(), DeviceRecord::new(&name));
        }

        let Some(device) = self.devices.get_mut(&name) else {
            return;
        };

        // The identity may have moved from another logical address
        if let Some(old) = device.logical_address.filter(|old| *old != logical) {
            if self.by_logical.get(&old) == Some(&name) {
                self.by_logical.remove(&old);
            }
        }

        if let Some(pending) = pending {
            if pending.physical_address.is_some() {
                device.physical_address = pending.physical_address;
            }
            device.attributes.extend(pending.attributes);
        }
        device.logical_address = Some(logical);
        device.active = true;
        device.reverify_address = false;
        device.state = DiscoveryState::Active;
        device.last_seen = Some(Utc::now());
        self.by_logical.insert(logical, name.clone());

        actions.push(RegistryAction::SetActive {
            device: name,
            active: true,
            logical,
        });
        actions.extend(device.replay(true));
    }

    fn deactivate(&mut self, name: &str, actions: &mut Vec<RegistryAction>) {
        let Some(device) = self.devices.get_mut(name) else {
            return;
        };
        if let Some(logical) = device.logical_address {
            if self.by_logical.get(&logical).map(String::as_str) == Some(name) {
                self.by_logical.remove(&logical);
            }
        }
        device.state = DiscoveryState::Unknown;
        if device.active {
            device.active = false;
            info!(device = %name, "Device deactivated");
            if let Some(logical) = device.logical_address {
                actions.push(RegistryAction::SetActive {
                    device: name.to_string(),
                    active: false,
                    logical,
                });
            }
        }
    }

    /// Handle a report that contradicts the identity of an active device
    ///
    /// Returns true when the event has been reprocessed.
    fn identity_conflict(
        &mut self,
        name: &str,
        event: &DecodedEvent,
        now: Instant,
        actions: &mut Vec<RegistryAction>,
    ) -> bool {
        match event.opcode() {
            Some(Opcode::SetOsdName) => {
                let Some(reported) = event.data.text().map(clean_name) else {
                    return false;
                };
                if reported.is_empty() || reported == name {
                    return false;
                }
                warn!(device = %name, reported = %reported, "Device changed its name");
                self.deactivate(name, actions);
                self.process(event, now, actions);
                true
            }
            Some(Opcode::ReportPhysicalAddress) => {
                let Some(reported) = event.data.physical_address() else {
                    return false;
                };
                let Some(device) = self.devices.get_mut(name) else {
                    return false;
                };
                match device.physical_address {
                    Some(confirmed) if confirmed != reported => {
                        if device.reverify_address {
                            info!(device = %name, physical = %reported, "Accepting new physical address");
                            return false;
                        }
                        warn!(
                            device = %name,
                            confirmed = %confirmed,
                            reported = %reported,
                            "Physical address changed, re-verifying identity"
                        );
                        device.reverify_address = true;
                        self.deactivate(name, actions);
                        self.process(event, now, actions);
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn update_device(&mut self, name: &str, event: &DecodedEvent, actions: &mut Vec<RegistryAction>) {
        let Some(device) = self.devices.get_mut(name) else {
            return;
        };
        if !device.active {
            return;
        }
        let seen = Utc::now();
        device.last_seen = Some(seen);

        let Some(attribute) = Attribute::for_event(event.kind) else {
            return;
        };
        let Some(value) = attribute.value_from(event) else {
            return;
        };

        match attribute {
            Attribute::PhysicalAddress => device.physical_address = event.data.physical_address(),
            Attribute::Name | Attribute::Active => {}
            _ => {
                device.attributes.insert(attribute, value.clone());
            }
        }
        debug!(device = %name, attribute = %attribute, value = %value, "Attribute updated");

        actions.push(RegistryAction::SetAttribute {
            device: name.to_string(),
            attribute,
            value,
            fresh: true,
        });
        actions.push(RegistryAction::SetAttribute {
            device: name.to_string(),
            attribute: Attribute::LastSeen,
            value: seen.to_rfc3339().into(),
            fresh: true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cecd_core::{decode_event, decode_packet};

    fn event(line: &str) -> DecodedEvent {
        decode_event(&decode_packet(line).unwrap()).unwrap()
    }

    fn ready_registry(config: RegistryConfig) -> DeviceRegistry {
        let mut registry = DeviceRegistry::new(config);
        registry.set_bus_ready(true);
        registry
    }

    fn registrations(actions: &[RegistryAction]) -> Vec<String> {
        actions
            .iter()
            .filter_map(|a| match a {
                RegistryAction::Register { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn queries(actions: &[RegistryAction], opcode: Opcode) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, RegistryAction::Query { opcode: o, .. } if *o == opcode))
            .count()
    }

    fn active_count_at(registry: &DeviceRegistry, logical: LogicalAddress) -> usize {
        registry
            .devices()
            .filter(|d| d.active && d.logical_address == Some(logical))
            .count()
    }

    #[test]
    fn test_tv_is_named_without_query() {
        let mut registry = ready_registry(RegistryConfig::default());
        let actions = registry.handle_event(&event(">> 0f:36"), Instant::now());

        assert_eq!(registrations(&actions), vec!["TV"]);
        assert_eq!(queries(&actions, Opcode::GiveOsdName), 0);
        let tv = registry.device_at(LogicalAddress::TV).unwrap();
        assert_eq!(tv.state, DiscoveryState::Active);
        assert!(tv.last_seen.is_some());
    }

    #[test]
    fn test_name_report_resolves_directly() {
        let mut registry = ready_registry(RegistryConfig::default());
        let actions = registry.handle_event(&event(">> 40:47:46:69:72:65:20:54:56"), Instant::now());

        assert_eq!(registrations(&actions), vec!["Fire_TV"]);
        assert!(actions.contains(&RegistryAction::SetActive {
            device: "Fire_TV".to_string(),
            active: true,
            logical: LogicalAddress::PLAYBACK_1,
        }));
        assert!(registry.pending(LogicalAddress::PLAYBACK_1).is_none());
    }

    #[test]
    fn test_unknown_device_first_requests_name() {
        let mut registry = ready_registry(RegistryConfig::default());
        let now = Instant::now();
        let actions = registry.handle_event(&event(">> 8f:36"), now);

        assert_eq!(
            actions,
            vec![RegistryAction::Query {
                target: LogicalAddress::new(8).unwrap(),
                opcode: Opcode::GiveOsdName,
            }]
        );
        let pending = registry.pending(LogicalAddress::new(8).unwrap()).unwrap();
        assert_eq!(pending.state, DiscoveryState::AwaitingName);
        assert_eq!(pending.name_attempts(), 1);

        // Further traffic inside the retry interval does not re-query
        let actions = registry.handle_event(&event(">> 8f:36"), now + Duration::from_secs(1));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_silent_device_falls_back_to_logical_name() {
        let mut registry = ready_registry(RegistryConfig::default());
        let start = Instant::now();
        let mut actions = registry.handle_event(&event(">> bf:36"), start);

        for second in 1..1000 {
            actions.extend(registry.tick(start + Duration::from_secs(second)));
        }

        assert_eq!(queries(&actions, Opcode::GiveOsdName), 11);
        assert_eq!(queries(&actions, Opcode::GivePhysicalAddress), 11);
        assert_eq!(registrations(&actions), vec!["Unknown_B"]);
        assert_eq!(
            registry.device_at(LogicalAddress::new(11).unwrap()).unwrap().name,
            "Unknown_B"
        );
    }

    #[test]
    fn test_known_physical_address_gives_synthetic_name() {
        let config = RegistryConfig {
            name_retry: RetryPolicy::new(1, Duration::from_secs(3)),
            ..Default::default()
        };
        let mut registry = ready_registry(config);
        let start = Instant::now();

        registry.handle_event(&event(">> 4f:84:21:00:04"), start);
        let actions = registry.tick(start + Duration::from_secs(3));

        assert_eq!(registrations(&actions), vec!["2100"]);
        let device = registry.device("2100").unwrap();
        assert_eq!(device.physical_address, Some(PhysicalAddress(0x2100)));
    }

    #[test]
    fn test_ignore_unnamed() {
        let config = RegistryConfig {
            ignore_unnamed: true,
            name_retry: RetryPolicy::new(2, Duration::from_secs(3)),
            ..Default::default()
        };
        let mut registry = ready_registry(config);
        let start = Instant::now();
        let mut actions = registry.handle_event(&event(">> 8f:36"), start);
        for second in 1..600 {
            actions.extend(registry.tick(start + Duration::from_secs(second)));
        }

        assert_eq!(queries(&actions, Opcode::GiveOsdName), 2);
        assert_eq!(queries(&actions, Opcode::GivePhysicalAddress), 0);
        assert!(registrations(&actions).is_empty());
        assert_eq!(
            registry.pending(LogicalAddress::new(8).unwrap()).unwrap().state,
            DiscoveryState::Ignored
        );

        // A late name report still resolves the device
        let actions = registry.handle_event(&event(">> 80:47:42:44"), start + Duration::from_secs(601));
        assert_eq!(registrations(&actions), vec!["BD"]);
    }

    #[test]
    fn test_no_queries_until_bus_ready() {
        let mut registry = DeviceRegistry::new(RegistryConfig::default());
        let start = Instant::now();
        assert!(registry.handle_event(&event(">> 4f:36"), start).is_empty());

        registry.set_bus_ready(true);
        let actions = registry.tick(start + Duration::from_secs(1));
        assert_eq!(queries(&actions, Opcode::GiveOsdName), 1);
    }

    #[test]
    fn test_outbound_and_unregistered_ignored() {
        let mut registry = ready_registry(RegistryConfig::default());
        let now = Instant::now();
        assert!(registry.handle_event(&event("<< 10:47:43:45:43"), now).is_empty());
        assert!(registry.handle_event(&event(">> f0:84:30:00:04"), now).is_empty());
        assert_eq!(registry.pending_devices().count(), 0);
    }

    #[test]
    fn test_name_change_creates_new_identity() {
        let mut registry = ready_registry(RegistryConfig::default());
        let now = Instant::now();
        registry.handle_event(&event(">> 40:47:4b:6f:64:69"), now);
        assert!(registry.device("Kodi").unwrap().active);

        let actions = registry.handle_event(&event(">> 40:47:53:68:69:65:6c:64"), now);

        assert!(actions.contains(&RegistryAction::SetActive {
            device: "Kodi".to_string(),
            active: false,
            logical: LogicalAddress::PLAYBACK_1,
        }));
        assert_eq!(registrations(&actions), vec!["Shield"]);
        assert!(!registry.device("Kodi").unwrap().active);
        assert_eq!(registry.device_at(LogicalAddress::PLAYBACK_1).unwrap().name, "Shield");
        assert_eq!(active_count_at(&registry, LogicalAddress::PLAYBACK_1), 1);
    }

    #[test]
    fn test_seeded_device_reattaches_without_registering() {
        let mut registry = ready_registry(RegistryConfig::default());
        registry.seed(
            KnownDevice::new("Kodi").with_attribute(Attribute::Vendor, "PULSE_EIGHT"),
        );
        assert!(!registry.device("Kodi").unwrap().active);

        let actions = registry.handle_event(&event(">> 40:47:4b:6f:64:69"), Instant::now());

        assert!(registrations(&actions).is_empty());
        assert!(actions.contains(&RegistryAction::SetAttribute {
            device: "Kodi".to_string(),
            attribute: Attribute::Vendor,
            value: AttributeValue::Text("PULSE_EIGHT".to_string()),
            fresh: true,
        }));
        assert!(registry.device("Kodi").unwrap().active);
    }

    #[test]
    fn test_device_moving_logical_address() {
        let mut registry = ready_registry(RegistryConfig::default());
        let now = Instant::now();
        registry.handle_event(&event(">> 40:47:4b:6f:64:69"), now);
        registry.handle_event(&event(">> 80:47:4b:6f:64:69"), now);

        assert!(registry.device_at(LogicalAddress::PLAYBACK_1).is_none());
        assert_eq!(
            registry.device_at(LogicalAddress::new(8).unwrap()).unwrap().name,
            "Kodi"
        );
        assert_eq!(registry.devices().count(), 1);
    }

    #[test]
    fn test_physical_address_conflict_is_reverified() {
        let mut registry = ready_registry(RegistryConfig::default());
        let now = Instant::now();
        registry.handle_event(&event(">> 40:47:4b:6f:64:69"), now);
        registry.handle_event(&event(">> 4f:84:21:00:04"), now);
        assert_eq!(
            registry.device("Kodi").unwrap().physical_address,
            Some(PhysicalAddress(0x2100))
        );

        // First disagreement: deactivate and ask who this is
        let actions = registry.handle_event(&event(">> 4f:84:30:00:04"), now);
        assert!(actions.contains(&RegistryAction::SetActive {
            device: "Kodi".to_string(),
            active: false,
            logical: LogicalAddress::PLAYBACK_1,
        }));
        assert_eq!(queries(&actions, Opcode::GiveOsdName), 1);
        assert!(registry.device_at(LogicalAddress::PLAYBACK_1).is_none());

        // Same name comes back: reattach with the new address
        let actions = registry.handle_event(&event(">> 40:47:4b:6f:64:69"), now);
        assert!(registrations(&actions).is_empty());
        let kodi = registry.device("Kodi").unwrap();
        assert!(kodi.active);
        assert!(!kodi.reverify_address);
        assert_eq!(kodi.physical_address, Some(PhysicalAddress(0x3000)));

        // A later disagreement is checked again
        let actions = registry.handle_event(&event(">> 4f:84:21:00:04"), now);
        assert!(actions.contains(&RegistryAction::SetActive {
            device: "Kodi".to_string(),
            active: false,
            logical: LogicalAddress::PLAYBACK_1,
        }));
        assert_eq!(queries(&actions, Opcode::GiveOsdName), 1);
        assert!(registry.device("Kodi").unwrap().reverify_address);
    }

    #[test]
    fn test_attribute_updates_only_while_active() {
        let mut registry = ready_registry(RegistryConfig::default());
        let now = Instant::now();
        registry.handle_event(&event(">> 0f:36"), now);

        let actions = registry.handle_event(&event(">> 01:90:01"), now);
        assert!(actions.contains(&RegistryAction::SetAttribute {
            device: "TV".to_string(),
            attribute: Attribute::PowerState,
            value: AttributeValue::Bool(false),
            fresh: true,
        }));
        assert_eq!(
            registry.device("TV").unwrap().attributes.get(&Attribute::PowerState),
            Some(&AttributeValue::Bool(false))
        );

        // Unmapped events only refresh last seen
        assert!(registry.handle_event(&event(">> 01:46"), now).is_empty());
    }

    #[test]
    fn test_pending_attributes_replayed_on_resolution() {
        let mut registry = ready_registry(RegistryConfig::default());
        let now = Instant::now();
        registry.handle_event(&event(">> 4f:87:00:80:45"), now);
        let actions = registry.handle_event(&event(">> 40:47:4b:6f:64:69"), now);

        assert!(actions.contains(&RegistryAction::SetAttribute {
            device: "Kodi".to_string(),
            attribute: Attribute::Vendor,
            value: AttributeValue::Text("PANASONIC".to_string()),
            fresh: true,
        }));
    }
}
