//! In-memory device store backing the registry

use cecd_core::LogicalAddress;
use cecd_discovery::{Attribute, AttributeValue, DeviceHost, KnownDevice};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, trace};

/// Host-side view of one device
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoredDevice {
    pub name: String,
    pub active: bool,
    pub logical_address: Option<LogicalAddress>,
    pub attributes: BTreeMap<Attribute, AttributeValue>,
}

/// Devices as reported to the host, seeded from configuration
pub struct DeviceStore {
    known: Vec<KnownDevice>,
    devices: RwLock<BTreeMap<String, StoredDevice>>,
}

impl DeviceStore {
    pub fn new(known: Vec<KnownDevice>) -> Self {
        Self {
            known,
            devices: RwLock::new(BTreeMap::new()),
        }
    }

    /// Devices registered since startup
    pub fn registered_count(&self) -> usize {
        self.read().len()
    }

    /// Device currently holding a logical address
    #[cfg(test)]
    pub fn active_at(&self, logical: LogicalAddress) -> Option<StoredDevice> {
        self.read()
            .values()
            .find(|d| d.active && d.logical_address == Some(logical))
            .cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredDevice>> {
        self.devices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredDevice>> {
        self.devices.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceHost for DeviceStore {
    fn register_device(&self, name: &str) {
        let mut devices = self.write();
        if !devices.contains_key(name) {
            info!(device = %name, "Device registered");
            devices.insert(
                name.to_string(),
                StoredDevice {
                    name: name.to_string(),
                    ..Default::default()
                },
            );
        }
    }

    fn set_device_attribute(
        &self,
        device: &str,
        attribute: Attribute,
        value: AttributeValue,
        fresh: bool,
    ) {
        let mut devices = self.write();
        let entry = devices
            .entry(device.to_string())
            .or_insert_with(|| StoredDevice {
                name: device.to_string(),
                ..Default::default()
            });

        if fresh {
            debug!(device = %device, attribute = %attribute, value = %value, "Attribute observed");
        } else {
            trace!(device = %device, attribute = %attribute, value = %value, "Attribute restored");
        }
        entry.attributes.insert(attribute, value);
    }

    fn set_device_active(&self, device: &str, active: bool, logical: LogicalAddress) {
        let mut devices = self.write();
        // Seeded devices reattach without a registration
        let entry = devices
            .entry(device.to_string())
            .or_insert_with(|| StoredDevice {
                name: device.to_string(),
                ..Default::default()
            });
        info!(device = %device, logical = %logical, active, "Device activity changed");
        entry.active = active;
        entry.logical_address = Some(logical);
    }

    fn known_devices(&self) -> Vec<KnownDevice> {
        self.known.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cecd_core::PhysicalAddress;

    fn stored(store: &DeviceStore, name: &str) -> Option<StoredDevice> {
        store.read().get(name).cloned()
    }

    #[test]
    fn test_register_is_idempotent() {
        let store = DeviceStore::new(Vec::new());
        store.register_device("Kodi");
        store.set_device_attribute("Kodi", Attribute::Volume, 20u32.into(), true);
        store.register_device("Kodi");

        assert_eq!(store.registered_count(), 1);
        assert_eq!(
            stored(&store, "Kodi").unwrap().attributes[&Attribute::Volume],
            AttributeValue::Number(20)
        );
    }

    #[test]
    fn test_attribute_for_unregistered_device_creates_it() {
        let store = DeviceStore::new(Vec::new());
        store.set_device_attribute("TV", Attribute::PowerState, true.into(), true);
        store.set_device_attribute("TV", Attribute::PowerState, false.into(), false);

        let tv = stored(&store, "TV").unwrap();
        assert_eq!(tv.attributes[&Attribute::PowerState], AttributeValue::Bool(false));
        assert!(!tv.active);
    }

    #[test]
    fn test_active_at() {
        let store = DeviceStore::new(Vec::new());
        store.register_device("Kodi");
        store.register_device("Old_Kodi");
        store.set_device_active("Old_Kodi", false, LogicalAddress::PLAYBACK_1);
        store.set_device_active("Kodi", true, LogicalAddress::PLAYBACK_1);

        assert_eq!(store.active_at(LogicalAddress::PLAYBACK_1).unwrap().name, "Kodi");
        assert!(store.active_at(LogicalAddress::TV).is_none());

    }

    #[test]
    fn test_activity_for_unregistered_device_creates_it() {
        let store = DeviceStore::new(vec![KnownDevice::new("AVR")]);
        store.set_device_active("AVR", true, LogicalAddress::AUDIO_SYSTEM);
        store.set_device_attribute("AVR", Attribute::Volume, 40u32.into(), false);

        let avr = store.active_at(LogicalAddress::AUDIO_SYSTEM).unwrap();
        assert_eq!(avr.name, "AVR");
        assert_eq!(avr.attributes[&Attribute::Volume], AttributeValue::Number(40));
        assert_eq!(store.registered_count(), 1);
    }

    #[test]
    fn test_known_devices_are_handed_back() {
        let known = vec![KnownDevice::new("TV").with_physical_address(PhysicalAddress::ROOT)];
        let store = DeviceStore::new(known.clone());

        assert_eq!(store.known_devices(), known);
        assert_eq!(store.registered_count(), 0);
    }
}
