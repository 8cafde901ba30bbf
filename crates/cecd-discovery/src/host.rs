//! Host platform collaborator

use cecd_core::{LogicalAddress, PhysicalAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::attribute::{Attribute, AttributeValue};

/// Receives identity and attribute updates from the registry
pub trait DeviceHost: Send + Sync {
    /// A new identity was resolved
    fn register_device(&self, name: &str);

    /// `fresh` is false when a value is replayed rather than observed on the bus
    fn set_device_attribute(
        &self,
        device: &str,
        attribute: Attribute,
        value: AttributeValue,
        fresh: bool,
    );

    fn set_device_active(&self, device: &str, active: bool, logical: LogicalAddress);

    /// Devices remembered from earlier runs, used to seed the registry
    fn known_devices(&self) -> Vec<KnownDevice> {
        Vec::new()
    }
}

/// A previously known device and its last attribute values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnownDevice {
    pub name: String,
    #[serde(default)]
    pub physical_address: Option<PhysicalAddress>,
    #[serde(default)]
    pub attributes: BTreeMap<Attribute, AttributeValue>,
}

impl KnownDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_physical_address(mut self, address: PhysicalAddress) -> Self {
        self.physical_address = Some(address);
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(attribute, value.into());
        self
    }
}
