//! cecd Discovery - device identities on the CEC bus
//!
//! Resolves logical addresses into named devices by querying OSD names and
//! physical addresses, with bounded retries, and reports them to a host.

pub mod attribute;
pub mod host;
pub mod registry;
pub mod retry;
pub mod service;

pub use attribute::{clean_name, Attribute, AttributeError, AttributeValue};
pub use host::{DeviceHost, KnownDevice};
pub use registry::{
    DeviceRecord, DeviceRegistry, DiscoveryState, PendingDevice, RegistryAction, RegistryConfig,
};
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use service::{DiscoveryConfig, DiscoveryEvent, DiscoveryService};
