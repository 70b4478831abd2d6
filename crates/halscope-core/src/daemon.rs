//! Boundary traits towards the device daemon
//!
//! The bus transport lives outside this crate. An adapter implements these
//! traits on top of a connected manager handle; tests and the CLI replay mode
//! use [`crate::memory::MemoryDaemon`].

use async_trait::async_trait;

use crate::error::HalError;
use crate::node::DeviceId;
use crate::property::{PropertyMap, PropertyValue};

/// Read access to the daemon's global device list
#[async_trait]
pub trait DeviceDaemon: Send + Sync {
    /// All device UDIs currently known to the daemon
    async fn enumerate_devices(&self) -> Result<Vec<DeviceId>, HalError>;

    /// Full property set of one device
    async fn get_all_properties(&self, udi: &DeviceId) -> Result<PropertyMap, HalError>;

    /// Whether the device currently carries `key`
    async fn property_exists(&self, udi: &DeviceId, key: &str) -> Result<bool, HalError>;

    /// Current value of one property
    async fn get_property(&self, udi: &DeviceId, key: &str) -> Result<PropertyValue, HalError>;
}

/// Per-device signal subscriptions on the bus
#[async_trait]
pub trait SignalSubscriber: Send + Sync {
    /// Start receiving property-change signals for `udi`
    async fn subscribe_device(&self, udi: &DeviceId) -> Result<(), HalError>;

    /// Stop receiving property-change signals for `udi`
    async fn unsubscribe_device(&self, udi: &DeviceId) -> Result<(), HalError>;
}
