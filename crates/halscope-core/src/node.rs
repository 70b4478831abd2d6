//! Device nodes held in the device tree

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::property::{BusClass, PropertyMap, PropertyValue};

/// Unique device identifier (UDI) as published on the bus
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(udi: impl Into<String>) -> Self {
        Self(udi.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path component of the UDI, used as a fallback label
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').find(|s| !s.is_empty()).unwrap_or(&self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(udi: &str) -> Self {
        Self(udi.to_string())
    }
}

/// Position of a node inside its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub(crate) usize);

impl NodeIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

/// A single device in the tree
///
/// Structural links are arena indices: the parent link is a plain index back
/// into the owning tree, children are owned by the tree and listed here in
/// insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceNode {
    id: DeviceId,
    /// Parent UDI as declared by the device, before resolution
    declared_parent: Option<DeviceId>,
    properties: PropertyMap,
    pub(crate) parent: Option<NodeIndex>,
    pub(crate) children: Vec<NodeIndex>,
}

impl DeviceNode {
    pub fn new(id: DeviceId, declared_parent: Option<DeviceId>, properties: PropertyMap) -> Self {
        Self {
            id,
            declared_parent,
            properties,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn declared_parent(&self) -> Option<&DeviceId> {
        self.declared_parent.as_ref()
    }

    /// Resolved structural parent; `None` only for the root
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Set a property, returning the previous value
    pub fn set_property(&mut self, key: impl Into<String>, value: PropertyValue) -> Option<PropertyValue> {
        self.properties.insert(key.into(), value)
    }

    /// Remove a property; removing an absent key is a no-op
    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    /// Bus category under the given bus key, if the device declares one
    pub fn bus_class(&self, bus_key: &str) -> Option<BusClass> {
        self.property(bus_key)
            .and_then(PropertyValue::as_str)
            .map(BusClass::from_tag)
    }

    /// Display label: the product name if known, otherwise the UDI's last component
    pub fn label(&self) -> &str {
        self.property("info.product")
            .and_then(PropertyValue::as_str)
            .unwrap_or_else(|| self.id.short_name())
    }
}
