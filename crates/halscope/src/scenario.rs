//! Scripted daemon sessions
//!
//! A scenario seeds an in-memory daemon with devices and lists the mutations
//! to perform on it, in order:
//!
//! ```toml
//! [[device]]
//! udi = "/org/freedesktop/Hal/devices/computer"
//! properties = { "info.bus" = "unknown", "info.product" = "Computer" }
//!
//! [[step]]
//! action = "set"
//! udi = "/org/freedesktop/Hal/devices/computer"
//! key = "info.vendor"
//! value = "Acme"
//! ```

use halscope_core::{DeviceId, HalError, HalSignal, MemoryDaemon, PropertyMap, PropertyValue};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read scenario: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Step {step} failed: {source}")]
    Step { step: usize, source: HalError },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSpec {
    pub udi: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// A single daemon mutation
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Step {
    Add {
        udi: String,
        #[serde(default)]
        properties: PropertyMap,
    },
    Remove {
        udi: String,
    },
    Set {
        udi: String,
        key: String,
        value: PropertyValue,
    },
    Unset {
        udi: String,
        key: String,
    },
    Capability {
        udi: String,
        capability: String,
    },
}

impl Step {
    /// Perform the mutation and return the signal the daemon emitted
    pub async fn perform(&self, daemon: &MemoryDaemon) -> Result<HalSignal, HalError> {
        match self {
            Self::Add { udi, properties } => Ok(daemon.add_device(DeviceId::new(udi.as_str()), properties.clone()).await),
            Self::Remove { udi } => Ok(daemon.remove_device(&DeviceId::new(udi.as_str())).await),
            Self::Set { udi, key, value } => {
                daemon
                    .set_property(&DeviceId::new(udi.as_str()), key, value.clone())
                    .await
            }
            Self::Unset { udi, key } => daemon.remove_property(&DeviceId::new(udi.as_str()), key).await,
            Self::Capability { udi, capability } => {
                Ok(daemon.add_capability(&DeviceId::new(udi.as_str()), capability).await)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Add { udi, .. } => format!("add {}", udi),
            Self::Remove { udi } => format!("remove {}", udi),
            Self::Set { udi, key, value } => format!("set {} {}={}", udi, key, value),
            Self::Unset { udi, key } => format!("unset {} {}", udi, key),
            Self::Capability { udi, capability } => format!("capability {} {}", udi, capability),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceSpec>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ScenarioError> {
        Ok(toml::from_str(content)?)
    }

    /// An in-memory daemon holding the scenario's initial devices
    pub fn daemon(&self) -> MemoryDaemon {
        MemoryDaemon::with_devices(
            self.devices
                .iter()
                .map(|d| (DeviceId::new(d.udi.as_str()), d.properties.clone())),
        )
    }
}
