//! Engine configuration

use serde::{Deserialize, Serialize};

/// Settings for the synchronization engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Property key naming a device's structural parent
    #[serde(default = "default_parent_key")]
    pub parent_key: String,
    /// Property key carrying the device's bus category tag
    #[serde(default = "default_bus_key")]
    pub bus_key: String,
    /// Identifier reserved for the synthetic root node
    #[serde(default = "default_root_udi")]
    pub root_udi: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parent_key: default_parent_key(),
            bus_key: default_bus_key(),
            root_udi: default_root_udi(),
        }
    }
}

fn default_parent_key() -> String {
    "info.parent".to_string()
}

fn default_bus_key() -> String {
    "info.bus".to_string()
}

fn default_root_udi() -> String {
    "virtual_root".to_string()
}
