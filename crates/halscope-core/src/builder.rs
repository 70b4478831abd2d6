//! One-shot construction of the device tree from the daemon

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::daemon::DeviceDaemon;
use crate::error::HalError;
use crate::tree::{DeviceRecord, DeviceTree};

/// Enumerates the daemon and links the result into a fresh tree
#[derive(Clone)]
pub struct TreeBuilder {
    daemon: Arc<dyn DeviceDaemon>,
    config: EngineConfig,
}

impl TreeBuilder {
    pub fn new(daemon: Arc<dyn DeviceDaemon>, config: EngineConfig) -> Self {
        Self { daemon, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build a complete tree
    ///
    /// Fails if enumeration fails or the daemon reports an identifier twice.
    /// A device that disappears between enumeration and its property fetch is
    /// left out; its removal signal follows.
    pub async fn build(&self) -> Result<DeviceTree, HalError> {
        let mut ids = self.daemon.enumerate_devices().await?;
        ids.sort();

        if let Some(dup) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(HalError::DuplicateIdentifier(dup[1].clone()));
        }

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.daemon.get_all_properties(&id).await {
                Ok(properties) => records.push(DeviceRecord::new(id, properties)),
                Err(e) => {
                    warn!(udi = %id, error = %e, "Skipping device that vanished during enumeration");
                }
            }
        }

        let tree = DeviceTree::from_records(records, &self.config)?;
        debug_assert!(tree.is_consistent());

        info!(
            devices = tree.device_count(),
            top_level = tree.root().children().len(),
            "Built device tree"
        );
        debug!(root = %tree.root().id(), "Tree root");
        Ok(tree)
    }
}
