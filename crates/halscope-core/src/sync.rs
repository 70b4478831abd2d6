//! Applies daemon signals to the current device tree
//!
//! The synchronizer owns the only mutable reference to the tree. Structural
//! signals rebuild the tree from a fresh enumeration and swap it in with a
//! single write; property signals re-fetch the touched keys and patch the
//! device's property map. Readers take an `Arc` snapshot and never observe a
//! half-built tree. A patch made while a snapshot is held copies the arena's
//! node pointers and the one patched node, nothing else.

use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::builder::TreeBuilder;
use crate::config::EngineConfig;
use crate::daemon::DeviceDaemon;
use crate::error::HalError;
use crate::node::{DeviceId, DeviceNode};
use crate::property::PropertyValue;
use crate::signal::{HalSignal, PropertyModification};
use crate::tree::DeviceTree;

/// Broadcast after every rebuild or property patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeChanged;

/// What applying a signal did to the tree
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The tree was rebuilt and swapped in
    Rebuilt,
    /// Properties of one device were patched in place
    Patched { udi: DeviceId, updated: usize, removed: usize },
    /// Nothing to change
    Unchanged,
    /// A rebuild failed; the previous tree stays current
    RebuildFailed(HalError),
}

type TreeListener = Arc<dyn Fn() + Send + Sync>;

pub struct Synchronizer {
    daemon: Arc<dyn DeviceDaemon>,
    builder: TreeBuilder,
    tree: RwLock<Arc<DeviceTree>>,
    changes: broadcast::Sender<TreeChanged>,
    listeners: StdRwLock<Vec<TreeListener>>,
}

impl Synchronizer {
    /// Build the initial tree; fails if the daemon cannot be enumerated
    pub async fn bootstrap(daemon: Arc<dyn DeviceDaemon>, config: EngineConfig) -> Result<Self, HalError> {
        let builder = TreeBuilder::new(daemon.clone(), config);
        let tree = builder.build().await?;
        let (changes, _) = broadcast::channel(16);

        Ok(Self {
            daemon,
            builder,
            tree: RwLock::new(Arc::new(tree)),
            changes,
            listeners: StdRwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        self.builder.config()
    }

    /// The latest tree snapshot
    pub async fn current_tree(&self) -> Arc<DeviceTree> {
        self.tree.read().await.clone()
    }

    /// Snapshot of one device; `None` if it is not in the current tree
    pub async fn resolve(&self, udi: &DeviceId) -> Option<DeviceNode> {
        self.tree.read().await.resolve(udi).cloned()
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TreeChanged> {
        self.changes.subscribe()
    }

    /// Register a callback fired after every rebuild or patch
    pub fn on_tree_changed<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Apply one signal. Failures are logged and contained.
    pub async fn apply(&self, signal: &HalSignal) -> SyncOutcome {
        match signal {
            HalSignal::DeviceAdded(udi) => {
                debug!(udi = %udi, "Device added");
                self.rebuild_contained().await
            }
            HalSignal::DeviceRemoved(udi) => {
                debug!(udi = %udi, "Device removed");
                self.rebuild_contained().await
            }
            HalSignal::NewCapability { udi, capability } => {
                info!(udi = %udi, capability = %capability, "New capability");
                SyncOutcome::Unchanged
            }
            HalSignal::Condition { udi, name, args } => {
                debug!(udi = %udi, condition = %name, args = ?args, "Device condition");
                SyncOutcome::Unchanged
            }
            HalSignal::PropertyModified { udi, modifications } => {
                self.patch_properties(udi, modifications).await
            }
        }
    }

    /// Re-enumerate the daemon and replace the tree
    pub async fn rebuild(&self) -> Result<(), HalError> {
        let fresh = self.builder.build().await?;
        *self.tree.write().await = Arc::new(fresh);
        self.notify();
        Ok(())
    }

    async fn rebuild_contained(&self) -> SyncOutcome {
        match self.rebuild().await {
            Ok(()) => SyncOutcome::Rebuilt,
            Err(e) => {
                warn!(error = %e, "Tree rebuild failed, keeping previous tree");
                SyncOutcome::RebuildFailed(e)
            }
        }
    }

    /// Re-fetch each modified key and patch the device's properties
    ///
    /// A change to the parent-link key reshapes the tree and is handled as a
    /// rebuild. The removed/added flags are only logged: whether a key exists
    /// is always asked of the daemon.
    async fn patch_properties(&self, udi: &DeviceId, modifications: &[PropertyModification]) -> SyncOutcome {
        let parent_key = &self.config().parent_key;
        if modifications.iter().any(|m| &m.key == parent_key) {
            debug!(udi = %udi, "Parent link changed");
            return self.rebuild_contained().await;
        }

        if !self.tree.read().await.contains(udi) {
            debug!(udi = %udi, "Property change for device not in tree");
            return SyncOutcome::Unchanged;
        }

        // Fetch everything before touching the tree
        let mut updates: Vec<(&str, Option<PropertyValue>)> = Vec::with_capacity(modifications.len());
        for m in modifications {
            debug!(udi = %udi, key = %m.key, removed = m.removed, added = m.added, "Property modified");
            match self.daemon.property_exists(udi, &m.key).await {
                Ok(true) => match self.daemon.get_property(udi, &m.key).await {
                    Ok(value) => updates.push((m.key.as_str(), Some(value))),
                    Err(e) => debug!(udi = %udi, key = %m.key, error = %e, "Skipping stale property"),
                },
                Ok(false) => updates.push((m.key.as_str(), None)),
                Err(e) => debug!(udi = %udi, key = %m.key, error = %e, "Skipping stale property"),
            }
        }

        if updates.is_empty() {
            return SyncOutcome::Unchanged;
        }

        let (updated, removed) = {
            let mut guard = self.tree.write().await;
            let tree = Arc::make_mut(&mut *guard);
            let Some(node) = tree.resolve_mut(udi) else {
                // Rebuilt without this device while we were fetching
                return SyncOutcome::Unchanged;
            };
            let mut updated = 0;
            let mut removed = 0;
            for (key, value) in updates {
                match value {
                    Some(value) => {
                        node.set_property(key, value);
                        updated += 1;
                    }
                    None => {
                        if node.remove_property(key).is_some() {
                            removed += 1;
                        }
                    }
                }
            }
            (updated, removed)
        };

        self.notify();
        SyncOutcome::Patched {
            udi: udi.clone(),
            updated,
            removed,
        }
    }

    fn notify(&self) {
        // No receivers is fine
        let _ = self.changes.send(TreeChanged);

        let listeners: Vec<TreeListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener();
        }
    }
}
