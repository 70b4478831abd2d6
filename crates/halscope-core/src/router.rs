//! Routes daemon signals to the synchronizer and manages per-device
//! subscriptions
//!
//! Signals are handled one at a time in arrival order. After every structural
//! change the set of subscribed devices is reconciled against the new tree so
//! that it always matches the devices the tree holds.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::daemon::SignalSubscriber;
use crate::node::DeviceId;
use crate::signal::HalSignal;
use crate::sync::{SyncOutcome, Synchronizer};

/// Tracks which devices have an open property-change subscription
///
/// Subscribing an already subscribed device and unsubscribing one without a
/// subscription are no-ops; only real transitions reach the bus.
pub struct SubscriptionSet {
    bus: Arc<dyn SignalSubscriber>,
    active: BTreeSet<DeviceId>,
}

impl SubscriptionSet {
    pub fn new(bus: Arc<dyn SignalSubscriber>) -> Self {
        Self {
            bus,
            active: BTreeSet::new(),
        }
    }

    pub fn contains(&self, udi: &DeviceId) -> bool {
        self.active.contains(udi)
    }

    pub fn active(&self) -> &BTreeSet<DeviceId> {
        &self.active
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Returns true if a new subscription was opened
    pub async fn subscribe(&mut self, udi: &DeviceId) -> bool {
        if self.active.contains(udi) {
            return false;
        }
        match self.bus.subscribe_device(udi).await {
            Ok(()) => {
                self.active.insert(udi.clone());
                true
            }
            Err(e) => {
                warn!(udi = %udi, error = %e, "Failed to subscribe to device signals");
                false
            }
        }
    }

    /// Returns true if an open subscription was closed
    pub async fn unsubscribe(&mut self, udi: &DeviceId) -> bool {
        if !self.active.remove(udi) {
            return false;
        }
        if let Err(e) = self.bus.unsubscribe_device(udi).await {
            warn!(udi = %udi, error = %e, "Failed to unsubscribe from device signals");
        }
        true
    }

    /// Bring the subscribed set in line with `wanted`
    pub async fn reconcile<'a, I>(&mut self, wanted: I)
    where
        I: IntoIterator<Item = &'a DeviceId>,
    {
        let wanted: BTreeSet<DeviceId> = wanted.into_iter().cloned().collect();
        let stale: Vec<DeviceId> = self.active.difference(&wanted).cloned().collect();
        for udi in &stale {
            self.unsubscribe(udi).await;
        }
        for udi in &wanted {
            self.subscribe(udi).await;
        }
    }

    /// Close every open subscription
    pub async fn clear(&mut self) {
        let all: Vec<DeviceId> = self.active.iter().cloned().collect();
        for udi in &all {
            self.unsubscribe(udi).await;
        }
    }
}

/// Single consumer of daemon signals
pub struct EventRouter {
    sync: Arc<Synchronizer>,
    subscriptions: Mutex<SubscriptionSet>,
}

impl EventRouter {
    pub fn new(sync: Arc<Synchronizer>, bus: Arc<dyn SignalSubscriber>) -> Self {
        Self {
            sync,
            subscriptions: Mutex::new(SubscriptionSet::new(bus)),
        }
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.sync
    }

    /// Subscribe to every device in the current tree
    ///
    /// Call once after bootstrap, before the first signal is routed.
    pub async fn start(&self) {
        let tree = self.sync.current_tree().await;
        let mut subs = self.subscriptions.lock().await;
        subs.reconcile(tree.device_ids()).await;
        info!(devices = subs.len(), "Subscribed to device signals");
    }

    /// UDIs with an open subscription
    pub async fn subscribed(&self) -> BTreeSet<DeviceId> {
        self.subscriptions.lock().await.active().clone()
    }

    /// Handle one signal
    pub async fn dispatch(&self, signal: HalSignal) -> SyncOutcome {
        let mut subs = self.subscriptions.lock().await;
        match &signal {
            HalSignal::DeviceAdded(udi) => {
                subs.subscribe(udi).await;
            }
            HalSignal::DeviceRemoved(udi) => {
                subs.unsubscribe(udi).await;
            }
            _ => {}
        }

        let outcome = self.sync.apply(&signal).await;
        if signal.is_structural() || outcome == SyncOutcome::Rebuilt {
            let tree = self.sync.current_tree().await;
            subs.reconcile(tree.device_ids()).await;
        }
        debug!(udi = %signal.udi(), outcome = ?outcome, "Signal applied");
        outcome
    }

    /// Route signals until the channel closes, then close all subscriptions
    pub async fn run(&self, mut signals: mpsc::Receiver<HalSignal>) {
        info!("Event router started");
        while let Some(signal) = signals.recv().await {
            self.dispatch(signal).await;
        }
        self.shutdown().await;
    }

    /// Close every per-device subscription
    pub async fn shutdown(&self) {
        let mut subs = self.subscriptions.lock().await;
        let count = subs.len();
        subs.clear().await;
        info!(closed = count, "Event router stopped");
    }
}
