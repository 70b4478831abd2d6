//! In-process device daemon
//!
//! Holds a device list in memory and implements both boundary traits. Each
//! mutation returns the signal the real daemon would broadcast for it and, if
//! a signal channel is attached, delivers it there as well. Property signals
//! are only delivered for devices that currently have a subscription, the way
//! a bus only routes matched signals.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

use crate::daemon::{DeviceDaemon, SignalSubscriber};
use crate::error::HalError;
use crate::node::DeviceId;
use crate::property::{PropertyMap, PropertyValue};
use crate::signal::{HalSignal, PropertyModification};

#[derive(Default)]
pub struct MemoryDaemon {
    devices: RwLock<BTreeMap<DeviceId, PropertyMap>>,
    unavailable: RwLock<HashSet<DeviceId>>,
    duplicates: RwLock<Vec<DeviceId>>,
    fail_enumeration: AtomicBool,
    fail_subscriptions: AtomicBool,
    enumerations: AtomicUsize,
    subscriptions: Mutex<BTreeSet<DeviceId>>,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    signals: Mutex<Option<mpsc::Sender<HalSignal>>>,
}

impl MemoryDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a daemon pre-populated with devices
    pub fn with_devices<I>(devices: I) -> Self
    where
        I: IntoIterator<Item = (DeviceId, PropertyMap)>,
    {
        Self {
            devices: RwLock::new(devices.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Deliver future signals to `tx`
    pub async fn attach(&self, tx: mpsc::Sender<HalSignal>) {
        *self.signals.lock().await = Some(tx);
    }

    /// Drop the signal channel, closing it once all other senders are gone
    pub async fn detach(&self) {
        self.signals.lock().await.take();
    }

    /// Insert a device without broadcasting anything
    pub async fn insert_device(&self, udi: DeviceId, properties: PropertyMap) {
        self.devices.write().await.insert(udi, properties);
    }

    pub async fn add_device(&self, udi: DeviceId, properties: PropertyMap) -> HalSignal {
        self.devices.write().await.insert(udi.clone(), properties);
        self.emit(HalSignal::DeviceAdded(udi)).await
    }

    pub async fn remove_device(&self, udi: &DeviceId) -> HalSignal {
        self.devices.write().await.remove(udi);
        self.emit(HalSignal::DeviceRemoved(udi.clone())).await
    }

    /// Set a property; fails if the device does not exist
    pub async fn set_property(
        &self,
        udi: &DeviceId,
        key: &str,
        value: PropertyValue,
    ) -> Result<HalSignal, HalError> {
        let added = {
            let mut devices = self.devices.write().await;
            let props = devices
                .get_mut(udi)
                .ok_or_else(|| HalError::unavailable(udi, "no such device"))?;
            props.insert(key.to_string(), value).is_none()
        };
        Ok(self
            .emit(HalSignal::PropertyModified {
                udi: udi.clone(),
                modifications: vec![PropertyModification::new(key, false, added)],
            })
            .await)
    }

    /// Remove a property; fails if the device does not exist
    pub async fn remove_property(&self, udi: &DeviceId, key: &str) -> Result<HalSignal, HalError> {
        {
            let mut devices = self.devices.write().await;
            let props = devices
                .get_mut(udi)
                .ok_or_else(|| HalError::unavailable(udi, "no such device"))?;
            props.remove(key);
        }
        Ok(self
            .emit(HalSignal::PropertyModified {
                udi: udi.clone(),
                modifications: vec![PropertyModification::new(key, true, false)],
            })
            .await)
    }

    pub async fn add_capability(&self, udi: &DeviceId, capability: &str) -> HalSignal {
        self.emit(HalSignal::NewCapability {
            udi: udi.clone(),
            capability: capability.to_string(),
        })
        .await
    }

    /// Make every per-device call for `udi` fail as if it vanished
    pub async fn set_unavailable(&self, udi: &DeviceId, unavailable: bool) {
        let mut set = self.unavailable.write().await;
        if unavailable {
            set.insert(udi.clone());
        } else {
            set.remove(udi);
        }
    }

    /// Make `enumerate_devices` fail
    pub fn set_enumeration_failure(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    /// Make `subscribe_device` fail
    pub fn set_subscription_failure(&self, fail: bool) {
        self.fail_subscriptions.store(fail, Ordering::SeqCst);
    }

    /// Report `udi` a second time on every enumeration
    pub async fn inject_duplicate(&self, udi: DeviceId) {
        self.duplicates.write().await.push(udi);
    }

    pub fn enumeration_count(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub async fn subscribed(&self) -> BTreeSet<DeviceId> {
        self.subscriptions.lock().await.clone()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    async fn emit(&self, signal: HalSignal) -> HalSignal {
        let deliver = match &signal {
            HalSignal::PropertyModified { udi, .. } | HalSignal::Condition { udi, .. } => {
                self.subscriptions.lock().await.contains(udi)
            }
            _ => true,
        };
        if deliver {
            if let Some(tx) = self.signals.lock().await.as_ref() {
                if tx.send(signal.clone()).await.is_err() {
                    debug!(udi = %signal.udi(), "Signal receiver closed");
                }
            }
        }
        signal
    }

    async fn check_available(&self, udi: &DeviceId) -> Result<(), HalError> {
        if self.unavailable.read().await.contains(udi) {
            return Err(HalError::unavailable(udi, "device object gone"));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceDaemon for MemoryDaemon {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceId>, HalError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(HalError::Enumeration("daemon not running".to_string()));
        }
        let mut ids: Vec<DeviceId> = self.devices.read().await.keys().cloned().collect();
        ids.extend(self.duplicates.read().await.iter().cloned());
        Ok(ids)
    }

    async fn get_all_properties(&self, udi: &DeviceId) -> Result<PropertyMap, HalError> {
        self.check_available(udi).await?;
        self.devices
            .read()
            .await
            .get(udi)
            .cloned()
            .ok_or_else(|| HalError::unavailable(udi, "no such device"))
    }

    async fn property_exists(&self, udi: &DeviceId, key: &str) -> Result<bool, HalError> {
        self.check_available(udi).await?;
        let devices = self.devices.read().await;
        let props = devices
            .get(udi)
            .ok_or_else(|| HalError::unavailable(udi, "no such device"))?;
        Ok(props.contains_key(key))
    }

    async fn get_property(&self, udi: &DeviceId, key: &str) -> Result<PropertyValue, HalError> {
        self.check_available(udi).await?;
        let devices = self.devices.read().await;
        devices
            .get(udi)
            .and_then(|props| props.get(key))
            .cloned()
            .ok_or_else(|| HalError::unavailable(udi, format!("no property {}", key)))
    }
}

#[async_trait]
impl SignalSubscriber for MemoryDaemon {
    async fn subscribe_device(&self, udi: &DeviceId) -> Result<(), HalError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(HalError::Subscription {
                udi: udi.clone(),
                reason: "match rule rejected".to_string(),
            });
        }
        self.subscriptions.lock().await.insert(udi.clone());
        Ok(())
    }

    async fn unsubscribe_device(&self, udi: &DeviceId) -> Result<(), HalError> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().await.remove(udi);
        Ok(())
    }
}
