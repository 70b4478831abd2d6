//! End-to-end scenarios: daemon -> router -> synchronizer -> lookups

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use halscope_core::{
    DeviceDaemon, DeviceId, EngineConfig, EventRouter, HalError, HalSignal, MemoryDaemon, PropertyMap,
    PropertyModification, PropertyValue, SyncOutcome, Synchronizer,
};
use tokio::sync::mpsc;

fn props(parent: Option<&str>) -> PropertyMap {
    let mut map = PropertyMap::new();
    map.insert("info.bus".to_string(), "pci".into());
    if let Some(p) = parent {
        map.insert("info.parent".to_string(), p.into());
    }
    map
}

fn id(s: &str) -> DeviceId {
    DeviceId::from(s)
}

/// A (no parent), B (parent A), C (parent unknown)
async fn abc() -> (Arc<MemoryDaemon>, EventRouter) {
    let daemon = Arc::new(MemoryDaemon::with_devices([
        (id("A"), props(None)),
        (id("B"), props(Some("A"))),
        (id("C"), props(Some("nowhere"))),
    ]));
    let sync = Synchronizer::bootstrap(daemon.clone(), EngineConfig::default())
        .await
        .unwrap();
    let router = EventRouter::new(Arc::new(sync), daemon.clone());
    router.start().await;
    (daemon, router)
}

fn child_ids(tree: &halscope_core::DeviceTree, parent: &str) -> Vec<String> {
    tree.children(&id(parent))
        .into_iter()
        .map(|n| n.id().to_string())
        .collect()
}

#[tokio::test]
async fn bootstrap_builds_expected_shape() {
    let (daemon, router) = abc().await;
    let tree = router.synchronizer().current_tree().await;

    assert_eq!(child_ids(&tree, "virtual_root"), vec!["A", "C"]);
    assert_eq!(child_ids(&tree, "A"), vec!["B"]);
    assert!(tree.is_consistent());

    let expected: std::collections::BTreeSet<_> = [id("A"), id("B"), id("C")].into_iter().collect();
    assert_eq!(router.subscribed().await, expected);
    assert_eq!(daemon.subscribed().await, expected);
}

#[tokio::test]
async fn removing_a_device_rebuilds_and_unsubscribes() {
    let (daemon, router) = abc().await;

    let signal = daemon.remove_device(&id("B")).await;
    assert_eq!(router.dispatch(signal).await, SyncOutcome::Rebuilt);

    let sync = router.synchronizer();
    assert!(sync.resolve(&id("B")).await.is_none());
    let a = sync.resolve(&id("A")).await.unwrap();
    assert!(a.children().is_empty());
    assert_eq!(a.property("info.bus"), Some(&PropertyValue::from("pci")));
    assert!(!router.subscribed().await.contains(&id("B")));
    assert!(!daemon.subscribed().await.contains(&id("B")));
}

#[tokio::test]
async fn property_change_patches_without_rebuild() {
    let (daemon, router) = abc().await;
    let enumerations = daemon.enumeration_count();
    let before = router.synchronizer().resolve(&id("A")).await.unwrap();

    daemon.set_property(&id("A"), "vendor", "Acme".into()).await.unwrap();
    let outcome = router
        .dispatch(HalSignal::PropertyModified {
            udi: id("A"),
            modifications: vec![PropertyModification::new("vendor", false, true)],
        })
        .await;

    assert!(matches!(outcome, SyncOutcome::Patched { updated: 1, .. }));
    assert_eq!(daemon.enumeration_count(), enumerations);

    let after = router.synchronizer().resolve(&id("A")).await.unwrap();
    assert_eq!(after.property("vendor"), Some(&PropertyValue::from("Acme")));
    assert_eq!(after.children(), before.children());
}

#[tokio::test]
async fn parent_key_change_triggers_rebuild() {
    let (daemon, router) = abc().await;
    let enumerations = daemon.enumeration_count();

    let signal = daemon
        .set_property(&id("C"), "info.parent", "A".into())
        .await
        .unwrap();
    assert_eq!(router.dispatch(signal).await, SyncOutcome::Rebuilt);
    assert_eq!(daemon.enumeration_count(), enumerations + 1);

    let tree = router.synchronizer().current_tree().await;
    assert_eq!(child_ids(&tree, "A"), vec!["B", "C"]);
    assert_eq!(child_ids(&tree, "virtual_root"), vec!["A"]);
}

#[tokio::test]
async fn repeated_property_signal_is_idempotent() {
    let (daemon, router) = abc().await;
    let signal = daemon.set_property(&id("B"), "usb.max_power", 500i64.into()).await.unwrap();

    router.dispatch(signal.clone()).await;
    let once = router.synchronizer().resolve(&id("B")).await.unwrap();
    router.dispatch(signal).await;
    let twice = router.synchronizer().resolve(&id("B")).await.unwrap();

    assert_eq!(once.properties(), twice.properties());
}

/// Delegates to a `MemoryDaemon` but can fail single-key fetches on demand
struct FlakyDaemon {
    inner: Arc<MemoryDaemon>,
    fail_exists: AtomicBool,
    fail_get: AtomicBool,
}

#[async_trait]
impl DeviceDaemon for FlakyDaemon {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceId>, HalError> {
        self.inner.enumerate_devices().await
    }

    async fn get_all_properties(&self, udi: &DeviceId) -> Result<PropertyMap, HalError> {
        self.inner.get_all_properties(udi).await
    }

    async fn property_exists(&self, udi: &DeviceId, key: &str) -> Result<bool, HalError> {
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(HalError::unavailable(udi, "gone"));
        }
        self.inner.property_exists(udi, key).await
    }

    async fn get_property(&self, udi: &DeviceId, key: &str) -> Result<PropertyValue, HalError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(HalError::unavailable(udi, "gone"));
        }
        self.inner.get_property(udi, key).await
    }
}

/// Device A holds vendor = "Old" in the tree; the daemon then reports "New"
async fn stale_vendor() -> (Arc<MemoryDaemon>, Arc<FlakyDaemon>, Synchronizer) {
    let mut a = props(None);
    a.insert("vendor".to_string(), "Old".into());
    let inner = Arc::new(MemoryDaemon::with_devices([(id("A"), a), (id("B"), props(Some("A")))]));
    let flaky = Arc::new(FlakyDaemon {
        inner: inner.clone(),
        fail_exists: AtomicBool::new(false),
        fail_get: AtomicBool::new(false),
    });
    let sync = Synchronizer::bootstrap(flaky.clone(), EngineConfig::default())
        .await
        .unwrap();
    inner.set_property(&id("A"), "vendor", "New".into()).await.unwrap();
    (inner, flaky, sync)
}

fn vendor_changed() -> HalSignal {
    HalSignal::PropertyModified {
        udi: id("A"),
        modifications: vec![PropertyModification::new("vendor", false, false)],
    }
}

#[tokio::test]
async fn failed_value_fetch_keeps_old_value() {
    let (inner, flaky, sync) = stale_vendor().await;
    flaky.fail_get.store(true, Ordering::SeqCst);
    let mut changes = sync.subscribe();

    assert_eq!(sync.apply(&vendor_changed()).await, SyncOutcome::Unchanged);

    let a = sync.resolve(&id("A")).await.unwrap();
    assert_eq!(a.property("vendor"), Some(&PropertyValue::from("Old")));
    assert!(changes.try_recv().is_err());
    assert_eq!(inner.enumeration_count(), 1);
}

#[tokio::test]
async fn failed_existence_check_keeps_old_value() {
    let (_inner, flaky, sync) = stale_vendor().await;
    flaky.fail_exists.store(true, Ordering::SeqCst);

    assert_eq!(sync.apply(&vendor_changed()).await, SyncOutcome::Unchanged);

    let a = sync.resolve(&id("A")).await.unwrap();
    assert_eq!(a.property("vendor"), Some(&PropertyValue::from("Old")));
}

#[tokio::test]
async fn fetch_succeeds_once_daemon_recovers() {
    let (_inner, flaky, sync) = stale_vendor().await;
    flaky.fail_get.store(true, Ordering::SeqCst);
    sync.apply(&vendor_changed()).await;
    flaky.fail_get.store(false, Ordering::SeqCst);

    assert!(matches!(
        sync.apply(&vendor_changed()).await,
        SyncOutcome::Patched { updated: 1, removed: 0, .. }
    ));
    let a = sync.resolve(&id("A")).await.unwrap();
    assert_eq!(a.property("vendor"), Some(&PropertyValue::from("New")));
}

#[tokio::test]
async fn unavailable_device_signal_through_router_is_unchanged() {
    let (daemon, router) = abc().await;
    daemon.set_unavailable(&id("A"), true).await;

    let outcome = router
        .dispatch(HalSignal::PropertyModified {
            udi: id("A"),
            modifications: vec![PropertyModification::new("info.bus", true, false)],
        })
        .await;

    assert_eq!(outcome, SyncOutcome::Unchanged);
    let a = router.synchronizer().resolve(&id("A")).await.unwrap();
    assert_eq!(a.property("info.bus"), Some(&PropertyValue::from("pci")));
}

#[tokio::test]
async fn duplicate_added_signal_keeps_single_subscription() {
    let (daemon, router) = abc().await;
    let signal = daemon.add_device(id("D"), props(Some("C"))).await;

    router.dispatch(signal.clone()).await;
    let calls = daemon.subscribe_calls();
    router.dispatch(signal).await;

    assert_eq!(daemon.subscribe_calls(), calls);
    assert_eq!(router.subscribed().await.len(), 4);
    let tree = router.synchronizer().current_tree().await;
    assert_eq!(child_ids(&tree, "C"), vec!["D"]);
}

#[tokio::test]
async fn run_loop_processes_signals_and_tears_down() {
    let (daemon, router) = abc().await;
    let router = Arc::new(router);
    let (tx, rx) = mpsc::channel(16);
    daemon.attach(tx).await;

    let mut changes = router.synchronizer().subscribe();
    let task = {
        let router = router.clone();
        tokio::spawn(async move { router.run(rx).await })
    };

    daemon.add_device(id("E"), props(Some("A"))).await;
    tokio::time::timeout(Duration::from_secs(5), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(router.synchronizer().resolve(&id("E")).await.is_some());

    daemon.detach().await;
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    assert!(router.subscribed().await.is_empty());
    assert!(daemon.subscribed().await.is_empty());
}
