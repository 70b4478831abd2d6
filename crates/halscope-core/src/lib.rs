//! halscope core - live device tree for the HAL device daemon
//!
//! This crate keeps an in-memory tree of the daemon's devices in step with
//! its signals:
//! - Typed device properties and bus categories
//! - An arena-backed device tree under a synthetic root, with O(1) lookup
//! - A tree builder that enumerates the daemon through a substitutable trait
//! - A synchronizer that rebuilds on structural signals and patches
//!   properties in place otherwise
//! - An event router that owns the per-device signal subscriptions

pub mod builder;
pub mod config;
pub mod daemon;
pub mod error;
pub mod index;
pub mod memory;
pub mod node;
pub mod property;
pub mod router;
pub mod signal;
pub mod sync;
pub mod tree;

pub use builder::TreeBuilder;
pub use config::EngineConfig;
pub use daemon::{DeviceDaemon, SignalSubscriber};
pub use error::{HalError, SignalDecodeError};
pub use index::LookupIndex;
pub use memory::MemoryDaemon;
pub use node::{DeviceId, DeviceNode, NodeIndex};
pub use property::{BusClass, PropertyMap, PropertyValue};
pub use router::{EventRouter, SubscriptionSet};
pub use signal::{HalSignal, PropertyModification, SignalArg};
pub use sync::{SyncOutcome, Synchronizer, TreeChanged};
pub use tree::{DeviceRecord, DeviceTree};
