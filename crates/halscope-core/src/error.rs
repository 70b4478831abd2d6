//! Error types for the synchronization engine

use thiserror::Error;

use crate::node::DeviceId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    #[error("Failed to enumerate devices: {0}")]
    Enumeration(String),
    #[error("Device {udi} unavailable: {reason}")]
    DeviceUnavailable { udi: DeviceId, reason: String },
    #[error("Duplicate device identifier: {0}")]
    DuplicateIdentifier(DeviceId),
    #[error("Signal subscription for {udi} failed: {reason}")]
    Subscription { udi: DeviceId, reason: String },
}

impl HalError {
    pub fn unavailable(udi: &DeviceId, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            udi: udi.clone(),
            reason: reason.into(),
        }
    }
}

/// Raised when a raw bus message cannot be decoded into a signal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalDecodeError {
    #[error("Unknown signal {interface}.{member}")]
    UnknownSignal { interface: String, member: String },
    #[error("Signal {member}: expected {expected} at argument {position}")]
    BadArgument {
        member: String,
        position: usize,
        expected: &'static str,
    },
    #[error("Signal {member}: expected {expected} arguments, got {actual}")]
    ArgumentCount {
        member: String,
        expected: usize,
        actual: usize,
    },
    #[error("PropertyModified: negative modification count {0}")]
    NegativeCount(i32),
}
