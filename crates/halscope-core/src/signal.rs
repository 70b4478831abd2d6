//! Daemon notifications
//!
//! Raw bus messages are decoded once, at the adapter boundary, into
//! [`HalSignal`]. Everything past that point matches on the enum.
//!
//! Wire layout of the signals handled here:
//!
//! | interface                     | member             | arguments                    |
//! |-------------------------------|--------------------|------------------------------|
//! | `org.freedesktop.Hal.Manager` | `DeviceAdded`      | `s udi`                      |
//! | `org.freedesktop.Hal.Manager` | `DeviceRemoved`    | `s udi`                      |
//! | `org.freedesktop.Hal.Manager` | `NewCapability`    | `s udi, s capability`        |
//! | `org.freedesktop.Hal.Device`  | `PropertyModified` | `i n, (s key, b rem, b add)*n` |
//! | `org.freedesktop.Hal.Device`  | `Condition`        | `s name, ...`                |
//!
//! Device signals carry the device UDI as their object path.

use crate::error::SignalDecodeError;
use crate::node::DeviceId;

pub const HAL_SERVICE: &str = "org.freedesktop.Hal";
pub const MANAGER_PATH: &str = "/org/freedesktop/Hal/Manager";
pub const MANAGER_INTERFACE: &str = "org.freedesktop.Hal.Manager";
pub const DEVICE_INTERFACE: &str = "org.freedesktop.Hal.Device";

/// One entry of a `PropertyModified` signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyModification {
    pub key: String,
    pub removed: bool,
    pub added: bool,
}

impl PropertyModification {
    pub fn new(key: impl Into<String>, removed: bool, added: bool) -> Self {
        Self {
            key: key.into(),
            removed,
            added,
        }
    }
}

/// A decoded notification from the daemon
#[derive(Debug, Clone, PartialEq)]
pub enum HalSignal {
    DeviceAdded(DeviceId),
    DeviceRemoved(DeviceId),
    NewCapability {
        udi: DeviceId,
        capability: String,
    },
    PropertyModified {
        udi: DeviceId,
        modifications: Vec<PropertyModification>,
    },
    Condition {
        udi: DeviceId,
        name: String,
        args: Vec<SignalArg>,
    },
}

impl HalSignal {
    /// The device this signal concerns
    pub fn udi(&self) -> &DeviceId {
        match self {
            Self::DeviceAdded(udi) | Self::DeviceRemoved(udi) => udi,
            Self::NewCapability { udi, .. }
            | Self::PropertyModified { udi, .. }
            | Self::Condition { udi, .. } => udi,
        }
    }

    /// Whether this signal changes which devices exist
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::DeviceAdded(_) | Self::DeviceRemoved(_))
    }

    /// Decode a raw bus message
    ///
    /// `path` is the emitting object's path; for device signals it is the UDI.
    pub fn decode(interface: &str, member: &str, path: &str, args: &[SignalArg]) -> Result<Self, SignalDecodeError> {
        let mut reader = ArgReader::new(member, args);
        let signal = match (interface, member) {
            (MANAGER_INTERFACE, "DeviceAdded") => {
                reader.expect_len(1)?;
                Self::DeviceAdded(DeviceId::new(reader.string()?))
            }
            (MANAGER_INTERFACE, "DeviceRemoved") => {
                reader.expect_len(1)?;
                Self::DeviceRemoved(DeviceId::new(reader.string()?))
            }
            (MANAGER_INTERFACE, "NewCapability") => {
                reader.expect_len(2)?;
                let udi = DeviceId::new(reader.string()?);
                let capability = reader.string()?;
                Self::NewCapability { udi, capability }
            }
            (DEVICE_INTERFACE, "PropertyModified") => {
                let count = reader.int32()?;
                if count < 0 {
                    return Err(SignalDecodeError::NegativeCount(count));
                }
                let count = count as usize;
                reader.expect_len(1 + 3 * count)?;
                let mut modifications = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = reader.string()?;
                    let removed = reader.boolean()?;
                    let added = reader.boolean()?;
                    modifications.push(PropertyModification { key, removed, added });
                }
                Self::PropertyModified {
                    udi: DeviceId::new(path),
                    modifications,
                }
            }
            (DEVICE_INTERFACE, "Condition") => {
                let name = reader.string()?;
                Self::Condition {
                    udi: DeviceId::new(path),
                    name,
                    args: reader.rest().to_vec(),
                }
            }
            _ => {
                return Err(SignalDecodeError::UnknownSignal {
                    interface: interface.to_string(),
                    member: member.to_string(),
                })
            }
        };
        Ok(signal)
    }

    /// Encode back to the raw argument list, in wire order
    pub fn to_args(&self) -> Vec<SignalArg> {
        match self {
            Self::DeviceAdded(udi) | Self::DeviceRemoved(udi) => vec![SignalArg::Str(udi.0.clone())],
            Self::NewCapability { udi, capability } => {
                vec![SignalArg::Str(udi.0.clone()), SignalArg::Str(capability.clone())]
            }
            Self::PropertyModified { modifications, .. } => {
                let mut args = Vec::with_capacity(1 + 3 * modifications.len());
                args.push(SignalArg::Int32(modifications.len() as i32));
                for m in modifications {
                    args.push(SignalArg::Str(m.key.clone()));
                    args.push(SignalArg::Bool(m.removed));
                    args.push(SignalArg::Bool(m.added));
                }
                args
            }
            Self::Condition { name, args, .. } => {
                let mut out = vec![SignalArg::Str(name.clone())];
                out.extend(args.iter().cloned());
                out
            }
        }
    }
}

/// A basic-typed argument as it appears in a bus message body
#[derive(Debug, Clone, PartialEq)]
pub enum SignalArg {
    Str(String),
    Int32(i32),
    Bool(bool),
    Other(String),
}

struct ArgReader<'a> {
    member: &'a str,
    args: &'a [SignalArg],
    pos: usize,
}

impl<'a> ArgReader<'a> {
    fn new(member: &'a str, args: &'a [SignalArg]) -> Self {
        Self { member, args, pos: 0 }
    }

    fn expect_len(&self, expected: usize) -> Result<(), SignalDecodeError> {
        if self.args.len() != expected {
            return Err(SignalDecodeError::ArgumentCount {
                member: self.member.to_string(),
                expected,
                actual: self.args.len(),
            });
        }
        Ok(())
    }

    fn bad(&self, expected: &'static str) -> SignalDecodeError {
        SignalDecodeError::BadArgument {
            member: self.member.to_string(),
            position: self.pos,
            expected,
        }
    }

    fn string(&mut self) -> Result<String, SignalDecodeError> {
        match self.args.get(self.pos) {
            Some(SignalArg::Str(s)) => {
                self.pos += 1;
                Ok(s.clone())
            }
            _ => Err(self.bad("string")),
        }
    }

    fn int32(&mut self) -> Result<i32, SignalDecodeError> {
        match self.args.get(self.pos) {
            Some(SignalArg::Int32(v)) => {
                self.pos += 1;
                Ok(*v)
            }
            _ => Err(self.bad("int32")),
        }
    }

    fn boolean(&mut self) -> Result<bool, SignalDecodeError> {
        match self.args.get(self.pos) {
            Some(SignalArg::Bool(v)) => {
                self.pos += 1;
                Ok(*v)
            }
            _ => Err(self.bad("boolean")),
        }
    }

    fn rest(&self) -> &'a [SignalArg] {
        &self.args[self.pos.min(self.args.len())..]
    }
}
