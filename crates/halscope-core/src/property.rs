//! Typed property values carried by devices
//!
//! The daemon exposes every device as a flat set of key/value pairs. Values are
//! one of four scalar types; the core treats them as opaque apart from the
//! parent-link key (used for linking) and the bus key (see [`BusClass`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property mapping of a single device, sorted by key
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A single scalar property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl PropertyValue {
    /// Name of the value's type as shown in property tables
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Double(_) => "double",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Int(v) => write!(f, "{} (0x{:x})", v, v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{:.6}", v),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// Bus category a device belongs to, as reported under the bus key
///
/// Known tags get a display name; anything else is kept verbatim so that
/// no information published by the daemon is lost.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BusClass {
    Pci,
    Usb,
    UsbDevice,
    Ide,
    IdeHost,
    Block,
    Scsi,
    ScsiHost,
    Ieee1394,
    Input,
    Net,
    Platform,
    Printer,
    Unknown,
    Other(String),
}

impl BusClass {
    /// Classify a raw bus tag
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "pci" => Self::Pci,
            "usb" => Self::Usb,
            "usb_device" => Self::UsbDevice,
            "ide" => Self::Ide,
            "ide_host" => Self::IdeHost,
            "block" => Self::Block,
            "scsi" => Self::Scsi,
            "scsi_host" => Self::ScsiHost,
            "ieee1394" => Self::Ieee1394,
            "input" => Self::Input,
            "net" => Self::Net,
            "platform" => Self::Platform,
            "printer" => Self::Printer,
            "unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }

    /// The tag exactly as the daemon publishes it
    pub fn as_tag(&self) -> &str {
        match self {
            Self::Pci => "pci",
            Self::Usb => "usb",
            Self::UsbDevice => "usb_device",
            Self::Ide => "ide",
            Self::IdeHost => "ide_host",
            Self::Block => "block",
            Self::Scsi => "scsi",
            Self::ScsiHost => "scsi_host",
            Self::Ieee1394 => "ieee1394",
            Self::Input => "input",
            Self::Net => "net",
            Self::Platform => "platform",
            Self::Printer => "printer",
            Self::Unknown => "unknown",
            Self::Other(tag) => tag,
        }
    }

    /// Human-readable bus name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Pci => "PCI",
            Self::Usb => "USB",
            Self::UsbDevice => "USB Device",
            Self::Ide => "IDE",
            Self::IdeHost => "IDE Host",
            Self::Block => "Block Device",
            Self::Scsi => "SCSI",
            Self::ScsiHost => "SCSI Host",
            Self::Ieee1394 => "IEEE 1394",
            Self::Input => "Input",
            Self::Net => "Network",
            Self::Platform => "Platform",
            Self::Printer => "Printer",
            Self::Unknown => "Unknown",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for BusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(PropertyValue::Int(255).to_string(), "255 (0xff)");
        assert_eq!(PropertyValue::Bool(false).to_string(), "false");
        assert_eq!(PropertyValue::Double(1.5).to_string(), "1.500000");
        assert_eq!(PropertyValue::from("Acme").to_string(), "Acme");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(PropertyValue::from("x").type_name(), "string");
        assert_eq!(PropertyValue::Int(1).type_name(), "int");
        assert_eq!(PropertyValue::Bool(true).type_name(), "bool");
        assert_eq!(PropertyValue::Double(0.0).type_name(), "double");
    }

    #[test]
    fn test_untagged_deserialize() {
        let map: PropertyMap = serde_json::from_str(
            r#"{"info.product": "Mouse", "usb.vendor_id": 1133, "info.virtual": false, "x.ratio": 0.5}"#,
        )
        .unwrap();
        assert_eq!(map["info.product"], PropertyValue::from("Mouse"));
        assert_eq!(map["usb.vendor_id"], PropertyValue::Int(1133));
        assert_eq!(map["info.virtual"], PropertyValue::Bool(false));
        assert_eq!(map["x.ratio"], PropertyValue::Double(0.5));
    }

    #[test]
    fn test_bus_class_preserves_unknown_tags() {
        assert_eq!(BusClass::from_tag("usb"), BusClass::Usb);
        assert_eq!(BusClass::from_tag("usb").display_name(), "USB");

        let odd = BusClass::from_tag("mmc");
        assert_eq!(odd, BusClass::Other("mmc".to_string()));
        assert_eq!(odd.as_tag(), "mmc");
    }
}
