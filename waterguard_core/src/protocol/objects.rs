//! Object map exposed by the Waterguard hub
//!
//! Only the handful of object types and instances the hub actually answers for
//! are modelled here.

use crate::protocol::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest instance number that fits the 22-bit instance field
pub const MAX_INSTANCE: u32 = 0x3F_FFFF;

/// Object types the hub uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    Device,
    MultiStateInput,
    MultiStateOutput,
    MultiStateValue,
    NotificationClass,
    NetworkPort,
}

impl ObjectType {
    /// Numeric object type as carried on the wire
    pub const fn code(self) -> u32 {
        match self {
            Self::AnalogInput => 0,
            Self::AnalogOutput => 1,
            Self::AnalogValue => 2,
            Self::BinaryInput => 3,
            Self::BinaryOutput => 4,
            Self::BinaryValue => 5,
            Self::Device => 8,
            Self::MultiStateInput => 13,
            Self::MultiStateOutput => 14,
            Self::MultiStateValue => 19,
            Self::NotificationClass => 20,
            Self::NetworkPort => 56,
        }
    }

    /// Look up an object type from its wire code
    pub fn from_code(code: u32) -> Option<Self> {
        let object_type = match code {
            0 => Self::AnalogInput,
            1 => Self::AnalogOutput,
            2 => Self::AnalogValue,
            3 => Self::BinaryInput,
            4 => Self::BinaryOutput,
            5 => Self::BinaryValue,
            8 => Self::Device,
            13 => Self::MultiStateInput,
            14 => Self::MultiStateOutput,
            19 => Self::MultiStateValue,
            20 => Self::NotificationClass,
            56 => Self::NetworkPort,
            _ => return None,
        };
        Some(object_type)
    }

    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::AnalogInput => "Analog Input",
            Self::AnalogOutput => "Analog Output",
            Self::AnalogValue => "Analog Value",
            Self::BinaryInput => "Binary Input",
            Self::BinaryOutput => "Binary Output",
            Self::BinaryValue => "Binary Value",
            Self::Device => "Device",
            Self::MultiStateInput => "Multi-state Input",
            Self::MultiStateOutput => "Multi-state Output",
            Self::MultiStateValue => "Multi-state Value",
            Self::NotificationClass => "Notification Class",
            Self::NetworkPort => "Network Port",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An object type plus instance number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectId {
    pub const fn new(object_type: ObjectType, instance: u32) -> Self {
        Self {
            object_type,
            instance,
        }
    }

    /// Packed `(type << 22) | instance` identifier
    pub fn packed(&self) -> Result<u32> {
        if self.instance > MAX_INSTANCE {
            return Err(ProtocolError::encoding(format!(
                "Instance {} exceeds maximum {MAX_INSTANCE}",
                self.instance
            )));
        }
        Ok((self.object_type.code() << 22) | self.instance)
    }

    /// Split a packed identifier back into type code and instance
    pub fn unpack(packed: u32) -> (u32, u32) {
        (packed >> 22, packed & MAX_INSTANCE)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type.code(), self.instance)
    }
}

/// Wired water monitoring objects
pub mod water {
    use super::{ObjectId, ObjectType};

    pub const ALARM: ObjectId = ObjectId::new(ObjectType::AnalogInput, 7);
    pub const LEAK1: ObjectId = ObjectId::new(ObjectType::AnalogInput, 9);
    /// Write-only; never read back
    pub const RESET_LEAK: ObjectId = ObjectId::new(ObjectType::MultiStateOutput, 10);
}

/// Valve monitoring and control objects
pub mod valve {
    use super::{ObjectId, ObjectType};

    pub const NUM_VALVES: ObjectId = ObjectId::new(ObjectType::MultiStateInput, 3);
    pub const STATUS1: ObjectId = ObjectId::new(ObjectType::MultiStateInput, 5);
    pub const STATUS2: ObjectId = ObjectId::new(ObjectType::MultiStateInput, 6);
    pub const CONTROL: ObjectId = ObjectId::new(ObjectType::MultiStateOutput, 1);
}

/// Device object for a given device instance
pub fn device(device_id: u32) -> ObjectId {
    ObjectId::new(ObjectType::Device, device_id)
}

/// Wireless sensor channels, keyed by semantic name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKey {
    Leak1,
    Leak2,
    Temperature,
    Humidity,
    BatteryVoltage,
}

impl SensorKey {
    /// All channels in instance order
    pub const ALL: [SensorKey; 5] = [
        SensorKey::Leak1,
        SensorKey::Leak2,
        SensorKey::Temperature,
        SensorKey::Humidity,
        SensorKey::BatteryVoltage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leak1 => "leak1",
            Self::Leak2 => "leak2",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::BatteryVoltage => "battery_voltage",
        }
    }

    /// Instance number shared by the analog and multi-state objects of this channel
    pub fn instance(self) -> u32 {
        match self {
            Self::Leak1 => 11,
            Self::Leak2 => 12,
            Self::Temperature => 13,
            Self::Humidity => 14,
            Self::BatteryVoltage => 15,
        }
    }

    pub fn from_instance(instance: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.instance() == instance)
    }

    pub fn is_leak(self) -> bool {
        self.as_str().starts_with("leak")
    }

    /// Analog input object carrying the measured value
    pub fn object_id(self) -> ObjectId {
        ObjectId::new(ObjectType::AnalogInput, self.instance())
    }

    /// Range enforced on a decoded wireless float (leak channels are coerced instead)
    pub fn decode_range(self) -> Option<(f64, f64)> {
        match self {
            Self::Leak1 | Self::Leak2 => None,
            Self::Temperature => Some((-50.0, 100.0)),
            Self::Humidity => Some((0.0, 150.0)),
            Self::BatteryVoltage => Some((1.5, 4.0)),
        }
    }

    /// Range used when reading an already discovered sensor
    pub fn expected_range(self) -> (f64, f64) {
        match self {
            Self::Leak1 | Self::Leak2 => (0.0, 1.0),
            Self::Temperature => (-50.0, 100.0),
            Self::Humidity => (0.0, 150.0),
            Self::BatteryVoltage => (0.0, 5.0),
        }
    }

    /// Range a discovery candidate must fall in to be accepted
    pub fn discovery_range(self, object_type: ObjectType) -> (f64, f64) {
        match (self, object_type) {
            (Self::Leak1 | Self::Leak2, ObjectType::AnalogInput) => (0.0, 2.0),
            (Self::Leak1 | Self::Leak2, _) => (0.0, 1.5),
            _ => self.expected_range(),
        }
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
