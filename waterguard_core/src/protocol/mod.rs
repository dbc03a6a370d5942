//! Waterguard Linkbox UDP protocol implementation
//!
//! The hub speaks a small, quirky subset of BACnet/IP. This module is laid out as:
//! - `codec`: request frame encoding and heuristic response decoding (no I/O)
//! - `transport`: one-socket-per-request UDP exchange with retries
//! - `client`: semantic hub operations built on codec + transport
//! - `objects`: the object map the hub exposes
//! - `status`: typed records returned by the client
//! - `discovery`: device-id probing for hubs with an unknown device instance

pub mod client;
pub mod codec;
pub mod discovery;
pub mod error;
pub mod objects;
pub mod status;
pub mod transport;

// Re-export main types
pub use client::{
    DeviceClient, DiscoveredSensor, DiscoveredSensors, SensorDataType, ValveAction,
    battery_percentage, remap_valve_count,
};
pub use codec::{Codec, DecodeContext};
pub use discovery::{DeviceProbe, probe_device_ids};
pub use error::{DecodeError, ProtocolError, Result};
pub use objects::{ObjectId, ObjectType, SensorKey};
pub use status::{DeviceInfo, HubStatus, ValveStatus, WaterStatus, WirelessReading};
pub use transport::{Transport, TransportConfig, TransportStats, UdpTransport};

/// Default BACnet/IP UDP port of the hub
pub const DEFAULT_PORT: u16 = 47808;

/// Maximum response size read from the socket
pub const MAX_PACKET_SIZE: usize = 1024;

/// First local port tried when binding the request socket
pub const LOCAL_PORT_START: u16 = 47809;

/// Last (exclusive) local port tried before falling back to an OS-assigned port
pub const LOCAL_PORT_END: u16 = 47900;

/// Receive timeout for a single request attempt, in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 5;

/// Retries used by ordinary reads (total attempts = retries + 1)
pub const DEFAULT_RETRIES: u32 = 2;

/// Retries used by the alarm reset write
pub const RESET_RETRIES: u32 = 3;

/// Property identifier for Present_Value
pub const PROP_PRESENT_VALUE: u32 = 85;

/// Property identifier for Object_Name
pub const PROP_OBJECT_NAME: u32 = 77;

/// Property identifier probed for firmware availability
pub const PROP_FIRMWARE_REVISION: u32 = 139;

/// Property identifier for Application_Software_Version
pub const PROP_APPLICATION_VERSION: u32 = 12;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_constants() {
        assert_eq!(DEFAULT_PORT, 47808);
        assert_eq!(MAX_PACKET_SIZE, 1024);
        assert!(LOCAL_PORT_START < LOCAL_PORT_END);
        assert_eq!(REQUEST_TIMEOUT_SECS, 5);
        assert_eq!(DEFAULT_RETRIES, 2);
        assert_eq!(RESET_RETRIES, 3);
        assert_eq!(PROP_PRESENT_VALUE, 85);
    }
}
