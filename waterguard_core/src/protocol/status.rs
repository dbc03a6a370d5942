//! Typed records returned by the device client
//!
//! Every field is optional: `None` means the hub did not answer or the answer
//! could not be decoded, which is distinct from a reading of zero.

use crate::protocol::objects::SensorKey;
use serde::Serialize;
use std::collections::BTreeMap;

/// Wired water monitoring values
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WaterStatus {
    pub alarm: Option<f64>,
    pub leak1: Option<f64>,
}

impl WaterStatus {
    pub fn is_empty(&self) -> bool {
        self.alarm.is_none() && self.leak1.is_none()
    }

    /// Named values, used for cache keys
    pub fn entries(&self) -> Vec<(&'static str, Option<f64>)> {
        vec![("alarm", self.alarm), ("leak1", self.leak1)]
    }
}

/// Valve count and per-valve status codes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValveStatus {
    /// Count exactly as the hub reported it (319 means the valve system is gone)
    pub raw_num_valves: Option<f64>,
    /// Count after remapping to a real number of valves
    pub num_valves: Option<f64>,
    pub control: Option<f64>,
    pub status1: Option<f64>,
    pub status2: Option<f64>,
}

impl ValveStatus {
    pub fn is_empty(&self) -> bool {
        self.raw_num_valves.is_none()
            && self.control.is_none()
            && self.status1.is_none()
            && self.status2.is_none()
    }

    /// Number of valves as an integer, zero when unknown
    pub fn valve_count(&self) -> u32 {
        self.num_valves
            .filter(|n| n.is_finite() && *n > 0.0)
            .map_or(0, |n| n as u32)
    }

    /// Status code of valve 1 or 2
    pub fn status(&self, index: u8) -> Option<f64> {
        match index {
            1 => self.status1,
            2 => self.status2,
            _ => None,
        }
    }

    pub fn entries(&self) -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("num_valves", self.num_valves),
            ("control", self.control),
            ("status1", self.status1),
            ("status2", self.status2),
        ]
    }
}

/// Which identity properties the device object answered for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub has_name: bool,
    pub has_firmware: bool,
    pub has_app_version: bool,
}

impl DeviceInfo {
    pub fn is_empty(&self) -> bool {
        !(self.has_name || self.has_firmware || self.has_app_version)
    }
}

/// Wireless channel values plus the derived battery percentage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WirelessReading {
    pub values: BTreeMap<SensorKey, f64>,
    pub battery_percentage: Option<u8>,
}

impl WirelessReading {
    pub fn get(&self, key: SensorKey) -> Option<f64> {
        self.values.get(&key).copied()
    }

    pub fn set(&mut self, key: SensorKey, value: f64) {
        self.values.insert(key, value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Leak channels and their values
    pub fn leaks(&self) -> impl Iterator<Item = (SensorKey, f64)> + '_ {
        self.values
            .iter()
            .filter(|(key, _)| key.is_leak())
            .map(|(key, value)| (*key, *value))
    }

    /// Recompute the battery percentage from the voltage channel
    pub fn refresh_battery(&mut self) {
        self.battery_percentage = self
            .get(SensorKey::BatteryVoltage)
            .map(crate::protocol::battery_percentage);
    }

    pub fn entries(&self) -> Vec<(String, Option<f64>)> {
        let mut entries: Vec<_> = self
            .values
            .iter()
            .map(|(key, value)| (key.as_str().to_string(), Some(*value)))
            .collect();
        if let Some(percent) = self.battery_percentage {
            entries.push(("battery_percentage".to_string(), Some(percent as f64)));
        }
        entries
    }
}

/// Result of one full read of the hub
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HubStatus {
    pub water: WaterStatus,
    pub valve: ValveStatus,
    pub device: DeviceInfo,
    pub wireless: WirelessReading,
}

impl HubStatus {
    /// True when no section carries any data
    pub fn is_empty(&self) -> bool {
        self.water.is_empty()
            && self.valve.is_empty()
            && self.device.is_empty()
            && self.wireless.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_status() {
        let status = HubStatus::default();
        assert!(status.is_empty());

        let mut status = HubStatus::default();
        status.device.has_name = true;
        assert!(!status.is_empty());
    }

    #[test]
    fn test_valve_count() {
        let valve = ValveStatus {
            raw_num_valves: Some(3.0),
            num_valves: Some(2.0),
            ..ValveStatus::default()
        };
        assert_eq!(valve.valve_count(), 2);
        assert_eq!(ValveStatus::default().valve_count(), 0);
    }

    #[test]
    fn test_wireless_entries_include_battery() {
        let mut reading = WirelessReading::default();
        reading.set(SensorKey::Leak1, 0.0);
        reading.set(SensorKey::BatteryVoltage, 3.3);
        reading.refresh_battery();

        assert_eq!(reading.battery_percentage, Some(100));
        assert_eq!(reading.leaks().count(), 1);
        let keys: Vec<_> = reading.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["leak1", "battery_voltage", "battery_percentage"]);
    }
}
