//! Alarm condition evaluation over a hub snapshot

use crate::protocol::codec::SENTINEL_NOT_CONNECTED;
use crate::protocol::{HubStatus, SensorKey, ValveStatus};
use crate::state_machine::is_disconnected_code;
use serde::Serialize;

/// Wireless battery voltage below which the low-battery alarm fires
pub const LOW_BATTERY_VOLTS: f64 = 2.5;

/// True when the hub reports no valve system at all (raw count 319)
pub fn valve_system_disconnected(valve: &ValveStatus) -> bool {
    valve.raw_num_valves == Some(SENTINEL_NOT_CONNECTED as f64)
}

/// Valves whose status carries a disconnected code.
///
/// Valve 2 only counts on two-valve systems.
pub fn disconnected_valves(valve: &ValveStatus) -> Vec<u8> {
    let count = valve.valve_count();
    (1..=2u8)
        .filter(|index| *index == 1 || count >= 2)
        .filter(|index| valve.status(*index).is_some_and(is_disconnected_code))
        .collect()
}

/// Which alarm conditions hold for one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlarmConditions {
    pub system_alarm: bool,
    pub wired_leak: bool,
    pub wireless_leak1: bool,
    pub wireless_leak2: bool,
    pub valve_disconnected: bool,
    pub low_battery: bool,
}

impl AlarmConditions {
    pub fn evaluate(status: &HubStatus) -> Self {
        let valve = &status.valve;
        let valve_disconnected =
            valve_system_disconnected(valve) || !disconnected_valves(valve).is_empty();

        let wireless = &status.wireless;
        Self {
            system_alarm: status.water.alarm.is_some_and(|v| v >= 1.0),
            wired_leak: status.water.leak1.is_some_and(|v| v >= 1.0),
            wireless_leak1: wireless.get(SensorKey::Leak1).is_some_and(|v| v >= 1.0),
            wireless_leak2: wireless.get(SensorKey::Leak2).is_some_and(|v| v >= 1.0),
            valve_disconnected,
            low_battery: wireless
                .get(SensorKey::BatteryVoltage)
                .is_some_and(|v| v < LOW_BATTERY_VOLTS),
        }
    }

    /// Whether any condition calls for fast polling
    pub fn any(&self) -> bool {
        self.system_alarm
            || self.wired_leak
            || self.wireless_leak1
            || self.wireless_leak2
            || self.valve_disconnected
            || self.low_battery
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_snapshot() {
        let mut status = HubStatus::default();
        status.water.alarm = Some(0.0);
        status.valve.raw_num_valves = Some(2.0);
        status.valve.num_valves = Some(1.0);
        status.valve.status1 = Some(3.0);
        status.wireless.set(SensorKey::BatteryVoltage, 3.0);
        assert!(!AlarmConditions::evaluate(&status).any());
    }

    #[test]
    fn test_low_battery() {
        let mut status = HubStatus::default();
        status.wireless.set(SensorKey::BatteryVoltage, 2.3);
        let conditions = AlarmConditions::evaluate(&status);
        assert!(conditions.low_battery);
        assert!(conditions.any());
    }

    #[test]
    fn test_valve_conditions() {
        let mut status = HubStatus::default();
        status.valve.raw_num_valves = Some(319.0);
        status.valve.num_valves = Some(0.0);
        assert!(AlarmConditions::evaluate(&status).valve_disconnected);

        let mut status = HubStatus::default();
        status.valve.num_valves = Some(2.0);
        status.valve.status1 = Some(3.0);
        status.valve.status2 = Some(1087.0);
        assert!(AlarmConditions::evaluate(&status).valve_disconnected);

        // A second status is ignored for single-valve systems
        status.valve.num_valves = Some(1.0);
        assert!(!AlarmConditions::evaluate(&status).any());
    }

    #[test]
    fn test_disconnected_valves() {
        let mut valve = ValveStatus {
            raw_num_valves: Some(3.0),
            num_valves: Some(2.0),
            control: None,
            status1: Some(4.0),
            status2: Some(1087.0),
        };
        assert_eq!(disconnected_valves(&valve), vec![1, 2]);
        assert!(!valve_system_disconnected(&valve));

        valve.num_valves = Some(1.0);
        assert_eq!(disconnected_valves(&valve), vec![1]);

        valve.raw_num_valves = Some(319.0);
        valve.num_valves = Some(0.0);
        valve.status1 = None;
        assert!(disconnected_valves(&valve).is_empty());
        assert!(valve_system_disconnected(&valve));
    }

    #[test]
    fn test_leaks() {
        let mut status = HubStatus::default();
        status.water.leak1 = Some(1.0);
        status.wireless.set(SensorKey::Leak2, 1.0);
        let conditions = AlarmConditions::evaluate(&status);
        assert!(conditions.wired_leak);
        assert!(!conditions.wireless_leak1);
        assert!(conditions.wireless_leak2);
    }
}
