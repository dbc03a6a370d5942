//! Per-device polling session state

use crate::notify::AlarmTracker;
use crate::protocol::{HubStatus, ValveStatus, WirelessReading};
use crate::state_machine::{ValveMotion, ValveMotionTracker, is_disconnected_code};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Everything the coordinator remembers between cycles
#[derive(Debug)]
pub struct SessionState {
    /// Last snapshot returned to callers
    pub last_snapshot: Option<HubStatus>,
    pub last_success: Option<DateTime<Utc>>,
    /// Last non-empty wireless reading
    pub last_wireless: WirelessReading,
    pub last_wireless_poll: Option<Instant>,
    pub last_cycle_duration: Duration,
    pub previous_connected: BTreeSet<u8>,
    pub notified_disconnected: BTreeSet<u8>,
    pub alarm_active: bool,
    pub current_interval: Duration,
    pub cycles: u64,
    pub discovery_complete: bool,
    pub alarms: AlarmTracker,
    pub valve_motion: [ValveMotionTracker; 2],
}

impl SessionState {
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            last_snapshot: None,
            last_success: None,
            last_wireless: WirelessReading::default(),
            last_wireless_poll: None,
            last_cycle_duration: Duration::ZERO,
            previous_connected: BTreeSet::new(),
            notified_disconnected: BTreeSet::new(),
            alarm_active: false,
            current_interval: initial_interval,
            cycles: 0,
            discovery_complete: false,
            alarms: AlarmTracker::new(),
            valve_motion: [ValveMotionTracker::new(), ValveMotionTracker::new()],
        }
    }

    /// Wireless reads are forced during alarms or once the poll interval elapsed
    pub fn wireless_due(&self, now: Instant, interval: Duration) -> bool {
        self.alarm_active
            || self
                .last_wireless_poll
                .is_none_or(|last| now.duration_since(last) >= interval)
    }

    /// Record the valve readings and return indices that just disconnected.
    ///
    /// Each valve is reported once until it shows up as connected again.
    pub fn track_valve_connections(&mut self, valve: &ValveStatus) -> Vec<u8> {
        let connected = connected_valves(valve);
        let mut newly_disconnected = Vec::new();

        for index in self.previous_connected.difference(&connected) {
            if self.notified_disconnected.insert(*index) {
                newly_disconnected.push(*index);
            }
        }
        for index in &connected {
            self.notified_disconnected.remove(index);
        }

        self.previous_connected = connected;
        newly_disconnected
    }

    /// Feed the motion trackers and return the inferred states
    pub fn observe_motion(&mut self, valve: &ValveStatus) -> [ValveMotion; 2] {
        [
            self.valve_motion[0].observe(valve.status1),
            self.valve_motion[1].observe(valve.status2),
        ]
    }

    pub fn motion(&self) -> [ValveMotion; 2] {
        [self.valve_motion[0].current(), self.valve_motion[1].current()]
    }

    /// Merge the current wireless reading with the last good one
    pub fn merge_wireless(&mut self, status: &mut HubStatus) {
        if status.wireless.is_empty() {
            if !self.last_wireless.is_empty() {
                status.wireless = self.last_wireless.clone();
            }
        } else {
            self.last_wireless = status.wireless.clone();
        }
    }
}

/// Valve indices with a usable status code
pub fn connected_valves(valve: &ValveStatus) -> BTreeSet<u8> {
    let count = valve.valve_count();
    (1..=2u8)
        .filter(|index| u32::from(*index) <= count)
        .filter(|index| {
            valve
                .status(*index)
                .is_some_and(|status| !is_disconnected_code(status))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SensorKey;

    fn valves(status1: Option<f64>, status2: Option<f64>) -> ValveStatus {
        ValveStatus {
            raw_num_valves: Some(3.0),
            num_valves: Some(2.0),
            control: None,
            status1,
            status2,
        }
    }

    #[test]
    fn test_connected_valves() {
        let set = connected_valves(&valves(Some(3.0), Some(4.0)));
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![1]);

        let mut single = valves(Some(2.0), Some(3.0));
        single.num_valves = Some(1.0);
        assert_eq!(connected_valves(&single).len(), 1);
        assert!(connected_valves(&valves(None, Some(1087.0))).is_empty());
    }

    #[test]
    fn test_disconnect_reported_once() {
        let mut session = SessionState::new(Duration::from_secs(2));
        assert!(session.track_valve_connections(&valves(Some(3.0), Some(3.0))).is_empty());
        assert_eq!(session.track_valve_connections(&valves(Some(3.0), Some(4.0))), vec![2]);
        assert!(session.track_valve_connections(&valves(Some(3.0), Some(4.0))).is_empty());

        // Reconnect, then drop again
        assert!(session.track_valve_connections(&valves(Some(3.0), Some(2.0))).is_empty());
        assert_eq!(session.track_valve_connections(&valves(Some(3.0), None)), vec![2]);
    }

    #[test]
    fn test_wireless_due() {
        let mut session = SessionState::new(Duration::from_secs(2));
        let now = Instant::now();
        assert!(session.wireless_due(now, Duration::from_secs(30)));

        session.last_wireless_poll = Some(now);
        assert!(!session.wireless_due(now, Duration::from_secs(30)));
        session.alarm_active = true;
        assert!(session.wireless_due(now, Duration::from_secs(30)));
    }

    #[test]
    fn test_merge_wireless_fallback() {
        let mut session = SessionState::new(Duration::from_secs(2));
        let mut status = HubStatus::default();
        status.wireless.set(SensorKey::Temperature, 21.5);
        session.merge_wireless(&mut status);

        let mut next = HubStatus::default();
        session.merge_wireless(&mut next);
        assert_eq!(next.wireless.get(SensorKey::Temperature), Some(21.5));
    }
}
