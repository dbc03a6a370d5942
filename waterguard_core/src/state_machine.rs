//! Alarm and valve state tracking
//!
//! The state machine normalises raw hub values into a small set of states and
//! reports whether each update actually changed anything. The coordinator
//! uses it to decide when a stale valve reading needs an out-of-band re-read.

use crate::protocol::codec::{SENTINEL_DISCONNECTED, SENTINEL_NOT_CONNECTED};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::fmt;
use tokio::sync::RwLock;

/// Raw status code hubs report for a valve that is not present
pub const VALVE_CODE_DISCONNECTED: f64 = 4.0;

/// Whether a raw valve status means the valve is gone
pub fn is_disconnected_code(raw: f64) -> bool {
    raw == VALVE_CODE_DISCONNECTED || raw == SENTINEL_DISCONNECTED as f64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    #[default]
    Normal,
    Active,
}

impl AlarmState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveState {
    #[default]
    Unknown,
    Open,
    Closed,
    Disconnected,
}

impl ValveState {
    /// Map a raw valve status code
    pub fn from_status(raw: Option<f64>) -> Self {
        match raw {
            Some(v) if v == 3.0 => Self::Open,
            Some(v) if v == 2.0 => Self::Closed,
            Some(v) if is_disconnected_code(v) => Self::Disconnected,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ValveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the state machine for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMachineInfo {
    pub alarm_state: AlarmState,
    pub valve_state: ValveState,
    pub should_force_sync: bool,
    pub alarm_changed_at: Option<DateTime<Utc>>,
    pub valve_changed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    alarm: AlarmState,
    valve: ValveState,
    alarm_changed_at: Option<DateTime<Utc>>,
    valve_changed_at: Option<DateTime<Utc>>,
}

impl Inner {
    fn should_force_resync(&self) -> bool {
        self.alarm == AlarmState::Normal
            && matches!(self.valve, ValveState::Unknown | ValveState::Disconnected)
    }
}

/// Thread-safe alarm and valve state holder
#[derive(Debug, Default)]
pub struct StateMachine {
    inner: RwLock<Inner>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the alarm condition, returning true if the state changed
    pub async fn update_alarm(&self, active: bool, timestamp: DateTime<Utc>) -> bool {
        let next = if active {
            AlarmState::Active
        } else {
            AlarmState::Normal
        };
        let mut inner = self.inner.write().await;
        if inner.alarm == next {
            return false;
        }
        info!("Alarm state {} -> {next}", inner.alarm);
        inner.alarm = next;
        inner.alarm_changed_at = Some(timestamp);
        true
    }

    /// Record a raw valve status, returning true if the state changed
    pub async fn update_valve(&self, raw: Option<f64>, timestamp: DateTime<Utc>) -> bool {
        let next = ValveState::from_status(raw);
        let mut inner = self.inner.write().await;
        if inner.valve == next {
            return false;
        }
        info!("Valve state {} -> {next}", inner.valve);
        inner.valve = next;
        inner.valve_changed_at = Some(timestamp);
        true
    }

    pub async fn alarm_state(&self) -> AlarmState {
        self.inner.read().await.alarm
    }

    pub async fn valve_state(&self) -> ValveState {
        self.inner.read().await.valve
    }

    /// True when no alarm is active and the valve state is not trustworthy
    pub async fn should_force_resync(&self) -> bool {
        self.inner.read().await.should_force_resync()
    }

    pub async fn info(&self) -> StateMachineInfo {
        let inner = self.inner.read().await;
        StateMachineInfo {
            alarm_state: inner.alarm,
            valve_state: inner.valve,
            should_force_sync: inner.should_force_resync(),
            alarm_changed_at: inner.alarm_changed_at,
            valve_changed_at: inner.valve_changed_at,
        }
    }
}

/// Valve position including inferred motion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveMotion {
    #[default]
    Unknown,
    Open,
    Closed,
    Opening,
    Closing,
    Moving,
    Disconnected,
}

impl ValveMotion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Closing => "closing",
            Self::Moving => "moving",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ValveMotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infers valve travel from the last stable position.
///
/// Hubs briefly report 319 while a valve is moving; this is heuristic and not
/// a documented hub guarantee.
#[derive(Debug, Clone, Default)]
pub struct ValveMotionTracker {
    last_stable: Option<ValveMotion>,
    current: ValveMotion,
}

impl ValveMotionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, raw: Option<f64>) -> ValveMotion {
        let motion = match raw {
            Some(v) if v == SENTINEL_NOT_CONNECTED as f64 => match self.last_stable {
                Some(ValveMotion::Closed) => ValveMotion::Opening,
                Some(ValveMotion::Open) => ValveMotion::Closing,
                _ => ValveMotion::Moving,
            },
            other => match ValveState::from_status(other) {
                ValveState::Open => ValveMotion::Open,
                ValveState::Closed => ValveMotion::Closed,
                ValveState::Disconnected => ValveMotion::Disconnected,
                ValveState::Unknown => ValveMotion::Unknown,
            },
        };

        if matches!(motion, ValveMotion::Open | ValveMotion::Closed) {
            self.last_stable = Some(motion);
        }
        self.current = motion;
        motion
    }

    pub fn current(&self) -> ValveMotion {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_alarm_change_detection() {
        let sm = StateMachine::new();
        let now = Utc::now();
        assert!(!sm.update_alarm(false, now).await);
        assert!(sm.update_alarm(true, now).await);
        assert!(!sm.update_alarm(true, now).await);
        assert!(!sm.update_alarm(true, now).await);
        assert_eq!(sm.alarm_state().await, AlarmState::Active);
        assert!(sm.update_alarm(false, now).await);
    }

    #[tokio::test]
    async fn test_valve_mapping() {
        let sm = StateMachine::new();
        let now = Utc::now();
        assert!(sm.update_valve(Some(3.0), now).await);
        assert_eq!(sm.valve_state().await, ValveState::Open);
        assert!(!sm.update_valve(Some(3.0), now).await);
        assert!(sm.update_valve(Some(1087.0), now).await);
        assert_eq!(sm.valve_state().await, ValveState::Disconnected);
        assert!(!sm.update_valve(Some(4.0), now).await);
        assert!(sm.update_valve(None, now).await);
        assert_eq!(sm.valve_state().await, ValveState::Unknown);
        assert!(!sm.update_valve(Some(7.0), now).await);
    }

    #[tokio::test]
    async fn test_force_resync() {
        let sm = StateMachine::new();
        let now = Utc::now();
        assert!(sm.should_force_resync().await);

        sm.update_valve(Some(2.0), now).await;
        assert!(!sm.should_force_resync().await);

        sm.update_valve(Some(4.0), now).await;
        assert!(sm.should_force_resync().await);

        sm.update_alarm(true, now).await;
        assert!(!sm.should_force_resync().await);

        let info = sm.info().await;
        assert_eq!(info.alarm_state, AlarmState::Active);
        assert_eq!(info.valve_state, ValveState::Disconnected);
        assert!(!info.should_force_sync);
        assert_eq!(info.alarm_changed_at, Some(now));
    }

    #[test]
    fn test_motion_inference() {
        let mut tracker = ValveMotionTracker::new();
        assert_eq!(tracker.observe(Some(319.0)), ValveMotion::Moving);
        assert_eq!(tracker.observe(Some(2.0)), ValveMotion::Closed);
        assert_eq!(tracker.observe(Some(319.0)), ValveMotion::Opening);
        assert_eq!(tracker.observe(Some(3.0)), ValveMotion::Open);
        assert_eq!(tracker.observe(Some(319.0)), ValveMotion::Closing);
        assert_eq!(tracker.observe(Some(1087.0)), ValveMotion::Disconnected);
        // Disconnects do not reset the last stable position
        assert_eq!(tracker.observe(Some(319.0)), ValveMotion::Closing);
        assert_eq!(tracker.observe(Some(1.0)), ValveMotion::Unknown);
        assert_eq!(tracker.current(), ValveMotion::Unknown);
    }
}
