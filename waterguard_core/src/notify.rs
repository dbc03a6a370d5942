//! Alarm notification decisions
//!
//! [`AlarmTracker`] turns successive hub snapshots into raise/clear events,
//! suppressing repeats while an alarm stays active. Delivery is left to a
//! [`Notifier`] implementation supplied by the front end.

use crate::alarm::{LOW_BATTERY_VOLTS, disconnected_valves, valve_system_disconnected};
use crate::protocol::{HubStatus, SensorKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    WaterAlarm,
    WaterLeak,
    ValveAlarm,
    LowBattery,
    ConnectionLost,
    WirelessLeak1,
    WirelessLeak2,
}

impl AlarmKind {
    pub const ALL: [AlarmKind; 7] = [
        Self::WaterAlarm,
        Self::WaterLeak,
        Self::ValveAlarm,
        Self::LowBattery,
        Self::ConnectionLost,
        Self::WirelessLeak1,
        Self::WirelessLeak2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaterAlarm => "water_alarm",
            Self::WaterLeak => "water_leak",
            Self::ValveAlarm => "valve_alarm",
            Self::LowBattery => "low_battery",
            Self::ConnectionLost => "connection_lost",
            Self::WirelessLeak1 => "wireless_leak_1",
            Self::WirelessLeak2 => "wireless_leak_2",
        }
    }

    pub fn priority(self) -> AlarmPriority {
        match self {
            Self::WaterAlarm | Self::WaterLeak | Self::WirelessLeak1 | Self::WirelessLeak2 => {
                AlarmPriority::High
            }
            Self::ValveAlarm | Self::ConnectionLost => AlarmPriority::Medium,
            Self::LowBattery => AlarmPriority::Low,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::WaterAlarm => "Water Alarm Detected",
            Self::WaterLeak => "Water Leak Detected",
            Self::ValveAlarm => "Valve System Alert",
            Self::LowBattery => "Low Battery Warning",
            Self::ConnectionLost => "Connection Lost",
            Self::WirelessLeak1 => "Wireless Leak Sensor 1",
            Self::WirelessLeak2 => "Wireless Leak Sensor 2",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::WaterAlarm => {
                "Water alarm has been triggered on your Waterguard system. Check your water sensors immediately."
            }
            Self::WaterLeak => {
                "Water leak detected by sensor. Check the monitored area and reset the alarm after addressing the issue."
            }
            Self::ValveAlarm => "Valve system alarm detected. Check valve status and operation.",
            Self::LowBattery => "Wireless sensor battery is low. Replace the battery soon.",
            Self::ConnectionLost => {
                "Lost connection to the Waterguard hub. Check network connectivity."
            }
            Self::WirelessLeak1 => {
                "Water leak detected by wireless sensor 1. Check the monitored area and reset the alarm after addressing the issue."
            }
            Self::WirelessLeak2 => {
                "Water leak detected by wireless sensor 2. Check the monitored area and reset the alarm after addressing the issue."
            }
        }
    }

    fn wireless_leak(key: SensorKey) -> Option<Self> {
        match key {
            SensorKey::Leak1 => Some(Self::WirelessLeak1),
            SensorKey::Leak2 => Some(Self::WirelessLeak2),
            _ => None,
        }
    }
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of an active alarm
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmEvent {
    pub kind: AlarmKind,
    /// Human readable value, e.g. `1` or `2.30V`
    pub value: String,
    /// Which sensor reported it
    pub sensor: String,
    pub timestamp: DateTime<Utc>,
}

impl AlarmEvent {
    pub fn new(
        kind: AlarmKind,
        value: impl Into<String>,
        sensor: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            value: value.into(),
            sensor: sensor.into(),
            timestamp,
        }
    }

    pub fn priority(&self) -> AlarmPriority {
        self.kind.priority()
    }
}

/// Delivery channels requested by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationSettings {
    pub persistent: bool,
    pub mobile: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            persistent: true,
            mobile: true,
        }
    }
}

impl NotificationSettings {
    /// Whether any channel is enabled
    pub fn delivers(&self) -> bool {
        self.persistent || self.mobile
    }
}

/// Receives alarm transitions from the coordinator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn alarm_raised(&self, event: &AlarmEvent, settings: &NotificationSettings);

    async fn alarm_cleared(&self, kind: AlarmKind, settings: &NotificationSettings);
}

/// Notifier that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn alarm_raised(&self, _event: &AlarmEvent, _settings: &NotificationSettings) {}

    async fn alarm_cleared(&self, _kind: AlarmKind, _settings: &NotificationSettings) {}
}

/// Transition produced by a check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AlarmChange {
    Raised(AlarmEvent),
    Cleared(AlarmKind),
}

/// Set of currently active alarms
#[derive(Debug, Clone, Default)]
pub struct AlarmTracker {
    active: BTreeMap<AlarmKind, AlarmEvent>,
}

fn format_value(value: f64) -> String {
    format!("{value}")
}

impl AlarmTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every alarm kind against a snapshot
    pub fn check(&mut self, status: &HubStatus, now: DateTime<Utc>) -> Vec<AlarmChange> {
        let mut changes = Vec::new();

        let water = [
            (AlarmKind::WaterAlarm, status.water.alarm, "system_alarm"),
            (AlarmKind::WaterLeak, status.water.leak1, "sensor_tape"),
        ];
        for (kind, value, sensor) in water {
            let event = value
                .filter(|v| *v >= 1.0)
                .map(|v| AlarmEvent::new(kind, format_value(v), sensor, now));
            self.apply(kind, event, &mut changes);
        }

        let mut disconnected = Vec::new();
        if valve_system_disconnected(&status.valve) {
            disconnected.push("valve system".to_string());
        }
        disconnected.extend(
            disconnected_valves(&status.valve)
                .into_iter()
                .map(|index| format!("valve {index}")),
        );
        let valve_event = (!disconnected.is_empty()).then(|| {
            AlarmEvent::new(
                AlarmKind::ValveAlarm,
                format!("Valve(s) disconnected: {}", disconnected.join(", ")),
                "valve_system",
                now,
            )
        });
        self.apply(AlarmKind::ValveAlarm, valve_event, &mut changes);

        let battery_event = status
            .wireless
            .get(SensorKey::BatteryVoltage)
            .filter(|v| *v < LOW_BATTERY_VOLTS)
            .map(|v| {
                AlarmEvent::new(
                    AlarmKind::LowBattery,
                    format!("{v:.2}V"),
                    "wireless_sensor_battery",
                    now,
                )
            });
        self.apply(AlarmKind::LowBattery, battery_event, &mut changes);

        for key in [SensorKey::Leak1, SensorKey::Leak2] {
            let Some(kind) = AlarmKind::wireless_leak(key) else {
                continue;
            };
            let event = status.wireless.get(key).filter(|v| *v >= 1.0).map(|v| {
                AlarmEvent::new(
                    kind,
                    format_value(v),
                    format!("wireless_{}_sensor", key.as_str()),
                    now,
                )
            });
            self.apply(kind, event, &mut changes);
        }

        let connection_event = status.is_empty().then(|| {
            AlarmEvent::new(AlarmKind::ConnectionLost, "No data received", "hub_connection", now)
        });
        self.apply(AlarmKind::ConnectionLost, connection_event, &mut changes);

        changes
    }

    fn apply(&mut self, kind: AlarmKind, event: Option<AlarmEvent>, changes: &mut Vec<AlarmChange>) {
        match event {
            Some(event) => {
                if let Some(raised) = self.trigger(event) {
                    changes.push(AlarmChange::Raised(raised));
                }
            }
            None => {
                if self.clear(kind) {
                    changes.push(AlarmChange::Cleared(kind));
                }
            }
        }
    }

    /// Raise the valve alarm for a valve that stopped reporting as connected
    pub fn valve_disconnected(&mut self, valve: u8, now: DateTime<Utc>) -> Option<AlarmEvent> {
        self.trigger(AlarmEvent::new(
            AlarmKind::ValveAlarm,
            format!("Valve {valve} disconnected"),
            format!("valve_{valve}"),
            now,
        ))
    }

    /// Activate an alarm; returns the event only if it was not already active
    pub fn trigger(&mut self, event: AlarmEvent) -> Option<AlarmEvent> {
        match self.active.get_mut(&event.kind) {
            None => {
                warn!("Alarm triggered: {} - {} at {}", event.kind, event.value, event.timestamp);
                self.active.insert(event.kind, event.clone());
                Some(event)
            }
            Some(existing) => {
                if existing.value != event.value || existing.sensor != event.sensor {
                    debug!(
                        "Alarm updated: {} - {} (previous: {})",
                        event.kind, event.value, existing.value
                    );
                    *existing = event;
                } else {
                    existing.timestamp = event.timestamp;
                }
                None
            }
        }
    }

    /// Deactivate an alarm; returns true if it was active
    pub fn clear(&mut self, kind: AlarmKind) -> bool {
        let cleared = self.active.remove(&kind).is_some();
        if cleared {
            info!("Alarm cleared: {kind}");
        }
        cleared
    }

    pub fn is_active(&self, kind: AlarmKind) -> bool {
        self.active.contains_key(&kind)
    }

    pub fn active(&self) -> Vec<AlarmEvent> {
        self.active.values().cloned().collect()
    }
}
