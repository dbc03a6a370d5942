//! Waterguard Core Library
//!
//! Client library for Waterguard Linkbox water-leak hubs. The hub speaks a
//! BACnet-like protocol over UDP; this crate provides the frame codec, a
//! retrying transport, a semantic device client and a polling coordinator
//! with caching, alarm tracking and diagnostics on top.

pub mod alarm;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod state_machine;

// Re-export main types
pub use alarm::{AlarmConditions, LOW_BATTERY_VOLTS};
pub use cache::{DEFAULT_MAX_ENTRIES, EntityCache, Reading};
pub use config::{HubConfig, NotificationConfig, PollConfig};
pub use coordinator::{PollSnapshot, PollingCoordinator};
pub use diagnostics::{Connectivity, DiagnosticsReport, Trend, WirelessDiagnostic, WirelessRun};
pub use error::{Error, PollError, ProtocolError, Result, ValidationError};
pub use notify::{
    AlarmChange, AlarmEvent, AlarmKind, AlarmPriority, AlarmTracker, NotificationSettings,
    Notifier, NullNotifier,
};
pub use protocol::{
    DeviceClient, DeviceProbe, DiscoveredSensors, HubStatus, SensorKey, ValveAction,
    WirelessReading, probe_device_ids,
};
pub use state_machine::{
    AlarmState, StateMachine, StateMachineInfo, ValveMotion, ValveMotionTracker, ValveState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
