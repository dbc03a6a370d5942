//! Configuration types shared by the library and its front ends
//!
//! All types deserialize with defaults for missing fields so partial TOML
//! files and environment overrides layer cleanly on top of each other.

use crate::error::ValidationError;
use crate::notify::NotificationSettings;
use crate::protocol::objects::MAX_INSTANCE;
use crate::protocol::{DEFAULT_PORT, TransportConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds applied to the normal scan interval, in seconds
pub const SCAN_INTERVAL_RANGE: (u64, u64) = (1, 300);

/// Bounds applied to the fast poll interval, in seconds
pub const FAST_POLL_INTERVAL_RANGE: (u64, u64) = (1, 10);

/// Where the hub lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    pub device_id: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            device_id: 1,
        }
    }
}

impl HubConfig {
    pub fn new(host: impl Into<String>, port: u16, device_id: u32) -> Self {
        Self {
            host: host.into(),
            port,
            device_id,
        }
    }

    /// Check the values the hub cannot work without
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::invalid_configuration("hub host is not set"));
        }
        if self.port == 0 {
            return Err(ValidationError::invalid_parameter("port", "must be non-zero"));
        }
        if self.device_id > MAX_INSTANCE {
            return Err(ValidationError::invalid_parameter(
                "device_id",
                &format!("must not exceed {MAX_INSTANCE}"),
            ));
        }
        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.host.clone(), self.port)
    }
}

/// Polling cadence, in whole seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Interval between cycles while no alarm is active
    pub scan_interval: u64,
    /// Interval between cycles while an alarm is active
    pub fast_poll_interval: u64,
    /// Whether wireless sensors are read at all
    pub poll_wireless: bool,
    /// Minimum time between forced wireless reads outside an alarm
    pub wireless_poll_interval: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            scan_interval: 2,
            fast_poll_interval: 1,
            poll_wireless: true,
            wireless_poll_interval: 30,
        }
    }
}

impl PollConfig {
    /// Copy with intervals clamped to their allowed ranges
    pub fn validated(&self) -> Self {
        Self {
            scan_interval: self
                .scan_interval
                .clamp(SCAN_INTERVAL_RANGE.0, SCAN_INTERVAL_RANGE.1),
            fast_poll_interval: self
                .fast_poll_interval
                .clamp(FAST_POLL_INTERVAL_RANGE.0, FAST_POLL_INTERVAL_RANGE.1),
            ..self.clone()
        }
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    pub fn fast_poll_duration(&self) -> Duration {
        Duration::from_secs(self.fast_poll_interval)
    }

    pub fn wireless_poll_duration(&self) -> Duration {
        Duration::from_secs(self.wireless_poll_interval)
    }
}

/// Which alarm notifications are produced and how they are delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub persistent: bool,
    pub mobile: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persistent: true,
            mobile: true,
        }
    }
}

impl NotificationConfig {
    pub fn settings(&self) -> NotificationSettings {
        NotificationSettings {
            persistent: self.persistent,
            mobile: self.mobile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_config_clamping() {
        let config = PollConfig {
            scan_interval: 0,
            fast_poll_interval: 60,
            poll_wireless: false,
            wireless_poll_interval: 45,
        }
        .validated();
        assert_eq!(config.scan_interval, 1);
        assert_eq!(config.fast_poll_interval, 10);
        assert!(!config.poll_wireless);
        assert_eq!(config.wireless_poll_interval, 45);

        let config = PollConfig {
            scan_interval: 1000,
            ..PollConfig::default()
        }
        .validated();
        assert_eq!(config.scan_duration(), Duration::from_secs(300));
    }

    #[test]
    fn test_defaults() {
        let poll = PollConfig::default();
        assert_eq!(poll.scan_duration(), Duration::from_secs(2));
        assert_eq!(poll.fast_poll_duration(), Duration::from_secs(1));
        assert_eq!(poll.wireless_poll_duration(), Duration::from_secs(30));
        assert!(poll.poll_wireless);
        assert_eq!(HubConfig::default().port, 47808);
        assert!(NotificationConfig::default().enabled);
    }

    #[test]
    fn test_hub_validation() {
        assert!(HubConfig::new("192.168.1.20", 47808, 1234).validate().is_ok());
        assert!(matches!(
            HubConfig::default().validate(),
            Err(ValidationError::InvalidConfiguration { .. })
        ));
        assert!(
            HubConfig::new("hub.local", 47808, MAX_INSTANCE + 1)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_partial_deserialization() {
        let poll: PollConfig = serde_json::from_str(r#"{"scan_interval": 5}"#).unwrap();
        assert_eq!(poll.scan_interval, 5);
        assert_eq!(poll.fast_poll_interval, 1);
    }
}
