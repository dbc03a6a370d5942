mod formatters;

pub use formatters::{JsonFormatter, TextFormatter};

use anyhow::Result;
use waterguard_core::diagnostics::Trend;
use waterguard_core::{DeviceProbe, DiscoveredSensors, HubStatus, PollSnapshot, WirelessRun};

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// Renders command results
pub trait OutputFormatter: Send + Sync {
    fn format_status(&self, status: &HubStatus) -> Result<String>;

    /// One monitor update
    fn format_snapshot(&self, snapshot: &PollSnapshot) -> Result<String>;

    fn format_sensors(&self, sensors: &DiscoveredSensors) -> Result<String>;

    fn format_probe(&self, probe: &DeviceProbe) -> Result<String>;

    fn format_wireless_run(&self, run: &WirelessRun, trend: &Trend) -> Result<String>;
}

/// Create a formatter for the requested format
pub fn create_formatter(format: OutputFormat, use_color: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter::new(use_color)),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

/// Render an optional reading, `-` when the hub gave nothing
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{v:.0}"),
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

/// Human label for a valve status code
pub fn valve_label(code: Option<f64>) -> &'static str {
    match code {
        Some(c) if c == 3.0 => "open",
        Some(c) if c == 2.0 => "closed",
        Some(c) if c == 4.0 || c == 1087.0 => "disconnected",
        Some(c) if c == 319.0 => "moving",
        Some(_) => "unknown",
        None => "-",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(3.0)), "3");
        assert_eq!(format_value(Some(21.456)), "21.46");
        assert_eq!(format_value(Some(0.0)), "0");
        assert_eq!(format_value(None), "-");
    }

    #[test]
    fn test_valve_label() {
        assert_eq!(valve_label(Some(3.0)), "open");
        assert_eq!(valve_label(Some(2.0)), "closed");
        assert_eq!(valve_label(Some(1087.0)), "disconnected");
        assert_eq!(valve_label(Some(319.0)), "moving");
        assert_eq!(valve_label(Some(7.0)), "unknown");
        assert_eq!(valve_label(None), "-");
    }

    #[test]
    fn test_format_from_flag() {
        assert_eq!(OutputFormat::from_json_flag(true), OutputFormat::Json);
        assert_eq!(OutputFormat::from_json_flag(false), OutputFormat::Text);
    }
}
