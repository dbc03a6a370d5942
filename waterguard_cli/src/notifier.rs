//! Alarm notifications for the terminal
//!
//! The only delivery channel the CLI has: every transition is logged and,
//! unless the user asked for JSON, echoed to stderr in colour.

use async_trait::async_trait;
use colored::Colorize;
use waterguard_core::{AlarmEvent, AlarmKind, AlarmPriority, NotificationSettings, Notifier};

/// Notifier writing alarm transitions to the log and stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier {
    quiet: bool,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log only, no stderr echo
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

/// Single line shown when an alarm is raised
pub fn raised_line(event: &AlarmEvent) -> String {
    let label = match event.priority() {
        AlarmPriority::High => "ALARM".red().bold(),
        AlarmPriority::Medium => "WARNING".yellow().bold(),
        AlarmPriority::Low => "NOTICE".cyan(),
    };
    format!(
        "{label} {}: {} [{}: {}]",
        event.kind.title(),
        event.kind.message(),
        event.sensor,
        event.value
    )
}

pub fn cleared_line(kind: AlarmKind) -> String {
    format!("{} {}", "CLEARED".green().bold(), kind.title())
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn alarm_raised(&self, event: &AlarmEvent, settings: &NotificationSettings) {
        log::warn!(
            "{} raised ({}) persistent={} mobile={}",
            event.kind,
            event.value,
            settings.persistent,
            settings.mobile
        );
        if !self.quiet {
            eprintln!("{}", raised_line(event));
        }
    }

    async fn alarm_cleared(&self, kind: AlarmKind, _settings: &NotificationSettings) {
        log::info!("{kind} cleared");
        if !self.quiet {
            eprintln!("{}", cleared_line(kind));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_raised_line_contains_details() {
        colored::control::set_override(false);
        let event = AlarmEvent::new(
            AlarmKind::LowBattery,
            "2.30V",
            "battery_voltage",
            Utc::now(),
        );
        let line = raised_line(&event);
        assert!(line.starts_with("NOTICE"));
        assert!(line.contains("2.30V"));
        assert!(line.contains("battery_voltage"));
        assert_eq!(
            cleared_line(AlarmKind::LowBattery),
            format!("CLEARED {}", AlarmKind::LowBattery.title())
        );
    }

    #[tokio::test]
    async fn test_quiet_notifier_accepts_all_transitions() {
        let notifier = LogNotifier::quiet();
        let settings = NotificationSettings::default();
        let event = AlarmEvent::new(AlarmKind::WaterAlarm, "1.0", "system_alarm", Utc::now());
        notifier.alarm_raised(&event, &settings).await;
        notifier.alarm_cleared(AlarmKind::WaterAlarm, &settings).await;
    }
}
