use super::{OutputFormatter, format_value, valve_label};
use anyhow::Result;
use colored::*;
use serde::Serialize;
use waterguard_core::diagnostics::{ProbeStatus, Trend};
use waterguard_core::{DeviceProbe, DiscoveredSensors, HubStatus, PollSnapshot, WirelessRun};

/// Text formatter for human-readable output
pub struct TextFormatter {
    use_color: bool,
}

impl TextFormatter {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    fn colorize(&self, text: &str, color: fn(&str) -> ColoredString) -> String {
        if self.use_color {
            color(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.colorize(text, |s| s.bold().blue())
    }

    fn flag(&self, active: bool) -> String {
        if active {
            self.colorize("ACTIVE", |s| s.red().bold())
        } else {
            self.colorize("ok", |s| s.green())
        }
    }

    fn push_status(&self, output: &mut String, status: &HubStatus) {
        let water_alarm = status.water.alarm.is_some_and(|v| v != 0.0);
        let water_leak = status.water.leak1.is_some_and(|v| v != 0.0);

        output.push_str(&format!("{}\n", self.heading("Water")));
        output.push_str(&format!(
            "  alarm: {} ({})\n",
            format_value(status.water.alarm),
            self.flag(water_alarm)
        ));
        output.push_str(&format!(
            "  leak1: {} ({})\n",
            format_value(status.water.leak1),
            self.flag(water_leak)
        ));

        let valve = &status.valve;
        output.push_str(&format!("{}\n", self.heading("Valves")));
        output.push_str(&format!("  count: {}\n", format_value(valve.num_valves)));
        output.push_str(&format!("  control: {}\n", valve_label(valve.control)));
        for index in 1..=2u8 {
            let code = valve.status(index);
            let label = valve_label(code);
            let label = if label == "disconnected" {
                self.colorize(label, |s| s.yellow())
            } else {
                label.to_string()
            };
            output.push_str(&format!(
                "  valve {index}: {label} ({})\n",
                format_value(code)
            ));
        }

        output.push_str(&format!("{}\n", self.heading("Wireless")));
        if status.wireless.is_empty() {
            output.push_str("  no data\n");
        } else {
            for (key, value) in &status.wireless.values {
                output.push_str(&format!("  {key}: {}\n", format_value(Some(*value))));
            }
            if let Some(percent) = status.wireless.battery_percentage {
                output.push_str(&format!("  battery: {percent}%\n"));
            }
        }

        let device = &status.device;
        output.push_str(&format!("{}\n", self.heading("Device")));
        output.push_str(&format!(
            "  name: {}  firmware: {}  app version: {}\n",
            yes_no(device.has_name),
            yes_no(device.has_firmware),
            yes_no(device.has_app_version)
        ));
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn trend_line(trend: &Trend) -> String {
    match trend {
        Trend::NoData => "no data".to_string(),
        Trend::InsufficientData => "insufficient data".to_string(),
        Trend::Improving {
            current_rate,
            average_rate,
        } => format!("improving ({current_rate:.0}% vs {average_rate:.0}% average)"),
        Trend::Declining {
            current_rate,
            average_rate,
        } => format!("declining ({current_rate:.0}% vs {average_rate:.0}% average)"),
        Trend::Stable {
            current_rate,
            average_rate,
        } => format!("stable ({current_rate:.0}% vs {average_rate:.0}% average)"),
    }
}

impl OutputFormatter for TextFormatter {
    fn format_status(&self, status: &HubStatus) -> Result<String> {
        let mut output = String::new();
        self.push_status(&mut output, status);
        Ok(output)
    }

    fn format_snapshot(&self, snapshot: &PollSnapshot) -> Result<String> {
        let mut output = String::new();
        let stamp = snapshot
            .last_success
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());
        output.push_str(&format!(
            "[{stamp}] cycle {} interval {:.1}s{}\n",
            snapshot.cycles,
            snapshot.interval.as_secs_f64(),
            if snapshot.alarm_active {
                format!(" {}", self.colorize("ALARM", |s| s.red().bold()))
            } else {
                String::new()
            }
        ));

        match &snapshot.status {
            Some(status) => self.push_status(&mut output, status),
            None => output.push_str("  no data yet\n"),
        }

        let motion = snapshot.valve_motion;
        output.push_str(&format!(
            "  motion: valve 1 {:?}, valve 2 {:?}\n",
            motion[0], motion[1]
        ));
        for alarm in &snapshot.active_alarms {
            output.push_str(&format!(
                "  {} {} ({})\n",
                self.colorize("!", |s| s.red()),
                alarm.kind.title(),
                alarm.value
            ));
        }
        Ok(output)
    }

    fn format_sensors(&self, sensors: &DiscoveredSensors) -> Result<String> {
        if sensors.is_empty() {
            return Ok("No wireless sensors found\n".to_string());
        }
        let mut output = format!(
            "{}\n",
            self.heading(&format!("Discovered {} sensor(s)", sensors.len()))
        );
        for sensor in sensors.iter() {
            output.push_str(&format!(
                "  {}: {}\n",
                self.colorize(sensor.key.as_str(), |s| s.yellow()),
                sensor.status_line()
            ));
        }
        Ok(output)
    }

    fn format_probe(&self, probe: &DeviceProbe) -> Result<String> {
        if !probe.responded {
            return Ok(self.colorize("No response from hub\n", |s| s.red()));
        }
        let mut output = String::new();
        if let Some(name) = &probe.object_name {
            output.push_str(&format!("Object name: {name}\n"));
        }
        let list = |ids: &[u32]| {
            ids.iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        output.push_str(&format!("Candidates: {}\n", list(&probe.candidates)));
        output.push_str(&format!("Verified: {}\n", list(&probe.verified)));
        match probe.device_id() {
            Some(id) => output.push_str(&format!(
                "Device id: {}\n",
                self.colorize(&id.to_string(), |s| s.green().bold())
            )),
            None => output.push_str("Device id: not determined\n"),
        }
        Ok(output)
    }

    fn format_wireless_run(&self, run: &WirelessRun, trend: &Trend) -> Result<String> {
        let mut output = format!(
            "{} {:?} ({}/{} reads, {:.0}%)\n",
            self.heading("Wireless connectivity:"),
            run.connectivity,
            run.successful_reads,
            run.successful_reads + run.failed_reads,
            run.success_rate
        );
        for probe in &run.probes {
            let status = match probe.status {
                ProbeStatus::Success => self.colorize("ok", |s| s.green()),
                ProbeStatus::NoResponse => self.colorize("no response", |s| s.yellow()),
                ProbeStatus::ParseError => self.colorize("parse error", |s| s.yellow()),
                ProbeStatus::Error => self.colorize("error", |s| s.red()),
            };
            output.push_str(&format!(
                "  {} ({} {}): {status} {}",
                probe.key,
                probe.object_type,
                probe.instance,
                format_value(probe.value)
            ));
            if let Some(ms) = probe.response_time_ms {
                output.push_str(&format!(" in {ms}ms"));
            }
            if let Some(error) = &probe.error {
                output.push_str(&format!(" [{error}]"));
            }
            output.push('\n');
            if let Some(raw) = &probe.raw_response {
                output.push_str(&format!("    raw: {raw}\n"));
            }
        }
        output.push_str(&format!("Trend: {}\n", trend_line(trend)));
        Ok(output)
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let mut json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        json.push('\n');
        Ok(json)
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_status(&self, status: &HubStatus) -> Result<String> {
        self.render(status)
    }

    fn format_snapshot(&self, snapshot: &PollSnapshot) -> Result<String> {
        self.render(snapshot)
    }

    fn format_sensors(&self, sensors: &DiscoveredSensors) -> Result<String> {
        self.render(sensors)
    }

    fn format_probe(&self, probe: &DeviceProbe) -> Result<String> {
        self.render(probe)
    }

    fn format_wireless_run(&self, run: &WirelessRun, trend: &Trend) -> Result<String> {
        self.render(&serde_json::json!({ "run": run, "trend": trend }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waterguard_core::SensorKey;

    fn sample_status() -> HubStatus {
        let mut status = HubStatus::default();
        status.water.alarm = Some(1.0);
        status.water.leak1 = Some(0.0);
        status.valve.num_valves = Some(2.0);
        status.valve.control = Some(3.0);
        status.valve.status1 = Some(3.0);
        status.valve.status2 = Some(1087.0);
        status.wireless.set(SensorKey::Temperature, 21.5);
        status.wireless.battery_percentage = Some(57);
        status
    }

    #[test]
    fn test_text_status_without_color() {
        let output = TextFormatter::new(false)
            .format_status(&sample_status())
            .unwrap();
        assert!(output.contains("alarm: 1 (ACTIVE)"));
        assert!(output.contains("leak1: 0 (ok)"));
        assert!(output.contains("valve 1: open (3)"));
        assert!(output.contains("valve 2: disconnected (1087)"));
        assert!(output.contains("temperature: 21.50"));
        assert!(output.contains("battery: 57%"));
    }

    #[test]
    fn test_text_empty_wireless() {
        let output = TextFormatter::new(false)
            .format_status(&HubStatus::default())
            .unwrap();
        assert!(output.contains("no data"));
        assert!(output.contains("valve 1: - (-)"));
    }

    #[test]
    fn test_json_status_is_parseable() {
        let output = JsonFormatter::new(false)
            .format_status(&sample_status())
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["valve"]["status2"], 1087.0);
        assert_eq!(value["wireless"]["battery_percentage"], 57);
    }

    #[test]
    fn test_probe_without_response() {
        let output = TextFormatter::new(false)
            .format_probe(&DeviceProbe::default())
            .unwrap();
        assert_eq!(output, "No response from hub\n");
    }

    #[test]
    fn test_trend_line() {
        assert_eq!(trend_line(&Trend::NoData), "no data");
        assert_eq!(
            trend_line(&Trend::Declining {
                current_rate: 40.0,
                average_rate: 80.0
            }),
            "declining (40% vs 80% average)"
        );
    }
}
