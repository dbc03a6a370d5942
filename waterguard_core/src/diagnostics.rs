//! Diagnostic reports
//!
//! [`DiagnosticsReport`] is a serialisable dump of everything the coordinator
//! knows. [`WirelessDiagnostic`] probes each wireless object directly and
//! keeps a short history of runs so connectivity trends can be spotted.

use crate::cache::Reading;
use crate::config::{HubConfig, PollConfig};
use crate::coordinator::PollSnapshot;
use crate::protocol::codec::{DecodeContext, hex};
use crate::protocol::error::Result;
use crate::protocol::{
    DEFAULT_RETRIES, DeviceClient, ObjectType, PROP_PRESENT_VALUE, SensorKey, TransportStats,
};
use crate::state_machine::StateMachineInfo;
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

/// Runs kept for trend analysis
pub const HISTORY_LEN: usize = 10;

/// Success rate change (in percentage points) that counts as a trend
const TREND_THRESHOLD: f64 = 10.0;

/// Everything the coordinator can report about itself
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub generated_at: DateTime<Utc>,
    pub hub: HubConfig,
    pub poll: PollConfig,
    pub snapshot: PollSnapshot,
    pub cache: BTreeMap<String, usize>,
    pub latest: BTreeMap<String, Reading>,
    pub state_machine: StateMachineInfo,
    pub transport: TransportStats,
    pub wireless_sensors: BTreeMap<SensorKey, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Success,
    NoResponse,
    ParseError,
    Error,
}

/// Result of reading one wireless object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorProbe {
    pub key: SensorKey,
    pub object_type: ObjectType,
    pub instance: u32,
    pub status: ProbeStatus,
    pub value: Option<f64>,
    pub error: Option<String>,
    pub response_time_ms: Option<u64>,
    pub raw_response: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    NoConnectivity,
    PartialConnectivity,
    FullConnectivity,
}

impl Connectivity {
    pub fn classify(successes: usize, total: usize) -> Self {
        if successes == 0 {
            Self::NoConnectivity
        } else if successes == total {
            Self::FullConnectivity
        } else {
            Self::PartialConnectivity
        }
    }
}

/// One full wireless diagnostic run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WirelessRun {
    pub timestamp: DateTime<Utc>,
    pub connectivity: Connectivity,
    pub successful_reads: usize,
    pub failed_reads: usize,
    pub success_rate: f64,
    pub probes: Vec<SensorProbe>,
}

impl WirelessRun {
    pub fn from_probes(probes: Vec<SensorProbe>, timestamp: DateTime<Utc>) -> Self {
        let total = probes.len();
        let successful_reads = probes
            .iter()
            .filter(|p| p.status == ProbeStatus::Success)
            .count();
        let success_rate = if total == 0 {
            0.0
        } else {
            successful_reads as f64 / total as f64 * 100.0
        };
        Self {
            timestamp,
            connectivity: Connectivity::classify(successful_reads, total),
            successful_reads,
            failed_reads: total - successful_reads,
            success_rate,
            probes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "trend")]
pub enum Trend {
    NoData,
    InsufficientData,
    Improving { current_rate: f64, average_rate: f64 },
    Declining { current_rate: f64, average_rate: f64 },
    Stable { current_rate: f64, average_rate: f64 },
}

/// Plausible values for a direct diagnostic read
fn diagnostic_range(key: SensorKey) -> (f64, f64) {
    match key {
        SensorKey::Leak1 | SensorKey::Leak2 => (0.0, 1.0),
        SensorKey::Temperature => (-40.0, 85.0),
        SensorKey::Humidity => (0.0, 100.0),
        SensorKey::BatteryVoltage => (1.5, 4.0),
    }
}

async fn probe_sensor(client: &DeviceClient, key: SensorKey) -> SensorProbe {
    let object = key.object_id();
    let mut probe = SensorProbe {
        key,
        object_type: object.object_type,
        instance: object.instance,
        status: ProbeStatus::NoResponse,
        value: None,
        error: None,
        response_time_ms: None,
        raw_response: None,
    };

    let started = Instant::now();
    let response = client
        .read_raw(object, PROP_PRESENT_VALUE, DEFAULT_RETRIES)
        .await;
    probe.response_time_ms = Some(started.elapsed().as_millis() as u64);

    match response {
        Ok(Some(data)) => {
            probe.raw_response = Some(hex(&data));
            let (min, max) = diagnostic_range(key);
            let ctx = DecodeContext::new(object.object_type)
                .with_sensor(key)
                .with_range(min, max);
            match client.decode(&data, &ctx) {
                Ok(value) => {
                    probe.status = ProbeStatus::Success;
                    probe.value = Some(value);
                }
                Err(e) => {
                    probe.status = ProbeStatus::ParseError;
                    probe.error = Some(e.to_string());
                }
            }
        }
        Ok(None) => probe.error = Some("No response from sensor".to_string()),
        Err(e) => {
            probe.status = ProbeStatus::Error;
            probe.error = Some(e.to_string());
        }
    }
    probe
}

/// Direct connectivity test of the wireless objects with run history
#[derive(Debug, Clone, Default)]
pub struct WirelessDiagnostic {
    history: VecDeque<WirelessRun>,
}

impl WirelessDiagnostic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe every wireless object once and record the run
    pub async fn run(&mut self, client: &DeviceClient) -> Result<WirelessRun> {
        info!("Starting wireless sensor connectivity test");
        let mut probes = Vec::with_capacity(SensorKey::ALL.len());
        for key in SensorKey::ALL {
            probes.push(probe_sensor(client, key).await);
        }

        let run = WirelessRun::from_probes(probes, Utc::now());
        info!(
            "Wireless connectivity: {:?} ({}/{} sensors)",
            run.connectivity,
            run.successful_reads,
            run.probes.len()
        );
        self.record(run.clone());
        Ok(run)
    }

    pub fn record(&mut self, run: WirelessRun) {
        self.history.push_back(run);
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &WirelessRun> {
        self.history.iter()
    }

    pub fn last_run(&self) -> Option<&WirelessRun> {
        self.history.back()
    }

    /// Compare the last three runs against the ones before them
    pub fn trend(&self) -> Trend {
        let rates: Vec<f64> = self.history.iter().map(|run| run.success_rate).collect();
        let Some(&current_rate) = rates.last() else {
            return Trend::NoData;
        };
        if rates.len() < 2 {
            return Trend::InsufficientData;
        }

        let average_rate = rates.iter().sum::<f64>() / rates.len() as f64;
        let split = rates.len().saturating_sub(3);
        let recent = &rates[split..];
        let avg_recent = if rates.len() >= 3 {
            recent.iter().sum::<f64>() / recent.len() as f64
        } else {
            current_rate
        };
        let avg_older = rates[..split].iter().sum::<f64>() / split.max(1) as f64;

        if avg_recent > avg_older + TREND_THRESHOLD {
            Trend::Improving {
                current_rate,
                average_rate,
            }
        } else if avg_recent < avg_older - TREND_THRESHOLD {
            Trend::Declining {
                current_rate,
                average_rate,
            }
        } else {
            Trend::Stable {
                current_rate,
                average_rate,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(status: ProbeStatus) -> SensorProbe {
        SensorProbe {
            key: SensorKey::Temperature,
            object_type: ObjectType::AnalogInput,
            instance: 13,
            status,
            value: None,
            error: None,
            response_time_ms: None,
            raw_response: None,
        }
    }

    fn run_with_rate(successes: usize) -> WirelessRun {
        let probes = (0..5)
            .map(|i| {
                if i < successes {
                    probe(ProbeStatus::Success)
                } else {
                    probe(ProbeStatus::NoResponse)
                }
            })
            .collect();
        WirelessRun::from_probes(probes, Utc::now())
    }

    #[test]
    fn test_connectivity_classification() {
        assert_eq!(run_with_rate(0).connectivity, Connectivity::NoConnectivity);
        assert_eq!(run_with_rate(5).connectivity, Connectivity::FullConnectivity);

        let run = run_with_rate(2);
        assert_eq!(run.connectivity, Connectivity::PartialConnectivity);
        assert_eq!(run.success_rate, 40.0);
        assert_eq!(run.failed_reads, 3);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut diag = WirelessDiagnostic::new();
        for _ in 0..15 {
            diag.record(run_with_rate(1));
        }
        assert_eq!(diag.history().count(), HISTORY_LEN);
    }

    #[test]
    fn test_trend() {
        let mut diag = WirelessDiagnostic::new();
        assert_eq!(diag.trend(), Trend::NoData);

        diag.record(run_with_rate(0));
        assert_eq!(diag.trend(), Trend::InsufficientData);

        diag.record(run_with_rate(0));
        diag.record(run_with_rate(5));
        diag.record(run_with_rate(5));
        diag.record(run_with_rate(5));
        assert!(matches!(diag.trend(), Trend::Improving { current_rate, .. } if current_rate == 100.0));

        for _ in 0..3 {
            diag.record(run_with_rate(1));
        }
        assert!(matches!(diag.trend(), Trend::Declining { .. }));

        let mut steady = WirelessDiagnostic::new();
        for _ in 0..4 {
            steady.record(run_with_rate(3));
        }
        assert!(matches!(steady.trend(), Trend::Stable { average_rate, .. } if average_rate == 60.0));
    }
}
