//! High-level hub client
//!
//! Composes the codec and a transport into the semantic operations the rest
//! of the crate needs. Read failures never abort an operation: a request that
//! gets no reply, or a reply that cannot be decoded, simply leaves the
//! corresponding field empty. Only errors that retrying cannot fix (bad
//! encoding, unresolvable host) are returned.

use crate::error::ValidationError;
use crate::protocol::codec::{Codec, DecodeContext, SENTINEL_NOT_CONNECTED, WriteValue, hex};
use crate::protocol::error::{DecodeError, Result};
use crate::protocol::objects::{self, ObjectId, ObjectType, SensorKey, valve, water};
use crate::protocol::status::{DeviceInfo, HubStatus, ValveStatus, WaterStatus, WirelessReading};
use crate::protocol::transport::{Transport, TransportConfig, TransportStats, UdpTransport};
use crate::protocol::{
    DEFAULT_RETRIES, PROP_APPLICATION_VERSION, PROP_FIRMWARE_REVISION, PROP_OBJECT_NAME,
    PROP_PRESENT_VALUE, RESET_RETRIES,
};
use bytes::Bytes;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Retries used when reading an already discovered wireless sensor
pub const WIRELESS_READ_RETRIES: u32 = 3;

/// Unforced wireless reads only hit the hub on every Nth call
pub const WIRELESS_READ_EVERY: u64 = 3;

/// Unforced reads fall back to the fixed wireless objects on every Nth call
pub const HUB_FALLBACK_EVERY: u64 = 6;

/// Value written to the reset object to clear a water alarm
pub const DEFAULT_RESET_VALUE: u32 = 2;

/// Valve commands accepted by the control object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveAction {
    Open,
    Close,
    NotApplicable,
}

impl ValveAction {
    /// Value written to the control object
    pub fn value(self) -> u32 {
        match self {
            Self::Open => 3,
            Self::Close => 2,
            Self::NotApplicable => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::NotApplicable => "n/a",
        }
    }
}

impl fmt::Display for ValveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValveAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "close" => Ok(Self::Close),
            "n/a" => Ok(Self::NotApplicable),
            _ => Err(ValidationError::invalid_valve_action(s)),
        }
    }
}

/// Whether a discovered sensor reports measurements or only presence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorDataType {
    Analog,
    Status,
}

/// A wireless channel found during discovery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredSensor {
    pub key: SensorKey,
    pub object_type: ObjectType,
    pub instance: u32,
    pub data_type: SensorDataType,
    pub last_value: f64,
}

impl DiscoveredSensor {
    pub fn object_id(&self) -> ObjectId {
        ObjectId::new(self.object_type, self.instance)
    }

    /// One-line summary distinguishing real data from status-only data
    pub fn status_line(&self) -> String {
        let source = self.object_id();
        match self.data_type {
            SensorDataType::Analog if self.key.is_leak() => {
                format!("ACTIVE: {} (from {source})", self.last_value)
            }
            SensorDataType::Analog => format!("REAL DATA: {} (from {source})", self.last_value),
            SensorDataType::Status => format!(
                "STATUS ONLY: {} (from {source}) - waiting for real data",
                self.last_value
            ),
        }
    }
}

/// Discovered sensors keyed by channel
///
/// Analog entries are never replaced by status-only entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscoveredSensors(BTreeMap<SensorKey, DiscoveredSensor>);

impl DiscoveredSensors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sensor, returning false if it would downgrade an analog entry
    pub fn record(&mut self, sensor: DiscoveredSensor) -> bool {
        if let Some(existing) = self.0.get(&sensor.key)
            && existing.data_type == SensorDataType::Analog
            && sensor.data_type == SensorDataType::Status
        {
            return false;
        }
        self.0.insert(sensor.key, sensor);
        true
    }

    pub fn get(&self, key: SensorKey) -> Option<&DiscoveredSensor> {
        self.0.get(&key)
    }

    pub fn contains(&self, key: SensorKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredSensor> {
        self.0.values()
    }

    pub fn count(&self, data_type: SensorDataType) -> usize {
        self.iter().filter(|s| s.data_type == data_type).count()
    }

    /// Values seen during discovery, as a wireless reading
    pub fn values(&self) -> WirelessReading {
        let mut reading = WirelessReading::default();
        for sensor in self.iter() {
            reading.set(sensor.key, sensor.last_value);
        }
        reading.refresh_battery();
        reading
    }
}

/// Map the hub's raw valve count to a real number of valves.
///
/// 2 means one valve, 3 means two, 319 means the valve system is disconnected.
pub fn remap_valve_count(raw: f64) -> f64 {
    if raw == 2.0 {
        1.0
    } else if raw == 3.0 {
        2.0
    } else if raw == SENTINEL_NOT_CONNECTED as f64 {
        0.0
    } else {
        raw
    }
}

const BATTERY_FULL_V: f64 = 3.3;
const BATTERY_EMPTY_V: f64 = 2.2;
const BATTERY_SPAN_V: f64 = 1.1;

/// Battery percentage from cell voltage, interpolated between 2.2V (15%) and 3.3V (100%)
pub fn battery_percentage(voltage: f64) -> u8 {
    if voltage >= BATTERY_FULL_V {
        100
    } else if voltage <= BATTERY_EMPTY_V {
        15
    } else {
        (15.0 + (voltage - BATTERY_EMPTY_V) / BATTERY_SPAN_V * 85.0).round() as u8
    }
}

#[derive(Debug, Default)]
struct WirelessSession {
    discovered: DiscoveredSensors,
    attempts: u64,
    last_data: WirelessReading,
}

/// Client for a single Waterguard hub
pub struct DeviceClient {
    transport: Arc<dyn Transport>,
    codec: Codec,
    device_id: u32,
    wireless: Mutex<WirelessSession>,
}

impl DeviceClient {
    /// Create a client on top of an existing transport
    pub fn new(transport: Arc<dyn Transport>, device_id: u32) -> Self {
        Self {
            transport,
            codec: Codec::new(),
            device_id,
            wireless: Mutex::new(WirelessSession::default()),
        }
    }

    /// Create a client talking UDP to the configured hub
    pub fn with_udp(config: TransportConfig, device_id: u32) -> Self {
        Self::new(Arc::new(UdpTransport::new(config)), device_id)
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub async fn transport_stats(&self) -> TransportStats {
        self.transport.stats().await
    }

    /// Send a raw request; transient failures become `None`
    pub async fn request(&self, packet: &[u8], retries: u32) -> Result<Option<Bytes>> {
        match self.transport.send_request(packet, retries).await {
            Ok(response) => Ok(Some(response)),
            Err(e) if e.is_transient() => {
                debug!("Request got no usable reply: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Read one property and return the raw reply
    pub async fn read_raw(
        &self,
        object: ObjectId,
        property_id: u32,
        retries: u32,
    ) -> Result<Option<Bytes>> {
        let packet = self.codec.read_property(object, property_id)?;
        self.request(&packet, retries).await
    }

    /// Decode a reply with the client's codec
    pub fn decode(&self, data: &[u8], ctx: &DecodeContext) -> std::result::Result<f64, DecodeError> {
        self.codec.decode(data, ctx)
    }

    async fn read_value(
        &self,
        object: ObjectId,
        ctx: DecodeContext,
        retries: u32,
    ) -> Result<Option<f64>> {
        let Some(response) = self.read_raw(object, PROP_PRESENT_VALUE, retries).await? else {
            debug!("{object}: no response received");
            return Ok(None);
        };
        match self.decode(&response, &ctx) {
            Ok(value) => {
                trace!("{object} = {value}");
                Ok(Some(value))
            }
            Err(e) => {
                debug!("{object}: {e} ({})", hex(&response));
                Ok(None)
            }
        }
    }

    async fn write_value(
        &self,
        object: ObjectId,
        value: impl Into<WriteValue>,
        retries: u32,
    ) -> Result<bool> {
        let packet = self.codec.write_property(object, PROP_PRESENT_VALUE, value)?;
        Ok(self.request(&packet, retries).await?.is_some())
    }

    /// Check that the hub answers a device name read
    pub async fn test_connection(&self) -> Result<bool> {
        let response = self
            .read_raw(objects::device(self.device_id), PROP_OBJECT_NAME, DEFAULT_RETRIES)
            .await?;
        Ok(response.is_some())
    }

    /// Read the wired alarm and leak values
    pub async fn read_water_status(&self) -> Result<WaterStatus> {
        let alarm_ctx = DecodeContext::new(ObjectType::AnalogInput).with_range(0.0, 1.0);
        Ok(WaterStatus {
            alarm: self.read_value(water::ALARM, alarm_ctx, DEFAULT_RETRIES).await?,
            leak1: self.read_value(water::LEAK1, alarm_ctx, DEFAULT_RETRIES).await?,
        })
    }

    /// Read the valve count, control state and the statuses the count implies
    pub async fn read_valve_status(&self) -> Result<ValveStatus> {
        let mut status = ValveStatus::default();

        let count_ctx = DecodeContext::new(valve::NUM_VALVES.object_type);
        status.raw_num_valves = self
            .read_value(valve::NUM_VALVES, count_ctx, DEFAULT_RETRIES)
            .await?;
        status.num_valves = status.raw_num_valves.map(remap_valve_count);

        let control_ctx = DecodeContext::new(valve::CONTROL.object_type);
        status.control = self
            .read_value(valve::CONTROL, control_ctx, DEFAULT_RETRIES)
            .await?;

        let count = status.valve_count();
        let status_ctx = DecodeContext::new(ObjectType::MultiStateInput);
        if count >= 1 {
            status.status1 = self
                .read_value(valve::STATUS1, status_ctx, DEFAULT_RETRIES)
                .await?;
        }
        if count >= 2 {
            status.status2 = self
                .read_value(valve::STATUS2, status_ctx, DEFAULT_RETRIES)
                .await?;
        }

        debug!("Valve status: {status:?}");
        Ok(status)
    }

    /// Probe which identity properties the device object answers for
    pub async fn read_device_info(&self) -> Result<DeviceInfo> {
        let device = objects::device(self.device_id);
        Ok(DeviceInfo {
            has_name: self
                .read_raw(device, PROP_OBJECT_NAME, DEFAULT_RETRIES)
                .await?
                .is_some(),
            has_firmware: self
                .read_raw(device, PROP_FIRMWARE_REVISION, DEFAULT_RETRIES)
                .await?
                .is_some(),
            has_app_version: self
                .read_raw(device, PROP_APPLICATION_VERSION, DEFAULT_RETRIES)
                .await?
                .is_some(),
        })
    }

    /// Command the valves; any reply counts as success
    pub async fn control_valve(&self, action: ValveAction) -> Result<bool> {
        info!("Sending valve command '{action}' ({})", action.value());
        let ok = self
            .write_value(valve::CONTROL, action.value(), DEFAULT_RETRIES)
            .await?;
        if !ok {
            warn!("Valve command '{action}' got no response");
        }
        Ok(ok)
    }

    /// Clear the water alarm by writing to the reset object
    pub async fn reset_alarm(&self, value: u32) -> Result<bool> {
        info!("Resetting water alarm with value {value}");
        let ok = self
            .write_value(water::RESET_LEAK, value, RESET_RETRIES)
            .await?;
        if !ok {
            warn!("Water alarm reset got no response");
        }
        Ok(ok)
    }

    /// Scan instances 11-15, analog inputs first, then multi-state inputs
    pub async fn discover_wireless_sensors(&self) -> Result<DiscoveredSensors> {
        let mut session = self.wireless.lock().await;
        self.discover_locked(&mut session).await
    }

    async fn discover_locked(&self, session: &mut WirelessSession) -> Result<DiscoveredSensors> {
        info!("Starting wireless sensor discovery");
        let mut found = DiscoveredSensors::new();

        for object_type in [ObjectType::AnalogInput, ObjectType::MultiStateInput] {
            for key in SensorKey::ALL {
                if found.contains(key) {
                    trace!("Skipping {key} at {object_type:?}, already found");
                    continue;
                }

                let (min, max) = key.discovery_range(object_type);
                let ctx = DecodeContext::new(object_type)
                    .with_sensor(key)
                    .with_range(min, max);
                let object = ObjectId::new(object_type, key.instance());
                let Some(value) = self.read_value(object, ctx, DEFAULT_RETRIES).await? else {
                    continue;
                };

                if !(min..=max).contains(&value) {
                    debug!("{key} at {object}: {value} outside {min}..={max}");
                    continue;
                }

                let data_type = match object_type {
                    ObjectType::AnalogInput => SensorDataType::Analog,
                    _ => {
                        // A bare 1.0 on a status object is just "online"
                        if value == 1.0 && !key.is_leak() {
                            debug!("Skipping likely status value for {key} at {object}");
                            continue;
                        }
                        SensorDataType::Status
                    }
                };

                debug!("Found wireless {key} at {object} = {value} ({data_type:?})");
                found.record(DiscoveredSensor {
                    key,
                    object_type,
                    instance: key.instance(),
                    data_type,
                    last_value: value,
                });
            }
        }

        if found.is_empty() {
            info!("No wireless sensors discovered; they may be asleep or absent");
        } else {
            info!(
                "Wireless discovery found {} sensors ({} analog, {} status)",
                found.len(),
                found.count(SensorDataType::Analog),
                found.count(SensorDataType::Status)
            );
        }

        session.discovered = found.clone();
        Ok(found)
    }

    /// Read every discovered sensor once
    pub async fn get_wireless_sensor_values(&self) -> Result<WirelessReading> {
        let mut session = self.wireless.lock().await;
        self.read_discovered_locked(&mut session).await
    }

    async fn read_discovered_locked(&self, session: &mut WirelessSession) -> Result<WirelessReading> {
        let mut reading = WirelessReading::default();
        let sensors: Vec<DiscoveredSensor> = session.discovered.iter().cloned().collect();

        for sensor in sensors {
            let (min, max) = sensor.key.expected_range();
            let ctx = DecodeContext::new(sensor.object_type)
                .with_sensor(sensor.key)
                .with_range(min, max);
            if let Some(value) = self
                .read_value(sensor.object_id(), ctx, WIRELESS_READ_RETRIES)
                .await?
            {
                reading.set(sensor.key, value);
                session.discovered.record(DiscoveredSensor {
                    last_value: value,
                    ..sensor
                });
            }
        }

        reading.refresh_battery();
        Ok(reading)
    }

    /// Read the fixed wireless analog objects directly
    pub async fn read_wireless_from_hub(&self) -> Result<WirelessReading> {
        let mut reading = WirelessReading::default();
        for key in SensorKey::ALL {
            let (min, max) = key.expected_range();
            let ctx = DecodeContext::new(ObjectType::AnalogInput)
                .with_sensor(key)
                .with_range(min, max);
            if let Some(value) = self.read_value(key.object_id(), ctx, DEFAULT_RETRIES).await? {
                reading.set(key, value);
            }
        }
        reading.refresh_battery();
        Ok(reading)
    }

    /// Read wireless sensors, respecting their intermittent availability.
    ///
    /// Unforced calls only reach the hub on every third call and otherwise
    /// return the last result. A forced read that finds nothing runs a full
    /// rediscovery and reports the values seen during the scan.
    pub async fn read_wireless_sensors(&self, force: bool) -> Result<WirelessReading> {
        let mut session = self.wireless.lock().await;
        session.attempts += 1;
        let attempts = session.attempts;

        if !force && attempts % WIRELESS_READ_EVERY != 0 {
            trace!("Skipping wireless read (attempt {attempts})");
            return Ok(session.last_data.clone());
        }

        let mut reading = if session.discovered.is_empty() {
            WirelessReading::default()
        } else {
            self.read_discovered_locked(&mut session).await?
        };

        if reading.is_empty() && (force || attempts % HUB_FALLBACK_EVERY == 0) {
            debug!("No data from discovered sensors, reading wireless objects directly");
            reading = self.read_wireless_from_hub().await?;
        }

        if reading.is_empty() && force {
            debug!("Forced wireless read found nothing, rescanning");
            reading = self.discover_locked(&mut session).await?.values();
        }

        reading.refresh_battery();
        if reading.is_empty() {
            debug!("No wireless sensors responding");
        } else {
            debug!("Read {} wireless values", reading.len());
        }
        session.last_data = reading.clone();
        Ok(reading)
    }

    /// Read everything the hub exposes
    pub async fn get_all_status(&self, force_wireless: bool) -> Result<HubStatus> {
        Ok(HubStatus {
            water: self.read_water_status().await?,
            valve: self.read_valve_status().await?,
            device: self.read_device_info().await?,
            wireless: self.read_wireless_sensors(force_wireless).await?,
        })
    }

    pub async fn discovered_sensors(&self) -> DiscoveredSensors {
        self.wireless.lock().await.discovered.clone()
    }

    /// Last wireless result, without touching the hub
    pub async fn last_wireless_data(&self) -> WirelessReading {
        self.wireless.lock().await.last_data.clone()
    }

    /// Seed the last wireless result, e.g. with values seen during discovery
    pub async fn seed_wireless_data(&self, reading: WirelessReading) {
        self.wireless.lock().await.last_data = reading;
    }

    /// Per-sensor report of what discovery found
    pub async fn wireless_sensor_status(&self) -> BTreeMap<SensorKey, String> {
        self.wireless
            .lock()
            .await
            .discovered
            .iter()
            .map(|sensor| (sensor.key, sensor.status_line()))
            .collect()
    }
}
