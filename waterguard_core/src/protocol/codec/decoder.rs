//! Heuristic response decoder
//!
//! The hub's replies do not consistently follow the standard tag grammar, so
//! values are located by recognising a handful of fixed frame shapes and then
//! falling back to a tag search. The checks run in a fixed order:
//!
//! 1. frames shorter than the transport header are rejected
//! 2. the 23-byte water-sensor shape yields 0.0 / 1.0 from its state byte
//! 3. the error bit rejects the frame, except for the 0x17-length header family
//! 4. wireless analog frames yield the float at offset 18, checked per channel
//! 5. wired frames are searched for enumerated, unsigned, boolean and real tags
//!
//! Multi-state mapping is applied to enumerated and unsigned results.

use crate::protocol::MAX_PACKET_SIZE;
use crate::protocol::error::DecodeError;
use crate::protocol::objects::{ObjectId, ObjectType, SensorKey};

/// Length of the transport header every frame starts with
pub const HEADER_LEN: usize = 4;

/// Header shared by wireless and water-sensor frames
const WIRELESS_HEADER: [u8; 4] = [0x81, 0x0A, 0x00, 0x17];
const WATER_SENSOR_MARKER: [u8; 4] = [0x01, 0x00, 0x30, 0x01];
const WATER_SENSOR_LEN: usize = 23;
const WIRELESS_MIN_LEN: usize = 22;
const WIRELESS_FLOAT_OFFSET: usize = 18;

const ERROR_BIT: u8 = 0x02;
const ERROR_EXEMPT_LENGTH: u8 = 0x17;

const TAG_ENUMERATED: u8 = 0x91;
const TAG_UNSIGNED: u8 = 0x21;
const TAG_BOOLEAN: u8 = 0x10;
const TAG_REAL: u8 = 0x44;
const TAG_OBJECT_ID: u8 = 0x0C;
const TAG_CHARACTER_STRING: u8 = 0x75;

/// Two-byte unsigned values the hub uses as disconnection sentinels
pub const SENTINEL_NOT_CONNECTED: u16 = 319;
pub const SENTINEL_DISCONNECTED: u16 = 1087;

/// Multi-state output value reported when a valve command is not applicable
pub const NOT_APPLICABLE: f64 = 1.0;

const DEFAULT_REAL_RANGE: (f64, f64) = (-100.0, 10000.0);

/// What the caller asked for, which steers the heuristics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeContext {
    pub object_type: ObjectType,
    /// Wireless channel the request targeted, if any
    pub sensor: Option<SensorKey>,
    /// Plausible range for wired real values
    pub expected_range: Option<(f64, f64)>,
}

impl DecodeContext {
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            sensor: None,
            expected_range: None,
        }
    }

    pub fn with_sensor(mut self, sensor: SensorKey) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.expected_range = Some((min, max));
        self
    }
}

/// Extract the present value from a response frame
pub fn decode_present_value(data: &[u8], ctx: &DecodeContext) -> Result<f64, DecodeError> {
    let data = &data[..data.len().min(MAX_PACKET_SIZE)];
    if data.len() < HEADER_LEN {
        return Err(DecodeError::ShortFrame { len: data.len() });
    }

    if is_water_sensor_frame(data) {
        return Ok(water_sensor_state(data[19]));
    }

    if data[3] & ERROR_BIT != 0 && data[3] != ERROR_EXEMPT_LENGTH {
        return Err(DecodeError::ErrorResponse);
    }

    if ctx.object_type == ObjectType::AnalogInput && is_wireless_frame(data) {
        return decode_wireless_float(data, ctx.sensor);
    }

    decode_wired(data, ctx)
}

/// 23-byte leak sensor frame carrying a state byte instead of a float
pub fn is_water_sensor_frame(data: &[u8]) -> bool {
    data.len() == WATER_SENSOR_LEN
        && data[..4] == WIRELESS_HEADER
        && data[4..8] == WATER_SENSOR_MARKER
        && data[16..19] == [0x3E, TAG_REAL, 0x3F]
}

/// Frame with an application-tagged real at the fixed wireless offset
pub fn is_wireless_frame(data: &[u8]) -> bool {
    data.len() >= WIRELESS_MIN_LEN
        && data[..4] == WIRELESS_HEADER
        && data[16..18] == [0x3E, TAG_REAL]
}

fn water_sensor_state(byte: u8) -> f64 {
    match byte {
        0x80 => 1.0,
        _ => 0.0,
    }
}

fn decode_wireless_float(data: &[u8], sensor: Option<SensorKey>) -> Result<f64, DecodeError> {
    let value = read_f32(data, WIRELESS_FLOAT_OFFSET).ok_or(DecodeError::PatternMismatch)?;
    if !value.is_finite() {
        return Err(DecodeError::NonFinite);
    }

    let Some(key) = sensor else {
        return Ok(value);
    };

    if key.is_leak() {
        // Anything but an exact 0/1 reading is treated as dry
        return Ok(if value == 1.0 { 1.0 } else { 0.0 });
    }

    match key.decode_range() {
        Some((min, max)) if !(min..=max).contains(&value) => Err(DecodeError::range_violation(
            key.as_str(),
            value,
            min,
            max,
        )),
        _ => Ok(value),
    }
}

fn decode_wired(data: &[u8], ctx: &DecodeContext) -> Result<f64, DecodeError> {
    let body = &data[HEADER_LEN..];

    if let Some(i) = find_tag(body, TAG_ENUMERATED)
        && let Some(&value) = body.get(i + 1)
    {
        return Ok(apply_multi_state_mapping(value as f64, ctx.object_type));
    }

    if let Some(i) = find_tag(body, TAG_UNSIGNED)
        && let Some(&single) = body.get(i + 1)
    {
        let mut value = single as f64;
        if let Some(pair) = body.get(i + 1..i + 3) {
            let wide = u16::from_be_bytes([pair[0], pair[1]]);
            if wide == SENTINEL_NOT_CONNECTED || wide == SENTINEL_DISCONNECTED {
                value = wide as f64;
            }
        }
        return Ok(apply_multi_state_mapping(value, ctx.object_type));
    }

    if let Some(i) = find_tag(body, TAG_BOOLEAN)
        && let Some(&value) = body.get(i + 1)
    {
        return Ok(value as f64);
    }

    if let Some(i) = find_tag(body, TAG_REAL)
        && let Some(value) = read_f32(body, i + 1)
    {
        if !value.is_finite() {
            return Err(DecodeError::NonFinite);
        }
        let (min, max) = ctx.expected_range.unwrap_or(DEFAULT_REAL_RANGE);
        if !(min..=max).contains(&value) {
            return Err(DecodeError::range_violation(
                ctx.object_type.name(),
                value,
                min,
                max,
            ));
        }
        return Ok(value);
    }

    Err(DecodeError::PatternMismatch)
}

/// Normalise multi-state readings.
///
/// Outputs only report 0..=10; the "not connected" sentinel and anything out
/// of range become the not-applicable state. Inputs pass through so callers
/// can see the raw sentinels.
pub fn apply_multi_state_mapping(value: f64, object_type: ObjectType) -> f64 {
    match object_type {
        ObjectType::MultiStateOutput => {
            if value == SENTINEL_NOT_CONNECTED as f64 || !(0.0..=10.0).contains(&value) {
                NOT_APPLICABLE
            } else {
                value
            }
        }
        _ => value,
    }
}

/// True when the reply looks like a positive acknowledgement
pub fn is_positive_ack(data: &[u8]) -> bool {
    matches!(data.get(6), Some(0x30 | 0x60))
}

/// Collect the instances of every device object identifier in the frame
pub fn extract_object_instances(data: &[u8]) -> Vec<u32> {
    let mut instances = Vec::new();
    for (i, window) in data.windows(5).enumerate() {
        if data[i] != TAG_OBJECT_ID {
            continue;
        }
        let packed = u32::from_be_bytes([window[1], window[2], window[3], window[4]]);
        let (type_code, instance) = ObjectId::unpack(packed);
        if type_code == ObjectType::Device.code() && instance > 0 && !instances.contains(&instance)
        {
            instances.push(instance);
        }
    }
    instances
}

/// First character string in the frame, if any
pub fn extract_character_string(data: &[u8]) -> Option<String> {
    let i = find_tag(data, TAG_CHARACTER_STRING)?;
    let len = *data.get(i + 1)? as usize;
    // Length covers the encoding byte, which is dropped with the other control bytes
    let text = data.get(i + 2..i + 2 + len)?;
    let text: String = text
        .iter()
        .filter(|b| b.is_ascii() && !b.is_ascii_control())
        .map(|&b| b as char)
        .collect();
    (!text.is_empty()).then_some(text)
}

fn find_tag(data: &[u8], tag: u8) -> Option<usize> {
    data.iter().position(|&b| b == tag)
}

fn read_f32(data: &[u8], offset: usize) -> Option<f64> {
    let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
    Some(f32::from_be_bytes(bytes) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wired(tail: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x81, 0x0A, 0x00, 0x00, 0x01, 0x00, 0x30, 0x01, 0x0C];
        frame.extend_from_slice(tail);
        // Keep the length byte clear of the error bit
        if frame.len() & 0x02 != 0 {
            frame.extend_from_slice(&[0x00, 0x00]);
        }
        let len = frame.len() as u16;
        frame[2..4].copy_from_slice(&len.to_be_bytes());
        frame
    }

    fn wireless(value: f32) -> Vec<u8> {
        let mut frame = vec![
            0x81, 0x0A, 0x00, 0x17, 0x01, 0x00, 0x30, 0x01, 0x0C, 0x0C, 0x00, 0x00, 0x00, 0x0D,
            0x19, 0x55, 0x3E, 0x44,
        ];
        frame.extend_from_slice(&value.to_be_bytes());
        frame.push(0x3F);
        frame
    }

    fn water_sensor(state: u8) -> Vec<u8> {
        let mut frame = vec![
            0x81, 0x0A, 0x00, 0x17, 0x01, 0x00, 0x30, 0x01, 0x0C, 0x0C, 0x00, 0x00, 0x00, 0x0B,
            0x19, 0x55, 0x3E, 0x44, 0x3F,
        ];
        frame.extend_from_slice(&[state, 0x00, 0x00, 0x3F]);
        frame
    }

    #[test]
    fn test_short_frame() {
        let ctx = DecodeContext::new(ObjectType::AnalogInput);
        assert_eq!(
            decode_present_value(&[0x81, 0x0A], &ctx),
            Err(DecodeError::ShortFrame { len: 2 })
        );
    }

    #[test]
    fn test_water_sensor_shape() {
        let ctx = DecodeContext::new(ObjectType::AnalogInput);
        assert_eq!(decode_present_value(&water_sensor(0x80), &ctx), Ok(1.0));
        assert_eq!(decode_present_value(&water_sensor(0x00), &ctx), Ok(0.0));
        assert_eq!(decode_present_value(&water_sensor(0x42), &ctx), Ok(0.0));

        // Matches regardless of the requested type
        let ctx = DecodeContext::new(ObjectType::MultiStateInput);
        assert_eq!(decode_present_value(&water_sensor(0x80), &ctx), Ok(1.0));
    }

    #[test]
    fn test_error_bit_rejects_wired_frame() {
        let mut frame = wired(&[0x3E, 0x21, 0x02, 0x3F]);
        frame[3] = 0x12;
        let ctx = DecodeContext::new(ObjectType::MultiStateInput);
        assert_eq!(
            decode_present_value(&frame, &ctx),
            Err(DecodeError::ErrorResponse)
        );
    }

    #[test]
    fn test_unsigned_valve_count() {
        let frame = wired(&[0x0C, 0x03, 0x40, 0x00, 0x03, 0x19, 0x55, 0x3E, 0x21, 0x02, 0x3F]);
        let ctx = DecodeContext::new(ObjectType::MultiStateInput);
        assert_eq!(decode_present_value(&frame, &ctx), Ok(2.0));
    }

    #[test]
    fn test_unsigned_sentinels_preferred() {
        let ctx = DecodeContext::new(ObjectType::MultiStateInput);
        let frame = wired(&[0x3E, 0x21, 0x01, 0x3F]);
        assert_eq!(decode_present_value(&frame, &ctx), Ok(319.0));

        let frame = wired(&[0x3E, 0x21, 0x04, 0x3F]);
        assert_eq!(decode_present_value(&frame, &ctx), Ok(1087.0));

        let frame = wired(&[0x3E, 0x21, 0x03, 0x3F]);
        assert_eq!(decode_present_value(&frame, &ctx), Ok(3.0));
    }

    #[test]
    fn test_enumerated_and_boolean() {
        let ctx = DecodeContext::new(ObjectType::MultiStateInput);
        assert_eq!(decode_present_value(&wired(&[0x91, 0x05]), &ctx), Ok(5.0));

        let ctx = DecodeContext::new(ObjectType::BinaryInput);
        assert_eq!(decode_present_value(&wired(&[0x10, 0x01]), &ctx), Ok(1.0));
    }

    #[test]
    fn test_wired_real_range() {
        let mut tail = vec![0x3E, 0x44];
        tail.extend_from_slice(&22.5f32.to_be_bytes());
        tail.push(0x3F);
        let frame = wired(&tail);

        let ctx = DecodeContext::new(ObjectType::AnalogValue);
        assert_eq!(decode_present_value(&frame, &ctx), Ok(22.5));

        let ctx = DecodeContext::new(ObjectType::AnalogValue).with_range(0.0, 10.0);
        assert!(matches!(
            decode_present_value(&frame, &ctx),
            Err(DecodeError::RangeViolation { .. })
        ));

        let mut tail = vec![0x3E, 0x44];
        tail.extend_from_slice(&f32::NAN.to_be_bytes());
        let ctx = DecodeContext::new(ObjectType::AnalogValue);
        assert_eq!(
            decode_present_value(&wired(&tail), &ctx),
            Err(DecodeError::NonFinite)
        );
    }

    #[test]
    fn test_pattern_mismatch() {
        let ctx = DecodeContext::new(ObjectType::MultiStateInput);
        assert_eq!(
            decode_present_value(&wired(&[0x3E, 0x3F]), &ctx),
            Err(DecodeError::PatternMismatch)
        );
    }

    #[test]
    fn test_wireless_leak_coercion() {
        let ctx = DecodeContext::new(ObjectType::AnalogInput).with_sensor(SensorKey::Leak1);
        // 1.0 in a 23-byte frame also matches the water-sensor shape
        assert_eq!(decode_present_value(&wireless(1.0), &ctx), Ok(1.0));
        assert_eq!(decode_present_value(&wireless(0.37), &ctx), Ok(0.0));
        assert_eq!(decode_present_value(&wireless(0.0), &ctx), Ok(0.0));
    }

    #[test]
    fn test_wireless_range_checks() {
        let ctx = DecodeContext::new(ObjectType::AnalogInput).with_sensor(SensorKey::Temperature);
        let value = decode_present_value(&wireless(21.5), &ctx).unwrap();
        assert!((value - 21.5).abs() < 1e-6);
        assert!(matches!(
            decode_present_value(&wireless(150.0), &ctx),
            Err(DecodeError::RangeViolation { .. })
        ));

        let ctx =
            DecodeContext::new(ObjectType::AnalogInput).with_sensor(SensorKey::BatteryVoltage);
        assert!(decode_present_value(&wireless(3.1), &ctx).is_ok());
        assert!(decode_present_value(&wireless(4.5), &ctx).is_err());

        let ctx = DecodeContext::new(ObjectType::AnalogInput).with_sensor(SensorKey::Humidity);
        assert_eq!(
            decode_present_value(&wireless(f32::INFINITY), &ctx),
            Err(DecodeError::NonFinite)
        );
    }

    #[test]
    fn test_multi_state_mapping() {
        assert_eq!(
            apply_multi_state_mapping(319.0, ObjectType::MultiStateOutput),
            NOT_APPLICABLE
        );
        assert_eq!(
            apply_multi_state_mapping(42.0, ObjectType::MultiStateOutput),
            NOT_APPLICABLE
        );
        assert_eq!(apply_multi_state_mapping(3.0, ObjectType::MultiStateOutput), 3.0);
        assert_eq!(apply_multi_state_mapping(319.0, ObjectType::MultiStateInput), 319.0);
    }

    #[test]
    fn test_device_probe_helpers() {
        let mut reply = vec![0x81, 0x0A, 0x00, 0x00, 0x01, 0x00, 0x30, 0x01, 0x0C];
        reply.extend_from_slice(&[0x0C, 0x02, 0x00, 0x04, 0xD2]);
        reply.extend_from_slice(&[0x19, 0x4D, 0x3E, 0x75, 0x09, 0x00]);
        reply.extend_from_slice(b"Linkbox1\x3F");

        assert!(is_positive_ack(&reply));
        assert_eq!(extract_object_instances(&reply), vec![1234]);
        assert_eq!(extract_character_string(&reply).as_deref(), Some("Linkbox1"));
        assert!(!is_positive_ack(&[0x81, 0x0A, 0x00, 0x09, 0x01, 0x00, 0x50]));
    }
}
