//! Response frame builders
//!
//! Frames mirror what hubs send back closely enough for the heuristic
//! decoder. Wired frames are padded so their length byte never carries the
//! error bit.

use bytes::{BufMut, Bytes, BytesMut};
use waterguard_core::protocol::{ObjectId, ObjectType};

const HEADER: [u8; 2] = [0x81, 0x0A];
const ACK_BODY: [u8; 4] = [0x01, 0x00, 0x30, 0x01];
const ERROR_BIT: u8 = 0x02;

fn frame(body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + 8);
    buf.put_slice(&HEADER);
    buf.put_u16(0);
    buf.put_slice(body);
    while buf.len() as u8 & ERROR_BIT != 0 {
        buf.put_u8(0x00);
    }
    let len = buf.len() as u16;
    buf[2..4].copy_from_slice(&len.to_be_bytes());
    buf.freeze()
}

fn wired(tag: u8, value: &[u8]) -> Bytes {
    let mut body = ACK_BODY.to_vec();
    body.push(0x3E);
    body.push(tag);
    body.extend_from_slice(value);
    frame(&body)
}

/// Unsigned reply; values above 255 use two bytes like the hub's sentinels
pub fn wired_unsigned(value: u16) -> Bytes {
    if value <= 0xFF {
        wired(0x21, &[value as u8])
    } else {
        wired(0x21, &value.to_be_bytes())
    }
}

/// Enumerated reply
pub fn wired_enumerated(value: u8) -> Bytes {
    wired(0x91, &[value])
}

/// Boolean reply
pub fn wired_boolean(value: bool) -> Bytes {
    wired(0x10, &[value as u8])
}

/// Real reply.
///
/// The float bytes must not contain another tag the decoder looks for first
/// (0x91, 0x21 or 0x10).
pub fn wired_real(value: f32) -> Bytes {
    wired(0x44, &value.to_be_bytes())
}

fn wireless_body(instance: u32, payload: [u8; 5]) -> Bytes {
    let object = ObjectId::new(ObjectType::AnalogInput, instance)
        .packed()
        .expect("wireless instance fits");
    let mut buf = BytesMut::with_capacity(23);
    buf.put_slice(&[0x81, 0x0A, 0x00, 0x17]);
    buf.put_slice(&ACK_BODY);
    buf.put_u8(0x0C);
    buf.put_u8(0x0C);
    buf.put_u32(object);
    buf.put_slice(&[0x19, 0x55, 0x3E, 0x44]);
    buf.put_slice(&payload[..4]);
    buf.put_u8(payload[4]);
    buf.freeze()
}

/// 23-byte wireless frame carrying a float at offset 18.
///
/// Values in [0.5, 2) start with 0x3F and take the leak-sensor shape.
pub fn wireless_float(instance: u32, value: f32) -> Bytes {
    let b = value.to_be_bytes();
    wireless_body(instance, [b[0], b[1], b[2], b[3], 0x3F])
}

/// 23-byte leak sensor frame with its state byte
pub fn water_sensor(instance: u32, wet: bool) -> Bytes {
    let state = if wet { 0x80 } else { 0x00 };
    wireless_body(instance, [0x3F, state, 0x00, 0x00, 0x3F])
}

/// Reply flagged with the error bit
pub fn error_response() -> Bytes {
    Bytes::from_static(&[0x81, 0x0A, 0x00, 0x0B, 0x01, 0x00, 0x50, 0x01, 0x0C, 0x02, 0x1F])
}

/// Acknowledgement of a write
pub fn simple_ack() -> Bytes {
    frame(&[0x01, 0x00, 0x20, 0x01, 0x0F])
}

/// Device object-name reply carrying the real device id
pub fn device_name(device_id: u32, name: &str) -> Bytes {
    let object = ObjectId::new(ObjectType::Device, device_id)
        .packed()
        .expect("device id fits");
    let mut body = ACK_BODY.to_vec();
    body.push(0x0C);
    body.push(0x0C);
    body.extend_from_slice(&object.to_be_bytes());
    body.extend_from_slice(&[0x19, 0x4D, 0x3E, 0x75, name.len() as u8 + 1, 0x00]);
    body.extend_from_slice(name.as_bytes());
    body.push(0x3F);
    frame(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waterguard_core::protocol::SensorKey;
    use waterguard_core::protocol::codec::{
        DecodeContext, decode_present_value, extract_character_string, extract_object_instances,
        is_water_sensor_frame,
    };

    #[test]
    fn test_wired_lengths_avoid_error_bit() {
        for frame in [wired_unsigned(2), wired_unsigned(1087), wired_real(21.5), simple_ack()] {
            assert_eq!(frame[3] & ERROR_BIT, 0);
            assert_eq!(frame[3] as usize, frame.len());
        }
    }

    #[test]
    fn test_frames_decode() {
        let ctx = DecodeContext::new(ObjectType::MultiStateInput);
        assert_eq!(decode_present_value(&wired_unsigned(3), &ctx), Ok(3.0));
        assert_eq!(decode_present_value(&wired_unsigned(1087), &ctx), Ok(1087.0));

        let ctx = DecodeContext::new(ObjectType::AnalogInput).with_sensor(SensorKey::Temperature);
        assert_eq!(decode_present_value(&wireless_float(13, 21.5), &ctx), Ok(21.5));

        assert!(is_water_sensor_frame(&water_sensor(11, true)));
    }

    #[test]
    fn test_device_name_frame() {
        let frame = device_name(1234, "Linkbox");
        assert_eq!(extract_object_instances(&frame), vec![1234]);
        assert_eq!(extract_character_string(&frame).as_deref(), Some("Linkbox"));
    }
}
