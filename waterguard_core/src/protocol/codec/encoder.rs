//! Request frame encoder
//!
//! Builds ReadProperty and WriteProperty frames. Every frame starts with the
//! 4-byte transport header whose length field is patched once the frame is
//! assembled.

use crate::protocol::MAX_PACKET_SIZE;
use crate::protocol::error::{ProtocolError, Result};
use crate::protocol::objects::ObjectId;
use bytes::{BufMut, Bytes, BytesMut};
use log::trace;

/// Transport header frame type
pub const FRAME_TYPE: u8 = 0x81;
/// Unicast function code
pub const UNICAST: u8 = 0x0A;
/// Broadcast function code
pub const BROADCAST: u8 = 0x0B;
/// Network layer header sent with every request
pub const NETWORK_HEADER: [u8; 2] = [0x01, 0x04];
/// ReadProperty service choice
pub const SERVICE_READ_PROPERTY: u8 = 0x0C;
/// WriteProperty service choice
pub const SERVICE_WRITE_PROPERTY: u8 = 0x0F;
/// Context tag preceding the object identifier
pub const TAG_OBJECT_ID: u8 = 0x0C;
/// Context tag preceding the property identifier
pub const TAG_PROPERTY_ID: u8 = 0x19;
/// Opening tag around a written value
pub const TAG_OPEN: u8 = 0x3E;
/// Closing tag around a written value
pub const TAG_CLOSE: u8 = 0x3F;

/// Value carried by a WriteProperty request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteValue {
    Unsigned(u32),
    Real(f32),
}

impl From<u32> for WriteValue {
    fn from(value: u32) -> Self {
        Self::Unsigned(value)
    }
}

impl From<f64> for WriteValue {
    /// Whole non-negative numbers are written as unsigned integers
    fn from(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&value) {
            Self::Unsigned(value as u32)
        } else {
            Self::Real(value as f32)
        }
    }
}

/// Request encoder
#[derive(Debug, Clone)]
pub struct Encoder {
    invoke_id: u8,
}

impl Encoder {
    /// Create an encoder using the invoke id the hub expects
    pub fn new() -> Self {
        Self { invoke_id: 1 }
    }

    pub fn with_invoke_id(invoke_id: u8) -> Self {
        Self { invoke_id }
    }

    /// Encode a ReadProperty request
    pub fn read_property(&self, object: ObjectId, property_id: u32) -> Result<Bytes> {
        let mut buf = self.begin(SERVICE_READ_PROPERTY);
        Self::put_object_and_property(&mut buf, object, property_id)?;
        let frame = Self::finish(buf)?;
        trace!("Encoded ReadProperty {object} prop {property_id}: {}", hex(&frame));
        Ok(frame)
    }

    /// Encode a WriteProperty request
    pub fn write_property(
        &self,
        object: ObjectId,
        property_id: u32,
        value: WriteValue,
    ) -> Result<Bytes> {
        let mut buf = self.begin(SERVICE_WRITE_PROPERTY);
        Self::put_object_and_property(&mut buf, object, property_id)?;

        buf.put_u8(TAG_OPEN);
        match value {
            WriteValue::Unsigned(v) if v <= 0xFF => {
                buf.put_u8(0x21);
                buf.put_u8(v as u8);
            }
            WriteValue::Unsigned(v) if v <= 0xFFFF => {
                buf.put_u8(0x22);
                buf.put_u16(v as u16);
            }
            WriteValue::Unsigned(v) => {
                buf.put_u8(0x24);
                buf.put_u32(v);
            }
            WriteValue::Real(v) => {
                buf.put_u8(0x44);
                buf.put_f32(v);
            }
        }
        buf.put_u8(TAG_CLOSE);

        let frame = Self::finish(buf)?;
        trace!("Encoded WriteProperty {object} = {value:?}: {}", hex(&frame));
        Ok(frame)
    }

    fn begin(&self, service: u8) -> BytesMut {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_slice(&[FRAME_TYPE, UNICAST, 0x00, 0x00]);
        buf.put_slice(&NETWORK_HEADER);
        buf.put_slice(&[0x00, 0x00, self.invoke_id]);
        buf.put_u8(service);
        buf
    }

    fn put_object_and_property(buf: &mut BytesMut, object: ObjectId, property_id: u32) -> Result<()> {
        buf.put_u8(TAG_OBJECT_ID);
        buf.put_u32(object.packed()?);
        buf.put_u8(TAG_PROPERTY_ID);
        encode_unsigned(buf, property_id)
    }

    fn finish(mut buf: BytesMut) -> Result<Bytes> {
        let len = buf.len();
        if len > MAX_PACKET_SIZE {
            return Err(ProtocolError::packet_too_large(len, MAX_PACKET_SIZE));
        }
        buf[2..4].copy_from_slice(&(len as u16).to_be_bytes());
        Ok(buf.freeze())
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Variable-length unsigned encoding: one byte below 254, marker 254 plus two
/// bytes below 65536, marker 255 plus three bytes otherwise.
pub fn encode_unsigned(buf: &mut BytesMut, value: u32) -> Result<()> {
    if value < 254 {
        buf.put_u8(value as u8);
    } else if value < 65536 {
        buf.put_u8(254);
        buf.put_u16(value as u16);
    } else if value <= 0xFF_FFFF {
        buf.put_u8(255);
        buf.put_slice(&value.to_be_bytes()[1..]);
    } else {
        return Err(ProtocolError::encoding(format!(
            "Unsigned value {value} does not fit three bytes"
        )));
    }
    Ok(())
}

pub(crate) fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::objects::{ObjectType, valve, water};

    #[test]
    fn test_read_property_frame_layout() {
        let frame = Encoder::new().read_property(valve::NUM_VALVES, 85).unwrap();
        assert_eq!(
            &frame[..],
            &[
                0x81, 0x0A, 0x00, 0x11, // transport header, length 17
                0x01, 0x04, // network header
                0x00, 0x00, 0x01, // application header
                0x0C, // ReadProperty
                0x0C, 0x03, 0x40, 0x00, 0x03, // object 13:3
                0x19, 0x55, // property 85
            ]
        );
    }

    #[test]
    fn test_length_field_matches_frame() {
        let frame = Encoder::new()
            .read_property(ObjectId::new(ObjectType::Device, 1234), 77)
            .unwrap();
        let len = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len());
    }

    #[test]
    fn test_write_property_small_unsigned() {
        let frame = Encoder::new()
            .write_property(water::RESET_LEAK, 85, WriteValue::Unsigned(2))
            .unwrap();
        assert_eq!(frame[9], SERVICE_WRITE_PROPERTY);
        assert_eq!(&frame[frame.len() - 4..], &[0x3E, 0x21, 0x02, 0x3F]);
        assert_eq!(frame.len(), 21);
    }

    #[test]
    fn test_write_property_value_widths() {
        let encoder = Encoder::new();
        let two = encoder
            .write_property(valve::CONTROL, 85, WriteValue::Unsigned(300))
            .unwrap();
        assert_eq!(&two[two.len() - 5..], &[0x3E, 0x22, 0x01, 0x2C, 0x3F]);

        let four = encoder
            .write_property(valve::CONTROL, 85, WriteValue::Unsigned(70_000))
            .unwrap();
        assert_eq!(
            &four[four.len() - 7..],
            &[0x3E, 0x24, 0x00, 0x01, 0x11, 0x70, 0x3F]
        );

        let real = encoder
            .write_property(valve::CONTROL, 85, WriteValue::Real(1.5))
            .unwrap();
        assert_eq!(
            &real[real.len() - 7..],
            &[0x3E, 0x44, 0x3F, 0xC0, 0x00, 0x00, 0x3F]
        );
    }

    #[test]
    fn test_write_value_from_f64() {
        assert_eq!(WriteValue::from(2.0), WriteValue::Unsigned(2));
        assert_eq!(WriteValue::from(2.5), WriteValue::Real(2.5));
        assert_eq!(WriteValue::from(-1.0), WriteValue::Real(-1.0));
    }

    #[test]
    fn test_encode_unsigned_markers() {
        let mut buf = BytesMut::new();
        encode_unsigned(&mut buf, 253).unwrap();
        assert_eq!(&buf[..], &[253]);

        let mut buf = BytesMut::new();
        encode_unsigned(&mut buf, 254).unwrap();
        assert_eq!(&buf[..], &[254, 0x00, 0xFE]);

        let mut buf = BytesMut::new();
        encode_unsigned(&mut buf, 65536).unwrap();
        assert_eq!(&buf[..], &[255, 0x01, 0x00, 0x00]);

        let mut buf = BytesMut::new();
        assert!(encode_unsigned(&mut buf, 0x0100_0000).is_err());
    }
}
