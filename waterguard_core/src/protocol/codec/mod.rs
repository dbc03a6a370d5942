//! Frame encoding and heuristic value decoding
//!
//! Pure byte manipulation, no I/O. The encoder builds ReadProperty and
//! WriteProperty requests; the decoder pulls a single present value out of
//! whatever the hub sends back.

mod decoder;
mod encoder;

pub use decoder::{
    DecodeContext, HEADER_LEN, NOT_APPLICABLE, SENTINEL_DISCONNECTED, SENTINEL_NOT_CONNECTED,
    apply_multi_state_mapping, decode_present_value, extract_character_string,
    extract_object_instances, is_positive_ack, is_water_sensor_frame, is_wireless_frame,
};
pub use encoder::{Encoder, WriteValue, encode_unsigned};

pub(crate) use encoder::hex;

use crate::protocol::error::{DecodeError, Result};
use crate::protocol::objects::ObjectId;
use bytes::Bytes;
use log::{debug, trace};

/// Codec for Waterguard hub frames
#[derive(Debug, Clone, Default)]
pub struct Codec {
    encoder: Encoder,
}

impl Codec {
    pub fn new() -> Self {
        Self {
            encoder: Encoder::new(),
        }
    }

    /// Encode a ReadProperty request
    pub fn read_property(&self, object: ObjectId, property_id: u32) -> Result<Bytes> {
        self.encoder.read_property(object, property_id)
    }

    /// Encode a WriteProperty request
    pub fn write_property(
        &self,
        object: ObjectId,
        property_id: u32,
        value: impl Into<WriteValue>,
    ) -> Result<Bytes> {
        self.encoder.write_property(object, property_id, value.into())
    }

    /// Decode the present value carried by a response
    pub fn decode(&self, data: &[u8], ctx: &DecodeContext) -> std::result::Result<f64, DecodeError> {
        trace!("Codec decoding {} bytes: {}", data.len(), hex(data));
        let result = decode_present_value(data, ctx);
        match &result {
            Ok(value) => trace!("Decoded {:?} value {value}", ctx.object_type),
            Err(e) => debug!("Decode failed for {:?}: {e}", ctx.object_type),
        }
        result
    }
}
