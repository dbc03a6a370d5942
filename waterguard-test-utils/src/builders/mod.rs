//! Builders for hub response frames

pub mod frames;

pub use frames::{
    device_name, error_response, simple_ack, water_sensor, wired_boolean, wired_enumerated,
    wired_real, wired_unsigned, wireless_float,
};
