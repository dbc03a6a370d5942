//! Protocol-specific error types
//!
//! `ProtocolError` covers encoding and transport failures. `DecodeError` explains
//! why a response frame did not yield a usable value.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol-specific error types
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Network I/O error
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A single receive attempt timed out
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// Every attempt failed
    #[error("No response from hub after {attempts} attempts")]
    NoResponse { attempts: u32 },

    /// Request could not be encoded
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// Packet too large
    #[error("Packet size {size} exceeds maximum {max_size}")]
    PacketTooLarge { size: usize, max_size: usize },

    /// Hub address could not be resolved
    #[error("Failed to resolve hub address '{address}': {message}")]
    Resolve { address: String, message: String },

    /// Response arrived but does not match what was asked
    #[error("Invalid response format: expected {expected}, got {actual}")]
    InvalidResponse { expected: String, actual: String },
}

impl ProtocolError {
    /// Create an encoding error
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a packet too large error
    pub fn packet_too_large(size: usize, max_size: usize) -> Self {
        Self::PacketTooLarge { size, max_size }
    }

    /// Create an address resolution error
    pub fn resolve(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolve {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidResponse {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Check if this error is transient and can be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Timeout(_) | Self::NoResponse { .. } | Self::Resolve { .. }
        )
    }
}

/// Reasons a response frame was rejected by the decoder
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Frame shorter than the transport header
    #[error("Frame too short: {len} bytes")]
    ShortFrame { len: usize },

    /// Error bit set outside the water-sensor frame shape
    #[error("Hub returned an error response")]
    ErrorResponse,

    /// No recognised value tag in the frame
    #[error("No recognised value pattern in frame")]
    PatternMismatch,

    /// Float value was NaN or infinite
    #[error("Non-finite float value")]
    NonFinite,

    /// Value parsed but outside the plausible range for its sensor
    #[error("Value {value} for {key} outside range {min}..={max}")]
    RangeViolation {
        key: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl DecodeError {
    /// Create a range violation error
    pub fn range_violation(key: impl Into<String>, value: f64, min: f64, max: f64) -> Self {
        Self::RangeViolation {
            key: key.into(),
            value,
            min,
            max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let errors = vec![
            ProtocolError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout")),
            ProtocolError::Timeout(Duration::from_secs(5)),
            ProtocolError::NoResponse { attempts: 3 },
            ProtocolError::resolve("hub.lan", "no such host"),
        ];

        for err in errors {
            assert!(err.is_transient(), "{err:?} should be transient");
        }
    }

    #[test]
    fn test_non_transient_errors() {
        let errors = vec![
            ProtocolError::encoding("instance out of range"),
            ProtocolError::packet_too_large(2048, 1024),
            ProtocolError::invalid_response("non-empty datagram", "0 bytes"),
        ];

        for err in errors {
            assert!(!err.is_transient(), "{err:?} should not be transient");
        }
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::range_violation("temperature", 150.0, -50.0, 100.0);
        let text = err.to_string();
        assert!(text.contains("temperature"));
        assert!(text.contains("150"));

        assert_eq!(
            DecodeError::ShortFrame { len: 2 }.to_string(),
            "Frame too short: 2 bytes"
        );
    }

    #[test]
    fn test_error_conversions() {
        let io_err = std::io::Error::other("network error");
        let proto_err: ProtocolError = io_err.into();
        assert!(matches!(proto_err, ProtocolError::Io(_)));
    }
}
