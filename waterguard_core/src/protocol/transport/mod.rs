//! Transport layer for UDP communication
//!
//! Every request gets its own socket: bind a local port, send, wait for a
//! single datagram, close. Timeouts and socket errors are retried; the caller
//! only sees an error once every attempt has failed.

mod socket;

pub use socket::UdpTransport;

use crate::protocol::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::ops::Range;
use std::time::Duration;

/// Transport layer configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Hub host name or IP address
    pub host: String,
    /// Hub UDP port
    pub port: u16,
    /// Local ports tried in order before falling back to an OS-assigned port
    pub local_ports: Range<u16>,
    /// Read timeout for a single attempt
    pub read_timeout: Duration,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: crate::protocol::DEFAULT_PORT,
            local_ports: crate::protocol::LOCAL_PORT_START..crate::protocol::LOCAL_PORT_END,
            read_timeout: Duration::from_secs(crate::protocol::REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Request/response exchange with the hub
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for its reply.
    ///
    /// Makes `retries + 1` attempts. Returns `ProtocolError::NoResponse` once
    /// they are exhausted.
    async fn send_request(&self, packet: &[u8], retries: u32) -> Result<Bytes>;

    /// Snapshot of the transport counters
    async fn stats(&self) -> TransportStats;
}

/// Transport statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    /// Requests handed to the transport
    pub requests: u64,
    /// Requests that got a reply
    pub responses: u64,
    /// Requests that exhausted every attempt
    pub failures: u64,
    /// Attempts beyond the first
    pub retries: u64,
    /// Attempts that hit the read timeout
    pub timeouts: u64,
    /// Bind, send or receive errors
    pub socket_errors: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_defaults() {
        let config = TransportConfig::new("192.168.1.50", 47808);
        assert_eq!(config.host, "192.168.1.50");
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.local_ports.start, 47809);
        assert_eq!(config.local_ports.end, 47900);
    }
}
