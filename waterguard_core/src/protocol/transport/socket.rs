//! Low-level UDP socket operations
//!
//! Wraps Tokio's UdpSocket with the hub's one-socket-per-request exchange.

use super::{Transport, TransportConfig, TransportStats};
use crate::protocol::MAX_PACKET_SIZE;
use crate::protocol::codec::hex;
use crate::protocol::error::{ProtocolError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, trace, warn};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::{UdpSocket, lookup_host};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// UDP transport talking to a single hub
pub struct UdpTransport {
    config: TransportConfig,
    stats: Mutex<TransportStats>,
}

impl UdpTransport {
    /// Create a new UDP transport
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(TransportStats::default()),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Reset transport statistics
    pub async fn reset_stats(&self) {
        *self.stats.lock().await = TransportStats::default();
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = lookup_host((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| ProtocolError::resolve(&self.config.host, e.to_string()))?;
        addrs
            .next()
            .ok_or_else(|| ProtocolError::resolve(&self.config.host, "no addresses returned"))
    }

    /// Bind the first free port in the configured range, else any port
    async fn bind_socket(&self, target: &SocketAddr) -> Result<UdpSocket> {
        let ip = if target.is_ipv4() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        };

        for port in self.config.local_ports.clone() {
            if let Ok(socket) = UdpSocket::bind(SocketAddr::new(ip, port)).await {
                trace!("Bound request socket to local port {port}");
                return Ok(socket);
            }
        }

        debug!("No free port in {:?}, using an OS-assigned port", self.config.local_ports);
        Ok(UdpSocket::bind(SocketAddr::new(ip, 0)).await?)
    }

    async fn attempt(&self, target: &SocketAddr, packet: &[u8]) -> Result<Bytes> {
        let socket = self.bind_socket(target).await?;
        let sent = socket.send_to(packet, target).await?;
        self.stats.lock().await.bytes_sent += sent as u64;

        let mut buffer = vec![0u8; MAX_PACKET_SIZE];
        let (size, from) = timeout(self.config.read_timeout, socket.recv_from(&mut buffer))
            .await
            .map_err(|_| ProtocolError::Timeout(self.config.read_timeout))??;

        if size == 0 {
            return Err(ProtocolError::invalid_response("non-empty datagram", "0 bytes"));
        }
        trace!("Received {size} bytes from {from}: {}", hex(&buffer[..size]));
        buffer.truncate(size);
        Ok(Bytes::from(buffer))
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_request(&self, packet: &[u8], retries: u32) -> Result<Bytes> {
        if packet.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::packet_too_large(packet.len(), MAX_PACKET_SIZE));
        }

        self.stats.lock().await.requests += 1;
        let hub = format!("{}:{}", self.config.host, self.config.port);

        let attempts = retries + 1;
        for attempt in 1..=attempts {
            if attempt > 1 {
                self.stats.lock().await.retries += 1;
            }
            debug!("Sending {} bytes to {hub} (attempt {attempt}/{attempts})", packet.len());

            // Resolved per attempt; a failed lookup counts as a socket error
            let result = match self.resolve().await {
                Ok(target) => self.attempt(&target, packet).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(response) => {
                    let mut stats = self.stats.lock().await;
                    stats.responses += 1;
                    stats.bytes_received += response.len() as u64;
                    return Ok(response);
                }
                Err(ProtocolError::Timeout(after)) => {
                    debug!("No reply from {hub} within {after:?}");
                    self.stats.lock().await.timeouts += 1;
                }
                Err(e) => {
                    debug!("Socket error talking to {hub}: {e}");
                    self.stats.lock().await.socket_errors += 1;
                }
            }
        }

        warn!("No response from {hub} after {attempts} attempts");
        self.stats.lock().await.failures += 1;
        Err(ProtocolError::NoResponse { attempts })
    }

    async fn stats(&self) -> TransportStats {
        self.stats.lock().await.clone()
    }
}
