//! Scripted transport standing in for a hub

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use waterguard_core::protocol::{ObjectId, ProtocolError, Result, Transport, TransportStats};

const PROP_PRESENT_VALUE: u32 = 85;
const SERVICE_WRITE_PROPERTY: u8 = 0x0F;

/// A request as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRequest {
    pub service: u8,
    /// Packed `(type << 22) | instance` identifier
    pub object: u32,
    pub property: u32,
    pub raw: Bytes,
}

impl MockRequest {
    fn parse(packet: &[u8]) -> Option<Self> {
        let object = u32::from_be_bytes(packet.get(11..15)?.try_into().ok()?);
        let property = match *packet.get(16)? {
            254 => u16::from_be_bytes(packet.get(17..19)?.try_into().ok()?) as u32,
            value => value as u32,
        };
        Some(Self {
            service: *packet.get(9)?,
            object,
            property,
            raw: Bytes::copy_from_slice(packet),
        })
    }

    pub fn is_write(&self) -> bool {
        self.service == SERVICE_WRITE_PROPERTY
    }

    pub fn targets(&self, object: ObjectId) -> bool {
        object.packed().is_ok_and(|packed| packed == self.object)
    }
}

#[derive(Debug, Default)]
struct MockBehavior {
    /// Replies per (object, property); the last one repeats
    replies: HashMap<(u32, u32), VecDeque<Option<Bytes>>>,
    /// Reply for any request without a script
    fallback: Option<Bytes>,
    failure: Option<ProtocolError>,
    delay: Duration,
    requests: Vec<MockRequest>,
    stats: TransportStats,
}

impl MockBehavior {
    fn next_reply(&mut self, key: (u32, u32)) -> Option<Bytes> {
        match self.replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().flatten(),
            Some(queue) => queue.front().cloned().flatten(),
            None => self.fallback.clone(),
        }
    }
}

/// Transport that answers from a script instead of the network
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use waterguard_core::protocol::{DeviceClient, objects::valve};
/// use waterguard_test_utils::{MockTransport, builders::wired_unsigned};
///
/// # async fn example() {
/// let transport = MockTransport::new();
/// transport.respond(valve::NUM_VALVES, wired_unsigned(2));
///
/// let client = DeviceClient::new(Arc::new(transport.clone()), 1);
/// let status = client.read_valve_status().await.unwrap();
/// assert_eq!(status.num_valves, Some(1.0));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    behavior: Arc<Mutex<MockBehavior>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(object: ObjectId, property: u32) -> (u32, u32) {
        (object.packed().expect("valid object id"), property)
    }

    /// Answer present-value reads of `object` with `frame`
    pub fn respond(&self, object: ObjectId, frame: Bytes) {
        self.respond_property(object, PROP_PRESENT_VALUE, frame);
    }

    pub fn respond_property(&self, object: ObjectId, property: u32, frame: Bytes) {
        self.script(object, property, vec![Some(frame)]);
    }

    /// Answer successive reads from `replies`; `None` means silence
    pub fn respond_sequence(&self, object: ObjectId, replies: Vec<Option<Bytes>>) {
        self.script(object, PROP_PRESENT_VALUE, replies);
    }

    fn script(&self, object: ObjectId, property: u32, replies: Vec<Option<Bytes>>) {
        let mut behavior = self.behavior.lock().unwrap();
        behavior
            .replies
            .insert(Self::key(object, property), replies.into());
    }

    /// Stop answering `object`
    pub fn silence(&self, object: ObjectId) {
        self.script(object, PROP_PRESENT_VALUE, vec![None]);
    }

    /// Answer every unscripted request with `frame`
    pub fn respond_to_all(&self, frame: Bytes) {
        self.behavior.lock().unwrap().fallback = Some(frame);
    }

    /// Forget every script
    pub fn clear(&self) {
        let mut behavior = self.behavior.lock().unwrap();
        behavior.replies.clear();
        behavior.fallback = None;
    }

    /// Fail every request with `error` until cleared
    pub fn fail_with(&self, error: Option<ProtocolError>) {
        self.behavior.lock().unwrap().failure = error;
    }

    /// Delay every reply
    pub fn set_delay(&self, delay: Duration) {
        self.behavior.lock().unwrap().delay = delay;
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.behavior.lock().unwrap().requests.clone()
    }

    pub fn writes(&self) -> Vec<MockRequest> {
        self.requests().into_iter().filter(|r| r.is_write()).collect()
    }

    /// Number of requests sent to `object`, retries included
    pub fn request_count(&self, object: ObjectId) -> usize {
        self.requests().iter().filter(|r| r.targets(object)).count()
    }

    pub fn reset_requests(&self) {
        self.behavior.lock().unwrap().requests.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_request(&self, packet: &[u8], retries: u32) -> Result<Bytes> {
        let delay = self.behavior.lock().unwrap().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut behavior = self.behavior.lock().unwrap();
        behavior.stats.requests += 1;
        behavior.stats.bytes_sent += packet.len() as u64;

        if let Some(error) = behavior.failure.take() {
            let replay = clone_error(&error);
            behavior.failure = Some(error);
            behavior.stats.failures += 1;
            return Err(replay);
        }

        let Some(request) = MockRequest::parse(packet) else {
            return Err(ProtocolError::encoding("mock could not parse request"));
        };
        let key = (request.object, request.property);

        let attempts = retries + 1;
        for attempt in 0..attempts {
            behavior.requests.push(request.clone());
            if attempt > 0 {
                behavior.stats.retries += 1;
            }
            if let Some(reply) = behavior.next_reply(key) {
                behavior.stats.responses += 1;
                behavior.stats.bytes_received += reply.len() as u64;
                return Ok(reply);
            }
            behavior.stats.timeouts += 1;
        }

        behavior.stats.failures += 1;
        Err(ProtocolError::NoResponse { attempts })
    }

    async fn stats(&self) -> TransportStats {
        self.behavior.lock().unwrap().stats.clone()
    }
}

fn clone_error(error: &ProtocolError) -> ProtocolError {
    match error {
        ProtocolError::Timeout(after) => ProtocolError::Timeout(*after),
        ProtocolError::NoResponse { attempts } => ProtocolError::NoResponse {
            attempts: *attempts,
        },
        ProtocolError::Encoding { message } => ProtocolError::encoding(message.clone()),
        ProtocolError::Resolve { address, message } => {
            ProtocolError::resolve(address.clone(), message.clone())
        }
        ProtocolError::Io(e) => ProtocolError::Io(std::io::Error::new(e.kind(), e.to_string())),
        other => ProtocolError::encoding(other.to_string()),
    }
}
