//! Device instance probing
//!
//! Hubs answer a device-name read addressed to the wildcard instance with a
//! reply that carries their real device identifier. Candidates pulled from
//! that reply are confirmed with a direct read before being reported.

use crate::protocol::codec::{
    Codec, extract_character_string, extract_object_instances, is_positive_ack,
};
use crate::protocol::error::Result;
use crate::protocol::objects::{self, MAX_INSTANCE};
use crate::protocol::transport::Transport;
use crate::protocol::{DEFAULT_RETRIES, PROP_OBJECT_NAME};
use bytes::Bytes;
use log::{debug, info};
use serde::Serialize;

/// Instance number every device answers to
pub const WILDCARD_INSTANCE: u32 = MAX_INSTANCE;

/// Outcome of a device-id probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceProbe {
    /// Whether the wildcard read got any reply
    pub responded: bool,
    /// Object name found in the reply
    pub object_name: Option<String>,
    /// Device instances seen in the reply
    pub candidates: Vec<u32>,
    /// Candidates that answered a direct read positively
    pub verified: Vec<u32>,
}

impl DeviceProbe {
    /// Best guess at the hub's device id
    pub fn device_id(&self) -> Option<u32> {
        self.verified
            .iter()
            .copied()
            .find(|&id| id != WILDCARD_INSTANCE)
            .or_else(|| self.verified.first().copied())
    }
}

async fn read_name(
    transport: &dyn Transport,
    codec: &Codec,
    instance: u32,
    retries: u32,
) -> Result<Option<Bytes>> {
    let packet = codec.read_property(objects::device(instance), PROP_OBJECT_NAME)?;
    match transport.send_request(&packet, retries).await {
        Ok(response) => Ok(Some(response)),
        Err(e) if e.is_transient() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Find the device instance of the hub behind `transport`
pub async fn probe_device_ids(transport: &dyn Transport) -> Result<DeviceProbe> {
    let codec = Codec::new();
    let mut probe = DeviceProbe::default();

    let wildcard = read_name(transport, &codec, WILDCARD_INSTANCE, DEFAULT_RETRIES).await?;
    let Some(response) = wildcard else {
        info!("Hub did not answer the wildcard device read");
        return Ok(probe);
    };

    probe.responded = true;
    probe.object_name = extract_character_string(&response);
    probe.candidates = extract_object_instances(&response);
    debug!(
        "Wildcard read returned name {:?}, candidates {:?}",
        probe.object_name, probe.candidates
    );

    for &candidate in &probe.candidates {
        match read_name(transport, &codec, candidate, 0).await? {
            Some(reply) if is_positive_ack(&reply) => {
                info!("Verified device id {candidate}");
                probe.verified.push(candidate);
            }
            _ => debug!("Device id {candidate} did not verify"),
        }
    }

    Ok(probe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_prefers_real_instance() {
        let probe = DeviceProbe {
            responded: true,
            object_name: None,
            candidates: vec![WILDCARD_INSTANCE, 1234],
            verified: vec![WILDCARD_INSTANCE, 1234],
        };
        assert_eq!(probe.device_id(), Some(1234));

        let probe = DeviceProbe {
            verified: vec![WILDCARD_INSTANCE],
            ..DeviceProbe::default()
        };
        assert_eq!(probe.device_id(), Some(WILDCARD_INSTANCE));
        assert_eq!(DeviceProbe::default().device_id(), None);
    }
}
