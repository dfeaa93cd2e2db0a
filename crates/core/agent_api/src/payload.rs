use crate::CapabilitySet;
use crate::DeviceId;
use crate::DeviceMetadata;
use crate::MalformedSnapshot;
use crate::Snapshot;
use crate::SourceKind;
use serde::Deserialize;
use serde::Serialize;

/// The document served on `GET /info` and published on the device topic
///
/// ```json
/// {
///   "device": {"name": "laptop", "manufacturer": "LAB02", "model": "HASS.Agent", "sw_version": "2.0.1"},
///   "apis": {"notifications": true, "media_player": false}
/// }
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device: DeviceMetadata,
    pub apis: CapabilitySet,
}

impl DeviceInfo {
    pub fn from_json(payload: &[u8]) -> Result<Self, MalformedSnapshot> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn into_snapshot(self, device_id: DeviceId, source: SourceKind) -> Snapshot {
        Snapshot {
            device_id,
            capabilities: self.apis,
            metadata: self.device,
            source,
        }
    }
}
