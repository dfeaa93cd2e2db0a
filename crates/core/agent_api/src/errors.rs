use crate::DeviceId;

/// A payload that doesn't match the expected device info schema
#[derive(thiserror::Error, Debug)]
pub enum MalformedSnapshot {
    #[error("Invalid device info: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// An error raised by a capability source
///
/// None of these errors is fatal: the device keeps its last known state
/// till the source delivers a valid snapshot.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("Device {device} is not reachable: {reason}")]
    TransportUnavailable { device: DeviceId, reason: String },

    #[error("Malformed snapshot received for device {device}: {source}")]
    MalformedSnapshot {
        device: DeviceId,
        #[source]
        source: MalformedSnapshot,
    },
}

impl SourceError {
    pub fn unavailable(device: &DeviceId, reason: impl ToString) -> Self {
        SourceError::TransportUnavailable {
            device: device.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(device: &DeviceId, source: MalformedSnapshot) -> Self {
        SourceError::MalformedSnapshot {
            device: device.clone(),
            source,
        }
    }
}
