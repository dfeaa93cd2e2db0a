use agent_api::DeviceId;
use agent_api::DeviceMetadata;
use async_trait::async_trait;

/// The registry where the devices are recorded along their metadata
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Create or update the registry entry of a device
    async fn upsert(
        &self,
        device: &DeviceId,
        metadata: &DeviceMetadata,
    ) -> Result<(), RegistrySyncError>;
}

/// A registry update that failed
///
/// The device metadata are upserted on each snapshot, hence retried with the next one.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
#[error("Fail to update the registry entry of device {device}: {reason}")]
pub struct RegistrySyncError {
    pub device: DeviceId,
    pub reason: String,
}
