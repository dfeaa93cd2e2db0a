use agent_api::DeviceId;
use agent_api::DeviceMetadata;
use agent_reconciler::DeviceRegistry;
use agent_reconciler::RegistrySyncError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use tracing::debug;
use tracing::info;

/// The registry entry of a device
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceEntry {
    pub metadata: DeviceMetadata,

    /// Number of snapshots that updated this entry
    pub updates: usize,
}

/// A process-local device registry
#[derive(Default)]
pub struct LocalRegistry {
    entries: Mutex<BTreeMap<DeviceId, DeviceEntry>>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        LocalRegistry::default()
    }

    pub fn entry(&self, device: &DeviceId) -> Option<DeviceEntry> {
        self.lock().get(device).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<DeviceId, DeviceEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DeviceRegistry for LocalRegistry {
    async fn upsert(
        &self,
        device: &DeviceId,
        metadata: &DeviceMetadata,
    ) -> Result<(), RegistrySyncError> {
        let mut entries = self.lock();
        match entries.get_mut(device) {
            Some(entry) => {
                if &entry.metadata != metadata {
                    info!(
                        "Device {device} is now {} {} {} ({})",
                        metadata.manufacturer, metadata.model, metadata.name, metadata.sw_version
                    );
                    entry.metadata = metadata.clone();
                }
                entry.updates += 1;
            }
            None => {
                debug!("New device {device}: {}", metadata.name);
                entries.insert(
                    device.clone(),
                    DeviceEntry {
                        metadata: metadata.clone(),
                        updates: 1,
                    },
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(sw_version: &str) -> DeviceMetadata {
        DeviceMetadata {
            name: "laptop".to_string(),
            manufacturer: "LAB02 Research".to_string(),
            model: "HASS.Agent".to_string(),
            sw_version: sw_version.to_string(),
        }
    }

    #[tokio::test]
    async fn entries_are_created_then_updated() {
        let registry = LocalRegistry::new();
        let laptop = DeviceId::new("laptop");

        registry.upsert(&laptop, &metadata("2022.14.0")).await.unwrap();
        registry.upsert(&laptop, &metadata("2022.14.0")).await.unwrap();
        registry.upsert(&laptop, &metadata("2022.15.0")).await.unwrap();

        assert_eq!(
            registry.entry(&laptop),
            Some(DeviceEntry {
                metadata: metadata("2022.15.0"),
                updates: 3,
            })
        );
        assert_eq!(registry.entry(&DeviceId::new("desktop")), None);
    }
}
