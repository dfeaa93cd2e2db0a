use agent_api::CapabilitySet;
use agent_api::DeviceId;
use agent_api::Feature;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use tokio::sync::Mutex as DeviceLock;
use tokio::sync::OwnedMutexGuard;

/// What is known about a device
///
/// - `loaded`: the features whose start has been confirmed and not followed by a confirmed stop,
/// - `last_known`: the last capability set applied.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceState {
    loaded: BTreeMap<Feature, bool>,
    last_known: Option<CapabilitySet>,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            loaded: Feature::ALL.into_iter().map(|f| (f, false)).collect(),
            last_known: None,
        }
    }
}

impl DeviceState {
    pub fn is_loaded(&self, feature: Feature) -> bool {
        self.loaded.get(&feature).copied().unwrap_or(false)
    }

    /// The loaded features, in reconciliation order
    pub fn loaded_features(&self) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|f| self.is_loaded(*f))
            .collect()
    }

    pub fn last_known(&self) -> Option<&CapabilitySet> {
        self.last_known.as_ref()
    }

    pub(crate) fn set_loaded(&mut self, feature: Feature, loaded: bool) {
        self.loaded.insert(feature, loaded);
    }

    /// Record the capabilities as the last known ones
    ///
    /// Return `false` if these capabilities were already the last known ones.
    pub(crate) fn record_capabilities(&mut self, capabilities: &CapabilitySet) -> bool {
        if self.last_known.as_ref() == Some(capabilities) {
            return false;
        }
        self.last_known = Some(capabilities.clone());
        true
    }
}

/// The states of all the devices, each behind its own lock
///
/// A device state can only be read or updated through a guard returned by [DeviceStateStore::lock],
/// so all the updates of a device are serialized, while different devices are processed independently.
#[derive(Default)]
pub struct DeviceStateStore {
    devices: Mutex<HashMap<DeviceId, Arc<DeviceLock<DeviceState>>>>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        DeviceStateStore::default()
    }

    /// Wait for exclusive access to the state of a device, creating this state on first use
    pub async fn lock(&self, device: &DeviceId) -> OwnedMutexGuard<DeviceState> {
        let state = self
            .devices()
            .entry(device.clone())
            .or_insert_with(|| Arc::new(DeviceLock::new(DeviceState::default())))
            .clone();
        state.lock_owned().await
    }

    /// Wait for exclusive access to the state of a device, if this device is known
    pub async fn lock_existing(&self, device: &DeviceId) -> Option<OwnedMutexGuard<DeviceState>> {
        let state = self.devices().get(device).cloned()?;
        Some(state.lock_owned().await)
    }

    /// A copy of the current state of a device
    pub async fn get(&self, device: &DeviceId) -> Option<DeviceState> {
        let state = self.lock_existing(device).await?;
        Some(state.clone())
    }

    /// Forget a device
    ///
    /// A guard already handed out for that device stays valid,
    /// but updates made through it are no longer visible from the store.
    pub fn remove(&self, device: &DeviceId) -> bool {
        self.devices().remove(device).is_some()
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn devices(&self) -> std::sync::MutexGuard<'_, HashMap<DeviceId, Arc<DeviceLock<DeviceState>>>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
