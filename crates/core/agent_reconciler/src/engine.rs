use crate::DeviceRegistry;
use crate::DeviceState;
use crate::DeviceStateStore;
use crate::FeatureLifecycleManager;
use crate::Intent;
use crate::LifecycleError;
use crate::RegistrySyncError;
use agent_api::CapabilitySet;
use agent_api::DeviceId;
use agent_api::Feature;
use agent_api::Snapshot;
use std::sync::Arc;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// The outcome of a snapshot
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Reconciliation {
    pub device_id: DeviceId,

    /// The start and stop intents derived from the snapshot, in priority order
    pub intents: Vec<Intent>,

    /// The intents that failed
    pub failures: Vec<LifecycleError>,

    /// Set if the device metadata could not be recorded
    pub registry_error: Option<RegistrySyncError>,
}

impl Reconciliation {
    fn new(device_id: DeviceId) -> Self {
        Reconciliation {
            device_id,
            intents: vec![],
            failures: vec![],
            registry_error: None,
        }
    }

    /// True when the snapshot required no start nor stop
    pub fn is_noop(&self) -> bool {
        self.intents.is_empty()
    }
}

/// The features that could not be stopped while unloading a device
///
/// The device is forgotten anyway.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
#[error("Fail to unload device {device}: {} feature(s) could not be stopped", .failures.len())]
pub struct UnloadError {
    pub device: DeviceId,
    pub failures: Vec<LifecycleError>,

    /// The features still loaded when the device has been forgotten
    pub still_loaded: Vec<Feature>,
}

/// Turn device snapshots into feature starts and stops
pub struct ReconciliationEngine {
    store: DeviceStateStore,
    registry: Arc<dyn DeviceRegistry>,
    lifecycle: FeatureLifecycleManager,
}

impl ReconciliationEngine {
    pub fn new(registry: Arc<dyn DeviceRegistry>, lifecycle: FeatureLifecycleManager) -> Self {
        ReconciliationEngine {
            store: DeviceStateStore::new(),
            registry,
            lifecycle,
        }
    }

    pub fn store(&self) -> &DeviceStateStore {
        &self.store
    }

    /// Process a snapshot to completion
    ///
    /// The snapshots of a device are processed one after the other,
    /// the lock on the device state being held till all the intents are done.
    pub async fn on_snapshot(&self, snapshot: &Snapshot) -> Reconciliation {
        let device = &snapshot.device_id;
        let mut state = self.store.lock(device).await;
        let mut reconciliation = Reconciliation::new(device.clone());

        if let Err(err) = self.registry.upsert(device, &snapshot.metadata).await {
            warn!("{err}");
            reconciliation.registry_error = Some(err);
        }

        if !state.record_capabilities(&snapshot.capabilities) {
            debug!(
                "Unchanged capabilities for device {device} ({} snapshot)",
                snapshot.source
            );
            return reconciliation;
        }

        for name in snapshot.capabilities.unknown_names() {
            debug!("Ignoring unknown capability {name:?} advertised by device {device}");
        }

        let intents = plan(&state, &snapshot.capabilities);
        if !intents.is_empty() {
            let intents_list: Vec<String> = intents.iter().map(Intent::to_string).collect();
            info!(
                "Device {device} ({} snapshot): {}",
                snapshot.source,
                intents_list.join(", ")
            );
        }

        let failures = self.lifecycle.apply_all(device, &mut state, &intents).await;
        for failure in failures.iter() {
            warn!("{failure}");
        }

        reconciliation.intents = intents;
        reconciliation.failures = failures;
        reconciliation
    }

    /// Stop all the features loaded for a device and forget that device
    pub async fn unload(&self, device: &DeviceId) -> Result<(), UnloadError> {
        let Some(mut state) = self.store.lock_existing(device).await else {
            debug!("Nothing to unload for unknown device {device}");
            return Ok(());
        };

        let intents: Vec<Intent> = state
            .loaded_features()
            .into_iter()
            .map(Intent::Stop)
            .collect();
        let failures = self.lifecycle.apply_all(device, &mut state, &intents).await;
        self.store.remove(device);

        if failures.is_empty() {
            info!("Device {device} unloaded");
            return Ok(());
        }

        Err(UnloadError {
            device: device.clone(),
            still_loaded: state.loaded_features(),
            failures,
        })
    }
}

/// The intents to be applied so the loaded features match the advertised ones
///
/// The intents are listed in the priority order of the features.
pub fn plan(state: &DeviceState, capabilities: &CapabilitySet) -> Vec<Intent> {
    Feature::ALL
        .into_iter()
        .filter_map(
            |feature| match (capabilities.advertises(feature), state.is_loaded(feature)) {
                (true, false) => Some(Intent::Start(feature)),
                (false, true) => Some(Intent::Stop(feature)),
                _ => None,
            },
        )
        .collect()
}
