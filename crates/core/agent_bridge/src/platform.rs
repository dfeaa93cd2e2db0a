use agent_api::DeviceId;
use agent_api::Feature;
use agent_reconciler::FeatureHost;
use agent_reconciler::FeatureLifecycleManager;
use agent_reconciler::HostError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use tracing::info;

/// Load and unload the platform of a feature for the devices
pub struct PlatformLoader {
    feature: Feature,
    loaded: Mutex<BTreeSet<DeviceId>>,
}

impl PlatformLoader {
    pub fn new(feature: Feature) -> Self {
        PlatformLoader {
            feature,
            loaded: Mutex::new(BTreeSet::new()),
        }
    }

    /// The devices for which the platform is loaded
    pub fn loaded_devices(&self) -> Vec<DeviceId> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<DeviceId>> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl FeatureHost for PlatformLoader {
    async fn start(&self, device: &DeviceId) -> Result<(), HostError> {
        if !self.lock().insert(device.clone()) {
            return Err(HostError::AlreadyActive);
        }
        info!("Loading {} platform for device {device}", self.feature);
        Ok(())
    }

    async fn stop(&self, device: &DeviceId) -> Result<(), HostError> {
        if !self.lock().remove(device) {
            return Err(HostError::NotLoaded);
        }
        info!("Unloading {} platform for device {device}", self.feature);
        Ok(())
    }
}

/// One platform loader per known feature
pub struct Platforms {
    loaders: Vec<Arc<PlatformLoader>>,
}

impl Platforms {
    pub fn new() -> Self {
        let loaders = Feature::ALL
            .into_iter()
            .map(|feature| Arc::new(PlatformLoader::new(feature)))
            .collect();
        Platforms { loaders }
    }

    pub fn loader(&self, feature: Feature) -> Option<Arc<PlatformLoader>> {
        self.loaders
            .iter()
            .find(|loader| loader.feature == feature)
            .cloned()
    }

    /// A lifecycle manager using these platform loaders as feature hosts
    pub fn lifecycle_manager(&self) -> FeatureLifecycleManager {
        self.loaders
            .iter()
            .fold(FeatureLifecycleManager::new(), |manager, loader| {
                manager.with_host(loader.feature, loader.clone())
            })
    }
}

impl Default for Platforms {
    fn default() -> Self {
        Platforms::new()
    }
}
