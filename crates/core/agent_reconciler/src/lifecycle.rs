use crate::DeviceState;
use agent_api::DeviceId;
use agent_api::Feature;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;
use tracing::info;

/// A change to be applied to the features of a device
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Intent {
    Start(Feature),
    Stop(Feature),
}

impl Intent {
    pub fn feature(&self) -> Feature {
        match self {
            Intent::Start(feature) | Intent::Stop(feature) => *feature,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Intent::Start(_) => Operation::Start,
            Intent::Stop(_) => Operation::Stop,
        }
    }
}

impl Display for Intent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.operation(), self.feature())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Operation {
    Start,
    Stop,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Start => f.write_str("start"),
            Operation::Stop => f.write_str("stop"),
        }
    }
}

/// The component actually implementing a feature once started for a device
///
/// Start and stop are expected to be idempotent:
/// a host can report that there was nothing to do using [HostError::AlreadyActive] or [HostError::NotLoaded].
#[async_trait]
pub trait FeatureHost: Send + Sync {
    async fn start(&self, device: &DeviceId) -> Result<(), HostError>;

    async fn stop(&self, device: &DeviceId) -> Result<(), HostError>;
}

#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum HostError {
    #[error("The feature is already active")]
    AlreadyActive,

    #[error("The feature is not loaded")]
    NotLoaded,

    #[error("No host is registered for this feature")]
    Unregistered,

    #[error("{0}")]
    Failed(String),
}

/// A start or stop that failed
///
/// The device state is left unchanged and the intent is not retried.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
#[error("Fail to {operation} {feature} for device {device}: {cause}")]
pub struct LifecycleError {
    pub device: DeviceId,
    pub feature: Feature,
    pub operation: Operation,
    pub cause: HostError,
}

/// Run start and stop intents against the feature hosts
#[derive(Clone, Default)]
pub struct FeatureLifecycleManager {
    hosts: HashMap<Feature, Arc<dyn FeatureHost>>,
}

impl FeatureLifecycleManager {
    pub fn new() -> Self {
        FeatureLifecycleManager::default()
    }

    /// Register the host of a feature
    pub fn with_host(mut self, feature: Feature, host: Arc<dyn FeatureHost>) -> Self {
        self.hosts.insert(feature, host);
        self
    }

    /// Start or stop a feature for a device
    ///
    /// A host reporting the feature already in the expected state is a success.
    pub async fn apply(&self, device: &DeviceId, intent: Intent) -> Result<(), LifecycleError> {
        let feature = intent.feature();
        let outcome = match self.hosts.get(&feature) {
            None => Err(HostError::Unregistered),
            Some(host) => match intent {
                Intent::Start(_) => match host.start(device).await {
                    Err(HostError::AlreadyActive) => Ok(()),
                    outcome => outcome,
                },
                Intent::Stop(_) => match host.stop(device).await {
                    Err(HostError::NotLoaded) => Ok(()),
                    outcome => outcome,
                },
            },
        };

        outcome.map_err(|cause| LifecycleError {
            device: device.clone(),
            feature,
            operation: intent.operation(),
            cause,
        })
    }

    /// Apply concurrently a set of intents on distinct features,
    /// recording in the device state the outcome of those that succeeded.
    ///
    /// Return the errors of those that failed.
    pub async fn apply_all(
        &self,
        device: &DeviceId,
        state: &mut DeviceState,
        intents: &[Intent],
    ) -> Vec<LifecycleError> {
        let outcomes = join_all(
            intents
                .iter()
                .map(|intent| async move { (*intent, self.apply(device, *intent).await) }),
        )
        .await;

        let mut failures = vec![];
        for (intent, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    info!("{intent} done for device {device}");
                    state.set_loaded(intent.feature(), intent.operation() == Operation::Start);
                }
                Err(err) => failures.push(err),
            }
        }
        failures
    }
}
