use crate::config::BridgeConfig;
use crate::config::DeviceConfig;
use crate::worker::DeviceWorker;
use agent_api::DeviceId;
use agent_api::SnapshotSource;
use agent_http_ext::HttpPullSource;
use agent_http_ext::PullConfig;
use agent_http_ext::PullSetupError;
use agent_mqtt_ext::MqttBroker;
use agent_mqtt_ext::MqttPushHub;
use agent_reconciler::ReadinessGate;
use agent_reconciler::Reconciliation;
use agent_reconciler::ReconciliationEngine;
use agent_reconciler::UnloadError;
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::future::join_all;
use mqtt_channel::MqttError;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use tracing::error;
use tracing::info;
use tracing::warn;

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("Device {device} cannot be set up: the MQTT broker is not available")]
    TransportUnavailable { device: DeviceId },

    #[error(transparent)]
    Pull(#[from] PullSetupError),

    #[error("Fail to subscribe to the topic of device {device}: {source}")]
    Subscribe {
        device: DeviceId,
        #[source]
        source: MqttError,
    },
}

/// Open the source of snapshots of a device
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn open(&self, device: &DeviceConfig) -> Result<Box<dyn SnapshotSource>, SetupError>;
}

/// The pull and push transports
///
/// A push source is only opened once the broker has been checked available.
pub struct Transports {
    pull: PullConfig,
    push: Option<MqttPushHub>,
    gate: ReadinessGate,
    availability_timeout: Duration,
}

impl Transports {
    /// Build the transports, connecting the MQTT broker if enabled
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &BridgeConfig) -> Self {
        let push = config
            .mqtt
            .enabled
            .then(|| MqttPushHub::open(&config.mqtt_config()));
        let broker = match &push {
            Some(hub) => hub.broker(),
            None => MqttBroker::disabled(),
        };
        Transports {
            pull: config.pull_config(),
            push,
            gate: ReadinessGate::new(Arc::new(broker)),
            availability_timeout: config.mqtt.availability_timeout,
        }
    }

    /// Disconnect from the MQTT broker
    pub async fn close(&self) {
        if let Some(hub) = &self.push {
            hub.close().await;
        }
    }
}

#[async_trait]
impl SourceFactory for Transports {
    async fn open(&self, device: &DeviceConfig) -> Result<Box<dyn SnapshotSource>, SetupError> {
        if let Some(url) = &device.url {
            let source = HttpPullSource::new(device.id.clone(), url, self.pull)?;
            return Ok(Box::new(source));
        }

        let transport_unavailable = || SetupError::TransportUnavailable {
            device: device.id.clone(),
        };
        if !self.gate.await_ready(self.availability_timeout).await {
            return Err(transport_unavailable());
        }
        let hub = self.push.as_ref().ok_or_else(transport_unavailable)?;
        let source = hub
            .subscribe(&device.id, &device.name)
            .await
            .map_err(|source| SetupError::Subscribe {
                device: device.id.clone(),
                source,
            })?;
        Ok(Box::new(source))
    }
}

/// The outcome of the reload of a device
#[derive(Debug)]
pub struct DeviceReload {
    pub device: DeviceId,
    pub unload: Result<(), UnloadError>,
    pub setup: Result<(), SetupError>,
}

/// Set up, unload and reload the configured devices
pub struct Supervisor {
    engine: Arc<ReconciliationEngine>,
    sources: Arc<dyn SourceFactory>,
    devices: Vec<DeviceConfig>,
    workers: Mutex<HashMap<DeviceId, DeviceWorker>>,
    observer: Option<mpsc::UnboundedSender<Reconciliation>>,
}

impl Supervisor {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        sources: Arc<dyn SourceFactory>,
        devices: Vec<DeviceConfig>,
    ) -> Self {
        Supervisor {
            engine,
            sources,
            devices,
            workers: Mutex::new(HashMap::new()),
            observer: None,
        }
    }

    /// Forward the outcome of each snapshot to the given channel
    pub fn with_observer(self, observer: mpsc::UnboundedSender<Reconciliation>) -> Self {
        Supervisor {
            observer: Some(observer),
            ..self
        }
    }

    pub fn devices(&self) -> &[DeviceConfig] {
        &self.devices
    }

    /// Open the source of a device and start feeding the engine with its snapshots
    pub async fn setup_device(&self, device: &DeviceConfig) -> Result<(), SetupError> {
        let source = self.sources.open(device).await?;
        let kind = source.kind();
        let worker = DeviceWorker::spawn(
            device.id.clone(),
            self.engine.clone(),
            source,
            self.observer.clone(),
        );

        let previous = self.workers().insert(device.id.clone(), worker);
        if let Some(previous) = previous {
            previous.stop().await;
        }
        info!("Device {} set up ({kind})", device.id);
        Ok(())
    }

    /// Stop receiving the snapshots of a device, then stop all its features
    pub async fn unload_device(&self, device: &DeviceId) -> Result<(), UnloadError> {
        let worker = self.workers().remove(device);
        if let Some(worker) = worker {
            worker.stop().await;
        }
        self.engine.unload(device).await
    }

    /// Set up concurrently all the devices
    ///
    /// Return the devices that could not be set up.
    pub async fn setup_all(&self) -> Vec<(DeviceId, SetupError)> {
        let outcomes = join_all(self.devices.iter().map(|device| async move {
            (device.id.clone(), self.setup_device(device).await)
        }))
        .await;

        let mut failures = vec![];
        for (device, outcome) in outcomes {
            if let Err(err) = outcome {
                error!("{err}");
                failures.push((device, err));
            }
        }
        failures
    }

    /// Unload then set up again, concurrently, all the devices
    ///
    /// The failure of a device doesn't prevent the others to be reloaded.
    pub async fn reload(&self) -> Vec<DeviceReload> {
        info!("Reloading {} device(s)", self.devices.len());
        join_all(self.devices.iter().map(|device| self.reload_device(device))).await
    }

    async fn reload_device(&self, device: &DeviceConfig) -> DeviceReload {
        let unload = self.unload_device(&device.id).await;
        if let Err(err) = &unload {
            warn!("{err}");
        }
        let setup = self.setup_device(device).await;
        if let Err(err) = &setup {
            error!("{err}");
        }
        DeviceReload {
            device: device.id.clone(),
            unload,
            setup,
        }
    }

    /// Unload concurrently all the devices
    pub async fn shutdown(&self) -> Vec<UnloadError> {
        let outcomes = join_all(
            self.devices
                .iter()
                .map(|device| self.unload_device(&device.id)),
        )
        .await;

        let mut failures = vec![];
        for outcome in outcomes {
            if let Err(err) = outcome {
                warn!("{err}");
                failures.push(err);
            }
        }
        failures
    }

    /// The devices whose source is still delivering snapshots
    pub fn active_devices(&self) -> Vec<DeviceId> {
        let mut devices: Vec<DeviceId> = self
            .workers()
            .iter()
            .filter(|(_, worker)| !worker.is_finished())
            .map(|(device, _)| device.clone())
            .collect();
        devices.sort();
        devices
    }

    fn workers(&self) -> std::sync::MutexGuard<'_, HashMap<DeviceId, DeviceWorker>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
