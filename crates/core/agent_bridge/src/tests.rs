use crate::config::BridgeConfig;
use crate::config::DeviceConfig;
use crate::platform::Platforms;
use crate::registry::LocalRegistry;
use crate::supervisor::*;
use agent_api::CapabilitySet;
use agent_api::DeviceId;
use agent_api::DeviceMetadata;
use agent_api::Feature;
use agent_api::Snapshot;
use agent_api::SnapshotSource;
use agent_api::SourceError;
use agent_api::SourceKind;
use agent_reconciler::test_helpers::FakeFeatureHost;
use agent_reconciler::FeatureLifecycleManager;
use agent_reconciler::Intent;
use agent_reconciler::Operation;
use agent_reconciler::Reconciliation;
use agent_reconciler::ReconciliationEngine;
use assert_matches::assert_matches;
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

/// A source fed by the test
struct ChannelSource {
    kind: SourceKind,
    snapshots: mpsc::UnboundedReceiver<Result<Snapshot, SourceError>>,
    closed: Arc<Mutex<Vec<DeviceId>>>,
    device: DeviceId,
}

#[async_trait]
impl SnapshotSource for ChannelSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn next_snapshot(&mut self) -> Option<Result<Snapshot, SourceError>> {
        self.snapshots.next().await
    }

    async fn close(&mut self) {
        self.closed.lock().unwrap().push(self.device.clone());
    }
}

/// Open channel sources, except for the devices declared unreachable
#[derive(Default)]
struct ChannelSources {
    senders: Mutex<HashMap<DeviceId, mpsc::UnboundedSender<Result<Snapshot, SourceError>>>>,
    unreachable: Mutex<HashSet<DeviceId>>,
    closed: Arc<Mutex<Vec<DeviceId>>>,
}

impl ChannelSources {
    fn push(&self, snapshot: Snapshot) {
        let senders = self.senders.lock().unwrap();
        let sender = senders.get(&snapshot.device_id).expect("a source for this device");
        sender.unbounded_send(Ok(snapshot)).unwrap();
    }

    fn push_error(&self, device: &DeviceId) {
        let senders = self.senders.lock().unwrap();
        let sender = senders.get(device).expect("a source for this device");
        sender
            .unbounded_send(Err(SourceError::unavailable(device, "timeout")))
            .unwrap();
    }

    fn set_unreachable(&self, device: &DeviceId, unreachable: bool) {
        let mut devices = self.unreachable.lock().unwrap();
        if unreachable {
            devices.insert(device.clone());
        } else {
            devices.remove(device);
        }
    }

    fn closed(&self) -> Vec<DeviceId> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceFactory for ChannelSources {
    async fn open(&self, device: &DeviceConfig) -> Result<Box<dyn SnapshotSource>, SetupError> {
        if self.unreachable.lock().unwrap().contains(&device.id) {
            return Err(SetupError::TransportUnavailable {
                device: device.id.clone(),
            });
        }

        let (sender, receiver) = mpsc::unbounded();
        self.senders.lock().unwrap().insert(device.id.clone(), sender);
        let kind = if device.is_pulled() {
            SourceKind::Pull
        } else {
            SourceKind::Push
        };
        Ok(Box::new(ChannelSource {
            kind,
            snapshots: receiver,
            closed: self.closed.clone(),
            device: device.id.clone(),
        }))
    }
}

struct TestBridge {
    supervisor: Supervisor,
    sources: Arc<ChannelSources>,
    engine: Arc<ReconciliationEngine>,
    outcomes: mpsc::UnboundedReceiver<Reconciliation>,
}

impl TestBridge {
    fn new(devices: Vec<DeviceConfig>, lifecycle: FeatureLifecycleManager) -> Self {
        let sources = Arc::new(ChannelSources::default());
        let engine = Arc::new(ReconciliationEngine::new(
            Arc::new(LocalRegistry::new()),
            lifecycle,
        ));
        let (observer, outcomes) = mpsc::unbounded();
        let supervisor =
            Supervisor::new(engine.clone(), sources.clone(), devices).with_observer(observer);
        TestBridge {
            supervisor,
            sources,
            engine,
            outcomes,
        }
    }

    async fn next_outcome(&mut self) -> Reconciliation {
        tokio::time::timeout(TIMEOUT, self.outcomes.next())
            .await
            .expect("a reconciliation")
            .expect("an open observer channel")
    }

    async fn loaded(&self, device: &DeviceId) -> Option<Vec<Feature>> {
        self.engine
            .store()
            .get(device)
            .await
            .map(|state| state.loaded_features())
    }
}

fn device(id: &str, url: Option<&str>) -> DeviceConfig {
    DeviceConfig {
        id: DeviceId::new(id),
        name: id.to_string(),
        url: url.map(str::to_string),
    }
}

fn snapshot<const N: usize>(device: &str, apis: [(&str, bool); N]) -> Snapshot {
    Snapshot {
        device_id: DeviceId::new(device),
        capabilities: CapabilitySet::from(apis),
        metadata: DeviceMetadata {
            name: device.to_string(),
            manufacturer: "LAB02 Research".to_string(),
            model: "HASS.Agent".to_string(),
            sw_version: "2022.14.0".to_string(),
        },
        source: SourceKind::Push,
    }
}

#[tokio::test]
async fn snapshots_are_reconciled_once_the_device_is_set_up() {
    let platforms = Platforms::new();
    let mut bridge = TestBridge::new(vec![device("laptop", None)], platforms.lifecycle_manager());

    assert!(bridge.supervisor.setup_all().await.is_empty());
    bridge
        .sources
        .push(snapshot("laptop", [("notifications", true)]));

    let outcome = bridge.next_outcome().await;
    assert_eq!(outcome.intents, vec![Intent::Start(Feature::Notifications)]);
    assert_eq!(
        platforms
            .loader(Feature::Notifications)
            .unwrap()
            .loaded_devices(),
        vec![DeviceId::new("laptop")]
    );
}

#[tokio::test]
async fn a_device_that_cannot_be_set_up_does_not_block_the_others() {
    let mut bridge = TestBridge::new(
        vec![device("laptop", None), device("desktop", Some("http://desktop:5115"))],
        Platforms::new().lifecycle_manager(),
    );
    bridge
        .sources
        .set_unreachable(&DeviceId::new("laptop"), true);

    let failures = bridge.supervisor.setup_all().await;

    assert_eq!(failures.len(), 1);
    assert_matches!(
        &failures[0],
        (device, SetupError::TransportUnavailable { .. }) if device == &DeviceId::new("laptop")
    );
    assert_eq!(
        bridge.supervisor.active_devices(),
        vec![DeviceId::new("desktop")]
    );

    bridge
        .sources
        .push(snapshot("desktop", [("media_player", true)]));
    let outcome = bridge.next_outcome().await;
    assert_eq!(outcome.device_id, DeviceId::new("desktop"));
    assert_eq!(outcome.intents, vec![Intent::Start(Feature::MediaPlayer)]);
}

#[tokio::test]
async fn source_errors_leave_the_device_state_unchanged() {
    let mut bridge = TestBridge::new(
        vec![device("laptop", None)],
        Platforms::new().lifecycle_manager(),
    );
    bridge.supervisor.setup_all().await;
    let laptop = DeviceId::new("laptop");

    bridge
        .sources
        .push(snapshot("laptop", [("notifications", true)]));
    bridge.next_outcome().await;

    bridge.sources.push_error(&laptop);
    bridge
        .sources
        .push(snapshot("laptop", [("notifications", true)]));

    // The error is skipped, the device still being served
    let outcome = bridge.next_outcome().await;
    assert!(outcome.is_noop());
    assert_eq!(
        bridge.loaded(&laptop).await,
        Some(vec![Feature::Notifications])
    );
}

#[tokio::test]
async fn unloading_a_device_stops_its_features_and_closes_its_source() {
    let platforms = Platforms::new();
    let mut bridge = TestBridge::new(vec![device("laptop", None)], platforms.lifecycle_manager());
    let laptop = DeviceId::new("laptop");
    bridge.supervisor.setup_all().await;
    bridge.sources.push(snapshot(
        "laptop",
        [("notifications", true), ("media_player", true)],
    ));
    bridge.next_outcome().await;

    assert_matches!(bridge.supervisor.unload_device(&laptop).await, Ok(()));

    assert_eq!(bridge.sources.closed(), vec![laptop.clone()]);
    assert_eq!(bridge.loaded(&laptop).await, None);
    assert!(bridge.supervisor.active_devices().is_empty());
    for feature in Feature::ALL {
        assert!(platforms.loader(feature).unwrap().loaded_devices().is_empty());
    }
}

#[tokio::test]
async fn reload_starts_each_device_from_a_fresh_state() {
    let platforms = Platforms::new();
    let mut bridge = TestBridge::new(
        vec![device("laptop", None), device("desktop", None)],
        platforms.lifecycle_manager(),
    );
    bridge.supervisor.setup_all().await;
    bridge
        .sources
        .push(snapshot("laptop", [("notifications", true)]));
    bridge.next_outcome().await;

    let reloads = bridge.supervisor.reload().await;

    assert_eq!(reloads.len(), 2);
    for reload in reloads.iter() {
        assert!(reload.unload.is_ok());
        assert!(reload.setup.is_ok());
    }
    assert_eq!(bridge.loaded(&DeviceId::new("laptop")).await, None);

    // The same snapshot is no more a duplicate
    bridge
        .sources
        .push(snapshot("laptop", [("notifications", true)]));
    let outcome = bridge.next_outcome().await;
    assert_eq!(outcome.intents, vec![Intent::Start(Feature::Notifications)]);
}

#[tokio::test]
async fn a_failed_unload_does_not_prevent_the_reload_of_the_other_devices() {
    let notifications = Arc::new(FakeFeatureHost::new());
    let lifecycle = FeatureLifecycleManager::new()
        .with_host(Feature::Notifications, notifications.clone())
        .with_host(Feature::MediaPlayer, Arc::new(FakeFeatureHost::new()));
    let mut bridge = TestBridge::new(vec![device("laptop", None), device("desktop", None)], lifecycle);
    bridge.supervisor.setup_all().await;

    bridge
        .sources
        .push(snapshot("laptop", [("notifications", true)]));
    bridge.next_outcome().await;
    bridge
        .sources
        .push(snapshot("desktop", [("media_player", true)]));
    bridge.next_outcome().await;

    notifications.fail(Operation::Stop, "platform busy");
    let reloads = bridge.supervisor.reload().await;

    let laptop = reloads
        .iter()
        .find(|reload| reload.device == DeviceId::new("laptop"))
        .unwrap();
    assert_matches!(&laptop.unload, Err(err) if err.still_loaded == vec![Feature::Notifications]);
    assert!(laptop.setup.is_ok());

    let desktop = reloads
        .iter()
        .find(|reload| reload.device == DeviceId::new("desktop"))
        .unwrap();
    assert!(desktop.unload.is_ok());
    assert!(desktop.setup.is_ok());

    assert_eq!(
        bridge.supervisor.active_devices(),
        vec![DeviceId::new("desktop"), DeviceId::new("laptop")]
    );
}

#[tokio::test]
async fn a_device_can_be_set_up_again_once_reachable() {
    let bridge = TestBridge::new(
        vec![device("laptop", None)],
        Platforms::new().lifecycle_manager(),
    );
    let laptop = DeviceId::new("laptop");
    bridge.sources.set_unreachable(&laptop, true);

    assert_eq!(bridge.supervisor.setup_all().await.len(), 1);

    bridge.sources.set_unreachable(&laptop, false);
    let reloads = bridge.supervisor.reload().await;

    assert!(reloads[0].setup.is_ok());
    assert_eq!(bridge.supervisor.active_devices(), vec![laptop]);
}

#[tokio::test]
async fn without_broker_push_devices_cannot_be_set_up() {
    let mut config = BridgeConfig::default();
    config.mqtt.enabled = false;
    let transports = Transports::new(&config);

    assert_matches!(
        transports.open(&device("laptop", None)).await.err(),
        Some(SetupError::TransportUnavailable { .. })
    );
}

#[tokio::test]
async fn with_an_unreachable_broker_push_devices_cannot_be_set_up() {
    let mut config = BridgeConfig::default();
    // Nothing is expected to listen on port 1 of the local host
    config.mqtt.host = "127.0.0.1".to_string();
    config.mqtt.port = 1;
    config.mqtt.initial_connection_attempts = 1;
    config.mqtt.availability_timeout = TIMEOUT;
    let transports = Transports::new(&config);

    assert_matches!(
        transports.open(&device("laptop", None)).await.err(),
        Some(SetupError::TransportUnavailable { .. })
    );
    transports.close().await;
}

#[tokio::test]
async fn pull_devices_do_not_depend_on_the_broker() {
    let mut config = BridgeConfig::default();
    config.mqtt.enabled = false;
    let transports = Transports::new(&config);

    let source = transports
        .open(&device("laptop", Some("http://192.168.1.20:5115")))
        .await
        .unwrap();
    assert_eq!(source.kind(), SourceKind::Pull);

    assert_matches!(
        transports.open(&device("laptop", Some("not an url"))).await.err(),
        Some(SetupError::Pull(_))
    );
}
