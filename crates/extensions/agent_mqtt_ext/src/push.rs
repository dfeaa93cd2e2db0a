use crate::MqttBroker;
use agent_api::topics::device_name_of;
use agent_api::topics::device_topic;
use agent_api::topics::subscription_key;
use agent_api::DeviceId;
use agent_api::DeviceInfo;
use agent_api::Snapshot;
use agent_api::SnapshotSource;
use agent_api::SourceError;
use agent_api::SourceKind;
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use mqtt_channel::Connection;
use mqtt_channel::ConnectionStatus;
use mqtt_channel::DisconnectHandle;
use mqtt_channel::Message;
use mqtt_channel::MqttError;
use mqtt_channel::SubscriptionClient;
use mqtt_channel::TopicFilter;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Share an MQTT connection among the push sources of all the devices
///
/// Each device subscribes to its own topic under its own subscription key;
/// the messages received on the connection are routed to the matching sources.
pub struct MqttPushHub {
    subscriptions: SubscriptionClient,
    routes: PushRoutes,
    status: watch::Receiver<ConnectionStatus>,
    disconnect: DisconnectHandle,
}

impl MqttPushHub {
    /// Open a connection to the broker and start routing the messages it receives
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &mqtt_channel::Config) -> Self {
        MqttPushHub::new(Connection::open(config))
    }

    pub fn new(connection: Connection) -> Self {
        let routes = PushRoutes::default();
        tokio::spawn(routes.clone().route(connection.received));
        MqttPushHub {
            subscriptions: connection.subscriptions,
            routes,
            status: connection.status,
            disconnect: connection.disconnect,
        }
    }

    /// The broker client to be checked before subscribing
    pub fn broker(&self) -> MqttBroker {
        MqttBroker::new(self.status.clone())
    }

    /// Subscribe to the device info published by a device
    ///
    /// A previous subscription registered for the same device is replaced,
    /// the source of this previous subscription receiving nothing more.
    pub async fn subscribe(
        &self,
        device: &DeviceId,
        device_name: &str,
    ) -> Result<MqttPushSource, MqttError> {
        let topic = device_topic(device_name);
        let filter = TopicFilter::new(&topic)?;
        let key = subscription_key(device);
        let (route_id, messages, stale_topic) = self.routes.insert(&key, &topic);
        if let Some(stale_topic) = stale_topic {
            self.release(&stale_topic).await;
        }

        if let Err(err) = self.subscriptions.subscribe(&filter).await {
            self.routes.remove(&key, route_id);
            return Err(err);
        }
        info!("Device {device} subscribed to {topic} as {key}");

        Ok(MqttPushSource {
            device: device.clone(),
            key,
            route_id,
            filter,
            messages,
            routes: self.routes.clone(),
            subscriptions: self.subscriptions.clone(),
            closed: false,
        })
    }

    /// The patterns currently subscribed on the broker
    pub fn active_patterns(&self) -> Vec<String> {
        self.subscriptions.active_patterns()
    }

    /// Disconnect from the broker
    pub async fn close(&self) {
        if let Err(err) = self.disconnect.disconnect().await {
            warn!("Fail to disconnect from the MQTT broker: {err}");
        }
    }

    /// Unsubscribe from a topic no more routed to any source
    async fn release(&self, topic: &str) {
        let unsubscribed = match TopicFilter::new(topic) {
            Ok(filter) => self.subscriptions.unsubscribe(&filter).await,
            Err(err) => Err(err),
        };
        if let Err(err) = unsubscribed {
            warn!("Fail to unsubscribe from {topic}: {err}");
        }
    }
}

/// The snapshots pushed by a device on its topic
pub struct MqttPushSource {
    device: DeviceId,
    key: String,
    route_id: u64,
    filter: TopicFilter,
    messages: mpsc::UnboundedReceiver<Message>,
    routes: PushRoutes,
    subscriptions: SubscriptionClient,
    closed: bool,
}

impl MqttPushSource {
    /// The key under which this subscription is registered
    pub fn subscription_key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl SnapshotSource for MqttPushSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Push
    }

    async fn next_snapshot(&mut self) -> Option<Result<Snapshot, SourceError>> {
        let message = self.messages.next().await?;
        let snapshot = DeviceInfo::from_json(message.payload_bytes())
            .map(|info| info.into_snapshot(self.device.clone(), SourceKind::Push))
            .map_err(|err| SourceError::malformed(&self.device, err));
        Some(snapshot)
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.messages.close();

        // The topic might still be used by a subscription that replaced this one
        let removed = self.routes.remove(&self.key, self.route_id);
        let still_routed = self
            .filter
            .patterns
            .iter()
            .any(|topic| self.routes.is_routed(topic));
        if removed && !still_routed {
            if let Err(err) = self.subscriptions.unsubscribe(&self.filter).await {
                warn!("Fail to unsubscribe {}: {err}", self.key);
            }
        }
        debug!("Subscription {} released", self.key);
    }
}

/// The subscription key -> topic -> source table
#[derive(Clone, Default)]
struct PushRoutes {
    inner: Arc<Mutex<RouteTable>>,
}

#[derive(Default)]
struct RouteTable {
    next_id: u64,
    routes: HashMap<String, Route>,
}

struct Route {
    id: u64,
    topic: String,
    sender: mpsc::UnboundedSender<Message>,
}

impl PushRoutes {
    /// Register a route, replacing any route registered under the same key
    ///
    /// Also return the topic of the replaced route, if now routed to no source.
    fn insert(
        &self,
        key: &str,
        topic: &str,
    ) -> (u64, mpsc::UnboundedReceiver<Message>, Option<String>) {
        let (sender, receiver) = mpsc::unbounded();
        let mut table = self.lock();
        table.next_id += 1;
        let id = table.next_id;
        let route = Route {
            id,
            topic: topic.to_string(),
            sender,
        };
        let previous = table.routes.insert(key.to_string(), route);

        let mut stale_topic = None;
        if let Some(previous) = previous {
            debug!("Subscription {key} replaced");
            previous.sender.close_channel();
            let still_routed = table
                .routes
                .values()
                .any(|route| route.topic == previous.topic);
            if !still_routed {
                stale_topic = Some(previous.topic);
            }
        }
        (id, receiver, stale_topic)
    }

    /// Remove the route registered under that key, unless it has been replaced since
    fn remove(&self, key: &str, id: u64) -> bool {
        let mut table = self.lock();
        if table.routes.get(key).map(|route| route.id) != Some(id) {
            return false;
        }
        if let Some(route) = table.routes.remove(key) {
            route.sender.close_channel();
        }
        true
    }

    fn is_routed(&self, topic: &str) -> bool {
        self.lock().routes.values().any(|route| route.topic == topic)
    }

    /// Forward a message to all the routes registered for its topic
    ///
    /// Return the number of routes the message has been forwarded to.
    fn dispatch(&self, message: Message) -> usize {
        let table = self.lock();
        let mut delivered = 0;
        for route in table.routes.values() {
            if route.topic == message.topic.name
                && route.sender.unbounded_send(message.clone()).is_ok()
            {
                delivered += 1;
            }
        }
        if delivered == 0 {
            match device_name_of(&message.topic.name) {
                Some(name) => debug!("Ignoring device info from unknown device {name}"),
                None => debug!("Ignoring message on {}", message.topic.name),
            }
        }
        delivered
    }

    async fn route(self, mut received: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = received.next().await {
            self.dispatch(message);
        }

        // The connection is closed: so are the sources
        for (_, route) in self.lock().routes.drain() {
            route.sender.close_channel();
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouteTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
